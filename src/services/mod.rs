//! Business logic. Handlers stay thin and delegate here.

pub mod access_control;
pub mod account_store;
pub mod folder_service;
pub mod image_index;
pub mod image_service;
pub mod paths;
pub mod pin_auth;
pub mod rate_limiter;
pub mod selector;
pub mod session_store;
