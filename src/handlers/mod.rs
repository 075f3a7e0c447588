//! HTTP handlers. Each file groups one area of the API.

pub mod account_handlers;
pub mod auth_handlers;
pub mod extractors;
pub mod folder_handlers;
pub mod health_handlers;
pub mod image_handlers;
