//! Core data models for the photo frame service.
//!
//! These entities describe images discovered on disk, PIN access accounts,
//! and the server-side session records. They serialize as camelCase JSON
//! via `serde`.

pub mod account;
pub mod image;
pub mod session;
