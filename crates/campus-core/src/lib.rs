pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod storage;

// Re-export common error type
pub use error::CampusError;
