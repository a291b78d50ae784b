//! Authentication domain module.
//!
//! # Module Structure
//!
//! - `error`: `AuthError`, the only error kind handed to the UI
//! - `model`: credentials, signup requests, profile views
//! - `client`: the `AuthClient` port to the campus backend

mod client;
mod error;
mod model;

// Re-export public API
pub use client::AuthClient;
pub use error::AuthError;
pub use model::{AuthPayload, Contact, Credentials, DeviceSession, SignupRequest, UserProfile};
