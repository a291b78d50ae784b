//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: `Session`, `Identity` and the closed `Role` set
//! - `store`: `SessionStore`, the single in-memory source of truth

mod model;
mod store;

// Re-export public API
pub use model::{Identity, IdentityError, Role, RoleParseError, Session};
pub use store::{SessionStore, SessionWatcher};
