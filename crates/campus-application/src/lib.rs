//! Application layer for the campus session core.
//!
//! Coordinates the domain types in `campus-core` with the adapters in
//! `campus-infrastructure`: identity reconciliation, the auth flows and the
//! runtime that wires them together.

pub mod auth_usecase;
pub mod bootstrap;
pub mod reconciler;

pub use auth_usecase::AuthUseCase;
pub use bootstrap::SessionRuntime;
pub use reconciler::{IdentityReconciler, PassTrigger, ReconcilerState, Subscription};
