//! External identity provider port.
//!
//! A third-party identity service pushes "signed in" / "signed out"
//! notifications independently of the campus backend. The core consumes them
//! through [`IdentityProvider`]; the reconciler decides what they mean.

mod provider;

pub use provider::{
    ExternalIdentity, IdentityFeed, IdentityFeedSender, IdentityNotification, IdentityProvider,
    SubscriptionError,
};
