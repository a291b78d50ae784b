pub mod channel_identity_provider;
pub mod config_service;
pub mod http_auth_client;
pub mod paths;
pub mod storage;

pub use crate::channel_identity_provider::ChannelIdentityProvider;
pub use crate::config_service::ConfigService;
pub use crate::http_auth_client::HttpAuthClient;
pub use crate::storage::{InMemoryKeyValueStore, TomlKeyValueStore};
