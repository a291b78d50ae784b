//! Storage adapters for the durable session pair.

pub mod atomic_toml;
mod memory_kv_store;
mod toml_kv_store;

pub use memory_kv_store::InMemoryKeyValueStore;
pub use toml_kv_store::TomlKeyValueStore;
