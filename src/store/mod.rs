pub mod kv;
pub mod memory;
pub mod models;

pub use kv::{KvSecretStore, SecretStore, SharedSecretStore, SECRET_KEY_PREFIX};
pub use memory::MemorySecretStore;
pub use models::{Secret, SecretRequest, SecretViewedRequest};
