//! Capability port to the embedding chat platform.
//!
//! Everything the core needs from the host — KV primitives, post operations,
//! user/channel lookup, ephemeral delivery, command registration — goes
//! through [`HostApi`]. The core never depends on a concrete host; tests and
//! the dev binary use [`MemoryHost`].

pub mod memory;
pub mod types;

pub use memory::MemoryHost;
pub use types::{
    Bot, Channel, ChannelStats, ChannelType, Command, CommandResponse, Post, PostAction,
    PostActionIntegration, PostActionIntegrationResponse, SlackAttachment, SlackAttachmentField,
    User,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by any host capability call.
#[derive(Debug, Clone, Error)]
#[error("host call failed: {0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Capabilities provided by the embedding chat platform.
///
/// KV semantics: last-writer-wins puts, no transactions. `kv_list` is paged
/// by page index and may return keys written by other plugins; callers
/// filter by prefix.
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn kv_set(&self, key: &str, value: &[u8]) -> HostResult<()>;
    async fn kv_get(&self, key: &str) -> HostResult<Option<Vec<u8>>>;
    async fn kv_delete(&self, key: &str) -> HostResult<()>;
    async fn kv_list(&self, page: usize, per_page: usize) -> HostResult<Vec<String>>;

    /// Create a post; the returned post carries the host-assigned id.
    async fn create_post(&self, post: Post) -> HostResult<Post>;
    async fn update_post(&self, post: Post) -> HostResult<Post>;
    async fn delete_post(&self, post_id: &str) -> HostResult<()>;
    async fn get_post(&self, post_id: &str) -> HostResult<Option<Post>>;
    async fn get_posts_for_channel(
        &self,
        channel_id: &str,
        page: usize,
        per_page: usize,
    ) -> HostResult<Vec<Post>>;

    /// Deliver a post visible only to `user_id`.
    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> HostResult<()>;

    async fn get_user(&self, user_id: &str) -> HostResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> HostResult<Option<User>>;
    async fn create_bot(&self, bot: Bot) -> HostResult<User>;

    async fn get_channel(&self, channel_id: &str) -> HostResult<Option<Channel>>;
    async fn get_channel_stats(&self, channel_id: &str) -> HostResult<ChannelStats>;

    async fn register_command(&self, command: Command) -> HostResult<()>;
}

/// Shared host handle for use across the application.
pub type SharedHost = Arc<dyn HostApi>;
