//! In-process host implementation.
//!
//! Backs the test suite and the standalone dev binary with the same surface a
//! real chat host provides: a last-writer-wins KV store, channel post
//! timelines, user/channel lookup and ephemeral delivery. Failure toggles let
//! tests exercise degraded-host paths.

use super::types::{Bot, Channel, ChannelStats, ChannelType, Command, Post, User};
use super::{HostApi, HostError, HostResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub struct MemoryHost {
    kv: DashMap<String, Vec<u8>>,
    posts: DashMap<String, Post>,
    /// Post ids in creation order, newest last.
    post_order: Mutex<Vec<String>>,
    users: DashMap<String, User>,
    channels: DashMap<String, Channel>,
    member_counts: DashMap<String, i64>,
    ephemeral: Mutex<Vec<(String, Post)>>,
    commands: Mutex<Vec<Command>>,
    kv_failing: AtomicBool,
    stats_failing: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            kv: DashMap::new(),
            posts: DashMap::new(),
            post_order: Mutex::new(Vec::new()),
            users: DashMap::new(),
            channels: DashMap::new(),
            member_counts: DashMap::new(),
            ephemeral: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            kv_failing: AtomicBool::new(false),
            stats_failing: AtomicBool::new(false),
        }
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                username: username.to_string(),
            },
        );
    }

    pub fn add_channel(&self, id: &str, channel_type: ChannelType, member_count: i64) {
        self.channels.insert(
            id.to_string(),
            Channel {
                id: id.to_string(),
                channel_type,
            },
        );
        self.member_counts.insert(id.to_string(), member_count);
    }

    /// All ephemeral posts delivered so far, as `(user_id, post)` pairs.
    pub fn ephemeral_posts(&self) -> Vec<(String, Post)> {
        self.ephemeral.lock().unwrap().clone()
    }

    pub fn registered_commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.posts.get(post_id).map(|p| p.clone())
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Raw KV write, bypassing the failure toggle. Used by tests to inject
    /// malformed records.
    pub fn kv_put_raw(&self, key: &str, value: Vec<u8>) {
        self.kv.insert(key.to_string(), value);
    }

    pub fn kv_len(&self) -> usize {
        self.kv.len()
    }

    /// Make every KV operation fail until reset.
    pub fn set_kv_failing(&self, failing: bool) {
        self.kv_failing.store(failing, Ordering::SeqCst);
    }

    /// Make `get_channel_stats` fail until reset.
    pub fn set_stats_failing(&self, failing: bool) {
        self.stats_failing.store(failing, Ordering::SeqCst);
    }

    fn check_kv(&self) -> HostResult<()> {
        if self.kv_failing.load(Ordering::SeqCst) {
            return Err(HostError::new("kv store unavailable"));
        }
        Ok(())
    }

    fn new_post_id() -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(26);
        id
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostApi for MemoryHost {
    async fn kv_set(&self, key: &str, value: &[u8]) -> HostResult<()> {
        self.check_kv()?;
        self.kv.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        self.check_kv()?;
        Ok(self.kv.get(key).map(|v| v.clone()))
    }

    async fn kv_delete(&self, key: &str) -> HostResult<()> {
        self.check_kv()?;
        self.kv.remove(key);
        Ok(())
    }

    async fn kv_list(&self, page: usize, per_page: usize) -> HostResult<Vec<String>> {
        self.check_kv()?;
        // Deterministic enumeration order so paging is stable across calls.
        let mut keys: Vec<String> = self.kv.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .skip(page * per_page)
            .take(per_page)
            .collect())
    }

    async fn create_post(&self, mut post: Post) -> HostResult<Post> {
        if post.channel_id.is_empty() {
            return Err(HostError::new("post requires a channel_id"));
        }
        post.id = Self::new_post_id();
        self.posts.insert(post.id.clone(), post.clone());
        self.post_order.lock().unwrap().push(post.id.clone());
        Ok(post)
    }

    async fn update_post(&self, post: Post) -> HostResult<Post> {
        if !self.posts.contains_key(&post.id) {
            return Err(HostError::new(format!("post {} does not exist", post.id)));
        }
        self.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn delete_post(&self, post_id: &str) -> HostResult<()> {
        self.posts.remove(post_id);
        self.post_order.lock().unwrap().retain(|id| id != post_id);
        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> HostResult<Option<Post>> {
        Ok(self.posts.get(post_id).map(|p| p.clone()))
    }

    async fn get_posts_for_channel(
        &self,
        channel_id: &str,
        page: usize,
        per_page: usize,
    ) -> HostResult<Vec<Post>> {
        let order = self.post_order.lock().unwrap();
        // Newest first, matching host timeline semantics.
        let posts: Vec<Post> = order
            .iter()
            .rev()
            .filter_map(|id| self.posts.get(id).map(|p| p.clone()))
            .filter(|p| p.channel_id == channel_id)
            .collect();
        Ok(posts
            .into_iter()
            .skip(page * per_page)
            .take(per_page)
            .collect())
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> HostResult<()> {
        self.ephemeral
            .lock()
            .unwrap()
            .push((user_id.to_string(), post));
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> HostResult<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn get_user_by_username(&self, username: &str) -> HostResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone()))
    }

    async fn create_bot(&self, bot: Bot) -> HostResult<User> {
        if self
            .users
            .iter()
            .any(|u| u.username == bot.username)
        {
            return Err(HostError::new(format!(
                "bot username {} already exists",
                bot.username
            )));
        }
        let user = User {
            id: Self::new_post_id(),
            username: bot.username,
        };
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_channel(&self, channel_id: &str) -> HostResult<Option<Channel>> {
        Ok(self.channels.get(channel_id).map(|c| c.clone()))
    }

    async fn get_channel_stats(&self, channel_id: &str) -> HostResult<ChannelStats> {
        if self.stats_failing.load(Ordering::SeqCst) {
            return Err(HostError::new("channel stats unavailable"));
        }
        let member_count = self
            .member_counts
            .get(channel_id)
            .map(|c| *c)
            .unwrap_or(0);
        Ok(ChannelStats { member_count })
    }

    async fn register_command(&self, command: Command) -> HostResult<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}
