//! Secret lifecycle engine.
//!
//! Owns the state machine of a secret record: creation, per-viewer reveal
//! with merge-safe bookkeeping, per-viewer close, completion reaping and
//! expiry sweeping. The service coordinates the store, the host port and the
//! clock; all cross-cutting concurrency lives here. No process-local lock is
//! held across a store or host call.

use crate::clock::{Clock, IdSource};
use crate::config::ConfigHolder;
use crate::error::{AppError, AppResult};
use crate::host::types::{
    Post, PostAction, PostActionIntegration, SlackAttachment, SECRET_ID_PROP, SECRET_POST_TYPE,
};
use crate::host::{HostApi, SharedHost};
use crate::store::{Secret, SecretStore, SharedSecretStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Host post body limit, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 16_383;

/// Attempts for the append-verify loop before giving up on a racy store.
const MERGE_RETRY_ATTEMPTS: usize = 3;

/// Member count assumed when the host cannot tell us the real one.
const DEFAULT_MEMBER_COUNT: i64 = 10;

/// Grace period before a fully-viewed placeholder disappears, so clients can
/// observe the final state.
const POST_DELETE_DELAY: Duration = Duration::from_secs(5);

/// Posts fetched per page when scanning a channel for a placeholder.
const POSTS_PAGE_SIZE: usize = 100;

/// Route prefix under which the host exposes this plugin's endpoints.
pub const PLUGIN_ROUTE: &str = "/plugins/com.secretdrop.secrets";

pub const ATTACHMENT_TITLE: &str = "Secret Message";
pub const CLOSED_TEXT: &str = "This secret message has been closed.";
pub const EXPIRED_TEXT: &str = "This secret message has expired.";
pub const UNAVAILABLE_TEXT: &str = "This secret message is no longer available.";

/// Integration URL for the legacy reveal button on a placeholder.
pub fn view_action_url(secret_id: &str) -> String {
    format!("{PLUGIN_ROUTE}/api/v1/secrets/view?secret_id={secret_id}")
}

/// Integration URL for the close button on a revealed attachment.
/// `${{post.id}}` is substituted by the client at press time.
pub fn close_action_url(secret_id: &str) -> String {
    format!("{PLUGIN_ROUTE}/api/v1/secrets/close?secret_id={secret_id}&post_id=${{post.id}}")
}

/// Result of a reveal attempt, from the viewer's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed {
        message: String,
        author_username: String,
        allow_copy: bool,
    },
    Expired,
    NotFound,
}

/// What the close endpoint should tell the viewer about the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Closed,
    Unavailable,
    Expired,
}

impl CloseState {
    pub fn text(&self) -> &'static str {
        match self {
            Self::Closed => CLOSED_TEXT,
            Self::Unavailable => UNAVAILABLE_TEXT,
            Self::Expired => EXPIRED_TEXT,
        }
    }
}

/// Cloning is cheap: every field is a shared handle, so fire-and-forget
/// tasks carry their own copy instead of an outer `Arc`.
#[derive(Clone)]
pub struct SecretService {
    store: SharedSecretStore,
    host: SharedHost,
    config: Arc<ConfigHolder>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    bot_id: String,
    /// Cloned into every fire-and-forget task so none outlives deactivation.
    shutdown: watch::Receiver<bool>,
}

impl SecretService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SharedSecretStore,
        host: SharedHost,
        config: Arc<ConfigHolder>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        bot_id: String,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            host,
            config,
            clock,
            ids,
            bot_id,
            shutdown,
        }
    }

    /// Create a secret record. The placeholder post is the caller's job; a
    /// record whose placeholder never materialises is reaped on expiry.
    pub async fn create(
        &self,
        author_id: &str,
        channel_id: &str,
        root_id: &str,
        message: &str,
    ) -> AppResult<Secret> {
        if channel_id.is_empty() || message.is_empty() {
            return Err(AppError::invalid_input("channel_id and message are required"));
        }
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(AppError::invalid_input(format!(
                "message exceeds the host post limit of {MAX_MESSAGE_LENGTH} characters"
            )));
        }
        if !root_id.is_empty() {
            match self.host.get_post(root_id).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(AppError::InvalidParent(root_id.to_string())),
                Err(e) => {
                    return Err(AppError::InvalidParent(format!("{root_id}: {e}")));
                }
            }
        }

        let now = self.clock.now_millis();
        let config = self.config.current();
        let secret = Secret {
            id: self.ids.new_id(),
            user_id: author_id.to_string(),
            channel_id: channel_id.to_string(),
            root_id: root_id.to_string(),
            message: message.to_string(),
            viewed_by: Vec::new(),
            created_at: now,
            expires_at: now + config.expiry_millis(),
        };

        self.store.save(&secret).await?;
        info!(secret_id = %secret.id, channel_id, "created secret");
        Ok(secret)
    }

    /// Post the visible placeholder for `secret` into its channel/thread.
    pub async fn create_placeholder(&self, secret: &Secret) -> AppResult<Post> {
        let author = self.author_username(&secret.user_id).await;

        let mut post = Post {
            user_id: self.bot_id.clone(),
            channel_id: secret.channel_id.clone(),
            root_id: secret.root_id.clone(),
            post_type: SECRET_POST_TYPE.to_string(),
            ..Default::default()
        };
        post.set_prop(SECRET_ID_PROP, Value::String(secret.id.clone()));
        post.set_attachments(vec![SlackAttachment {
            title: ATTACHMENT_TITLE.to_string(),
            text: format!("@{author} has sent a secret message. Click to view it once."),
            actions: vec![PostAction {
                name: "View Secret".to_string(),
                action_type: "button".to_string(),
                integration: PostActionIntegration {
                    url: view_action_url(&secret.id),
                },
                ..Default::default()
            }],
            ..Default::default()
        }]);

        self.host
            .create_post(post)
            .await
            .map_err(|e| AppError::HostUnavailable(e.to_string()))
    }

    /// Disclose the secret to `viewer_id`, recording them in the viewed-by
    /// set exactly once. Atomic from the viewer's perspective.
    pub async fn reveal(&self, viewer_id: &str, secret_id: &str) -> AppResult<RevealOutcome> {
        let Some(secret) = self.store.get(secret_id).await? else {
            return Ok(RevealOutcome::NotFound);
        };

        if secret.is_expired(self.clock.now_millis()) {
            // Leave the record for the sweeper; just flip the placeholder.
            self.mark_placeholder_expired(&secret).await;
            return Ok(RevealOutcome::Expired);
        }

        let newly_added = self.record_view(viewer_id, secret.clone()).await?;

        let author = self.author_username(&secret.user_id).await;
        let config = self.config.current();
        self.send_reveal_ephemeral(viewer_id, &secret, config.allow_copy_to_clipboard)
            .await;

        if newly_added {
            self.spawn_collect(secret.clone());
        }

        Ok(RevealOutcome::Revealed {
            message: secret.message,
            author_username: author,
            allow_copy: config.allow_copy_to_clipboard,
        })
    }

    /// Record `viewer_id` in the viewed-by set without disclosing anything.
    /// Idempotent per viewer.
    pub async fn mark_viewed(&self, viewer_id: &str, secret_id: &str) -> AppResult<()> {
        let Some(secret) = self.store.get(secret_id).await? else {
            return Err(AppError::NotFound(secret_id.to_string()));
        };
        self.record_view(viewer_id, secret).await?;
        Ok(())
    }

    /// What state the close endpoint should report for `secret_id`. Close is
    /// per-viewer presentation only and never mutates the record.
    pub async fn close(&self, secret_id: &str) -> CloseState {
        match self.store.get(secret_id).await {
            Ok(None) => CloseState::Unavailable,
            Ok(Some(secret)) if secret.is_expired(self.clock.now_millis()) => CloseState::Expired,
            Ok(Some(_)) => CloseState::Closed,
            Err(e) => {
                warn!(secret_id, error = %e, "close could not read record, reporting closed");
                CloseState::Closed
            }
        }
    }

    /// Append-verify loop for viewed-by mutation under last-writer-wins puts.
    ///
    /// A concurrent writer can erase our append between the save and its
    /// verification read; re-reading and retrying narrows the window. Returns
    /// whether the viewer was newly recorded.
    async fn record_view(&self, viewer_id: &str, snapshot: Secret) -> AppResult<bool> {
        let id = snapshot.id.clone();
        let mut current = snapshot;

        for attempt in 1..=MERGE_RETRY_ATTEMPTS {
            if current.has_viewed(viewer_id) {
                // Already present: a previous call on the first attempt, or a
                // competitor merged our append on a later one.
                return Ok(attempt > 1);
            }

            let mut updated = current.clone();
            updated.mark_viewed(viewer_id);
            self.store.save(&updated).await?;

            match self.store.get(&id).await? {
                // Destroyed concurrently (collected or swept); nothing left
                // to record.
                None => return Ok(true),
                Some(latest) => {
                    if latest.has_viewed(viewer_id) {
                        return Ok(true);
                    }
                    debug!(
                        secret_id = %id,
                        viewer_id,
                        attempt,
                        "viewed-by append lost to a concurrent writer, retrying"
                    );
                    current = latest;
                }
            }
        }

        Err(AppError::StoreUnavailable(format!(
            "failed to record viewer {viewer_id} on secret {id} after {MERGE_RETRY_ATTEMPTS} attempts"
        )))
    }

    /// Destroy the record once every channel member has seen it.
    ///
    /// Best-effort: every failure is logged and swallowed, and racing the
    /// sweeper is safe because both end in idempotent deletes.
    pub async fn collect(&self, secret: &Secret) {
        // Re-read for the freshest viewed-by set; the caller's copy may
        // predate its own append.
        let record = match self.store.get(&secret.id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(secret_id = %secret.id, error = %e, "completion check could not read record");
                return;
            }
        };

        let member_count = self.channel_member_count(&record.channel_id).await;
        if (record.viewed_by.len() as i64) < member_count {
            return;
        }

        info!(secret_id = %record.id, member_count, "all channel members viewed secret, collecting");
        if let Err(e) = self.store.delete(&record.id).await {
            error!(secret_id = %record.id, error = %e, "failed to delete viewed secret");
        }

        if let Some(post) = self.find_placeholder(&record.channel_id, &record.id).await {
            self.schedule_post_delete(post.id);
        }
    }

    /// Reap every expired record: flip its placeholder, then delete it.
    /// Returns how many records were reaped.
    pub async fn expire_sweep(&self) -> AppResult<usize> {
        let now = self.clock.now_millis();
        let expired = self.store.list_expired(now).await?;
        let count = expired.len();

        for secret in expired {
            debug!(secret_id = %secret.id, "sweeping expired secret");
            self.mark_placeholder_expired(&secret).await;
            if let Err(e) = self.store.delete(&secret.id).await {
                error!(secret_id = %secret.id, error = %e, "failed to delete expired secret");
            }
        }

        Ok(count)
    }

    /// Fire-and-forget completion check after a reveal that grew the
    /// viewed-by set. Held to the plugin lifecycle by the shutdown signal.
    fn spawn_collect(&self, secret: Secret) {
        let service = self.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = service.collect(&secret) => {}
                _ = shutdown.changed() => {}
            }
        });
    }

    async fn send_reveal_ephemeral(&self, viewer_id: &str, secret: &Secret, allow_copy: bool) {
        let mut post = Post {
            user_id: self.bot_id.clone(),
            channel_id: secret.channel_id.clone(),
            root_id: secret.root_id.clone(),
            message: secret.message.clone(),
            ..Default::default()
        };
        post.set_prop("allow_copy", Value::Bool(allow_copy));

        if let Err(e) = self.host.send_ephemeral_post(viewer_id, post).await {
            warn!(
                secret_id = %secret.id,
                viewer_id,
                error = %e,
                "failed to deliver reveal ephemeral"
            );
        }
    }

    async fn author_username(&self, user_id: &str) -> String {
        match self.host.get_user(user_id).await {
            Ok(Some(user)) => user.username,
            Ok(None) => "unknown".to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "failed to resolve author username");
                "unknown".to_string()
            }
        }
    }

    /// Effective member count of a channel, defaulting to
    /// [`DEFAULT_MEMBER_COUNT`] when the host cannot tell us.
    async fn channel_member_count(&self, channel_id: &str) -> i64 {
        match self.host.get_channel(channel_id).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(channel_id, "channel not found while resolving member count"),
            Err(e) => error!(channel_id, error = %e, "failed to get channel"),
        }

        let count = match self.host.get_channel_stats(channel_id).await {
            Ok(stats) => stats.member_count,
            Err(e) => {
                error!(channel_id, error = %e, "failed to get channel stats");
                0
            }
        };

        if count <= 0 {
            DEFAULT_MEMBER_COUNT
        } else {
            count
        }
    }

    /// Flip a placeholder to the expired attachment. Best-effort.
    async fn mark_placeholder_expired(&self, secret: &Secret) {
        let Some(mut post) = self.find_placeholder(&secret.channel_id, &secret.id).await else {
            return;
        };
        post.set_attachments(vec![SlackAttachment {
            title: ATTACHMENT_TITLE.to_string(),
            text: EXPIRED_TEXT.to_string(),
            color: "#DDDDDD".to_string(),
            ..Default::default()
        }]);
        if let Err(e) = self.host.update_post(post).await {
            error!(secret_id = %secret.id, error = %e, "failed to mark placeholder expired");
        }
    }

    /// Locate the placeholder post for a secret.
    ///
    /// Prefers the `secret_id` prop; falls back to scanning attachment action
    /// URLs for the id, which is how placeholders from the older layout
    /// identify themselves.
    async fn find_placeholder(&self, channel_id: &str, secret_id: &str) -> Option<Post> {
        let mut page = 0;
        loop {
            let posts = match self
                .host
                .get_posts_for_channel(channel_id, page, POSTS_PAGE_SIZE)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    error!(channel_id, error = %e, "failed to scan channel for placeholder");
                    return None;
                }
            };
            let page_len = posts.len();

            for post in posts {
                if post.prop_str(SECRET_ID_PROP) == Some(secret_id) {
                    return Some(post);
                }
                let legacy_match = post.attachments().iter().any(|attachment| {
                    attachment
                        .actions
                        .iter()
                        .any(|action| action.integration.url.contains(secret_id))
                });
                if legacy_match {
                    return Some(post);
                }
            }

            if page_len < POSTS_PAGE_SIZE {
                return None;
            }
            page += 1;
        }
    }

    fn schedule_post_delete(&self, post_id: String) {
        let host = Arc::clone(&self.host);
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(POST_DELETE_DELAY) => {
                    if let Err(e) = host.delete_post(&post_id).await {
                        error!(post_id, error = %e, "failed to delete placeholder post");
                    }
                }
                _ = shutdown.changed() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIds};
    use crate::config::PluginConfig;
    use crate::host::types::ChannelType;
    use crate::host::MemoryHost;
    use crate::store::{KvSecretStore, MemorySecretStore, SecretStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T0: i64 = 1_000_000_000_000;

    struct Harness {
        host: Arc<MemoryHost>,
        service: Arc<SecretService>,
        clock: Arc<FixedClock>,
        _shutdown: watch::Sender<bool>,
    }

    fn harness_with_config(config: PluginConfig) -> Harness {
        let host = Arc::new(MemoryHost::new());
        host.add_user("bot1", "secrets-bot");
        host.add_user("u_a", "alice");
        host.add_user("u_b", "bob");
        host.add_channel("c_1", ChannelType::Open, 2);

        let clock = FixedClock::new(T0);
        let (tx, rx) = watch::channel(false);
        let service = Arc::new(SecretService::new(
            Arc::new(KvSecretStore::new(host.clone())),
            host.clone(),
            Arc::new(ConfigHolder::new(config)),
            clock.clone(),
            Arc::new(SequentialIds::default()),
            "bot1".to_string(),
            rx,
        ));

        Harness {
            host,
            service,
            clock,
            _shutdown: tx,
        }
    }

    fn harness() -> Harness {
        harness_with_config(PluginConfig {
            secret_expiry_time: 60,
            allow_copy_to_clipboard: true,
        })
    }

    #[tokio::test]
    async fn test_create_sets_expiry_from_config() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        assert_eq!(secret.created_at, T0);
        assert_eq!(secret.expires_at - secret.created_at, 3_600_000);
        assert!(secret.viewed_by.is_empty());
        assert_eq!(secret.id.len(), crate::clock::ID_LENGTH);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let h = harness();
        assert!(matches!(
            h.service.create("u_a", "", "", "hello").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.create("u_a", "c_1", "", "").await,
            Err(AppError::InvalidInput(_))
        ));
        let oversized = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            h.service.create("u_a", "c_1", "", &oversized).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_parent() {
        let h = harness();
        let result = h.service.create("u_a", "c_1", "missing_root", "hello").await;
        assert!(matches!(result, Err(AppError::InvalidParent(_))));
        // Nothing was written.
        assert_eq!(h.host.kv_len(), 0);
    }

    #[tokio::test]
    async fn test_create_accepts_existing_parent() {
        let h = harness();
        let parent = h
            .host
            .create_post(Post {
                channel_id: "c_1".to_string(),
                message: "thread root".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let secret = h
            .service
            .create("u_a", "c_1", &parent.id, "hello")
            .await
            .unwrap();
        assert_eq!(secret.root_id, parent.id);
    }

    #[tokio::test]
    async fn test_create_placeholder_shape() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        let post = h.service.create_placeholder(&secret).await.unwrap();

        assert_eq!(post.post_type, SECRET_POST_TYPE);
        assert_eq!(post.prop_str(SECRET_ID_PROP), Some(secret.id.as_str()));
        let attachments = post.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].title, ATTACHMENT_TITLE);
        assert!(attachments[0].text.contains("@alice"));
        assert!(attachments[0].actions[0].integration.url.contains(&secret.id));
    }

    #[tokio::test]
    async fn test_reveal_happy_path() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        let outcome = h.service.reveal("u_b", &secret.id).await.unwrap();
        match outcome {
            RevealOutcome::Revealed {
                message,
                author_username,
                allow_copy,
            } => {
                assert_eq!(message, "hello");
                assert_eq!(author_username, "alice");
                assert!(allow_copy);
            }
            other => panic!("expected Revealed, got {other:?}"),
        }

        let stored = h.service.store.get(&secret.id).await.unwrap().unwrap();
        assert_eq!(stored.viewed_by, vec!["u_b"]);

        let ephemeral = h.host.ephemeral_posts();
        assert_eq!(ephemeral.len(), 1);
        assert_eq!(ephemeral[0].0, "u_b");
        assert_eq!(ephemeral[0].1.message, "hello");
    }

    #[tokio::test]
    async fn test_reveal_is_idempotent_per_viewer() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        let first = h.service.reveal("u_b", &secret.id).await.unwrap();
        let second = h.service.reveal("u_b", &secret.id).await.unwrap();
        assert_eq!(first, second);

        let stored = h.service.store.get(&secret.id).await.unwrap().unwrap();
        assert_eq!(stored.viewed_by, vec!["u_b"]);
    }

    #[tokio::test]
    async fn test_reveal_unknown_secret() {
        let h = harness();
        let outcome = h.service.reveal("u_b", "nope").await.unwrap();
        assert_eq!(outcome, RevealOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_reveal_expired_keeps_record_for_sweeper() {
        let h = harness_with_config(PluginConfig {
            secret_expiry_time: 1,
            allow_copy_to_clipboard: true,
        });
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        h.service.create_placeholder(&secret).await.unwrap();

        h.clock.set(T0 + 60_001);
        let outcome = h.service.reveal("u_b", &secret.id).await.unwrap();
        assert_eq!(outcome, RevealOutcome::Expired);

        // Reactive expiry does not delete; that is the sweeper's job.
        assert!(h.service.store.get(&secret.id).await.unwrap().is_some());

        // The placeholder now shows the expired attachment.
        let posts = h.host.get_posts_for_channel("c_1", 0, 100).await.unwrap();
        assert_eq!(posts[0].attachments()[0].text, EXPIRED_TEXT);

        let swept = h.service.expire_sweep().await.unwrap();
        assert_eq!(swept, 1);
        assert!(h.service.store.get(&secret.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reveal_boundary_one_minute_expiry() {
        let h = harness_with_config(PluginConfig {
            secret_expiry_time: 1,
            allow_copy_to_clipboard: true,
        });
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        h.clock.set(T0 + 59_000);
        assert!(matches!(
            h.service.reveal("u_b", &secret.id).await.unwrap(),
            RevealOutcome::Revealed { .. }
        ));

        h.clock.set(T0 + 60_000);
        assert_eq!(
            h.service.reveal("u_a", &secret.id).await.unwrap(),
            RevealOutcome::Expired
        );
    }

    #[tokio::test]
    async fn test_mark_viewed_unknown_secret() {
        let h = harness();
        assert!(matches!(
            h.service.mark_viewed("u_b", "nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_viewed_is_idempotent_and_silent() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        h.service.mark_viewed("u_b", &secret.id).await.unwrap();
        h.service.mark_viewed("u_b", &secret.id).await.unwrap();

        let stored = h.service.store.get(&secret.id).await.unwrap().unwrap();
        assert_eq!(stored.viewed_by, vec!["u_b"]);
        // No disclosure happened.
        assert!(h.host.ephemeral_posts().is_empty());
    }

    #[tokio::test]
    async fn test_close_states() {
        let h = harness_with_config(PluginConfig {
            secret_expiry_time: 1,
            allow_copy_to_clipboard: true,
        });
        assert_eq!(h.service.close("nope").await, CloseState::Unavailable);

        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        assert_eq!(h.service.close(&secret.id).await, CloseState::Closed);

        h.clock.set(T0 + 60_000);
        assert_eq!(h.service.close(&secret.id).await, CloseState::Expired);
    }

    /// Store that silently drops the first `lose` writes, imitating a
    /// concurrent last-writer-wins overwrite erasing an append.
    struct LossyStore {
        inner: MemorySecretStore,
        lose: AtomicUsize,
    }

    impl LossyStore {
        fn new(lose: usize) -> Self {
            Self {
                inner: MemorySecretStore::new(),
                lose: AtomicUsize::new(lose),
            }
        }
    }

    #[async_trait::async_trait]
    impl SecretStore for LossyStore {
        async fn save(&self, secret: &Secret) -> AppResult<()> {
            let remaining = self.lose.load(Ordering::SeqCst);
            if remaining > 0 {
                self.lose.store(remaining - 1, Ordering::SeqCst);
                return Ok(());
            }
            self.inner.save(secret).await
        }

        async fn get(&self, id: &str) -> AppResult<Option<Secret>> {
            self.inner.get(id).await
        }

        async fn delete(&self, id: &str) -> AppResult<()> {
            self.inner.delete(id).await
        }

        async fn list(&self) -> AppResult<Vec<Secret>> {
            self.inner.list().await
        }

        async fn list_expired(&self, now_millis: i64) -> AppResult<Vec<Secret>> {
            self.inner.list_expired(now_millis).await
        }
    }

    fn service_over(store: SharedSecretStore) -> (Arc<SecretService>, watch::Sender<bool>) {
        let host = Arc::new(MemoryHost::new());
        let (tx, rx) = watch::channel(false);
        let service = Arc::new(SecretService::new(
            store,
            host,
            Arc::new(ConfigHolder::default()),
            FixedClock::new(T0),
            Arc::new(SequentialIds::default()),
            "bot1".to_string(),
            rx,
        ));
        (service, tx)
    }

    #[tokio::test]
    async fn test_record_view_retries_lost_append() {
        let store = Arc::new(LossyStore::new(1));
        let seeded = Secret {
            id: "s1".to_string(),
            channel_id: "c_1".to_string(),
            expires_at: T0 + 3_600_000,
            ..Default::default()
        };
        store.inner.save(&seeded).await.unwrap();

        let (service, _tx) = service_over(store.clone());
        service.mark_viewed("u_b", "s1").await.unwrap();

        let stored = store.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.viewed_by, vec!["u_b"]);
    }

    #[tokio::test]
    async fn test_record_view_gives_up_after_bounded_retries() {
        let store = Arc::new(LossyStore::new(usize::MAX));
        let seeded = Secret {
            id: "s1".to_string(),
            channel_id: "c_1".to_string(),
            expires_at: T0 + 3_600_000,
            ..Default::default()
        };
        store.inner.save(&seeded).await.unwrap();

        let (service, _tx) = service_over(store.clone());
        assert!(matches!(
            service.mark_viewed("u_b", "s1").await,
            Err(AppError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reveals_lose_no_viewer() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        let viewers = ["u_b", "u_c", "u_d", "u_e"];
        let handles: Vec<_> = viewers
            .iter()
            .map(|viewer| {
                let service = Arc::clone(&h.service);
                let id = secret.id.clone();
                let viewer = viewer.to_string();
                tokio::spawn(async move { service.reveal(&viewer, &id).await })
            })
            .collect();
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap().unwrap(),
                RevealOutcome::Revealed { .. }
            ));
        }

        let stored = h.service.store.get(&secret.id).await.unwrap().unwrap();
        for viewer in viewers {
            assert!(stored.has_viewed(viewer), "lost viewer {viewer}");
        }
        assert_eq!(stored.viewed_by.len(), viewers.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_below_threshold_keeps_record() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        h.service.create_placeholder(&secret).await.unwrap();
        h.service.reveal("u_b", &secret.id).await.unwrap();

        h.service.collect(&secret).await;
        assert!(h.service.store.get(&secret.id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_reaps_when_all_members_viewed() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        let placeholder = h.service.create_placeholder(&secret).await.unwrap();

        h.service.reveal("u_b", &secret.id).await.unwrap();
        h.service.reveal("u_a", &secret.id).await.unwrap();

        h.service.collect(&secret).await;
        assert!(h.service.store.get(&secret.id).await.unwrap().is_none());

        // Placeholder deletion waits out the grace period.
        assert!(h.host.post(&placeholder.id).is_some());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(h.host.post(&placeholder.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_member_count_falls_back_on_stats_failure() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        h.service.reveal("u_b", &secret.id).await.unwrap();
        h.service.reveal("u_a", &secret.id).await.unwrap();

        // Both members viewed, but the host cannot confirm membership, so the
        // degraded threshold of 10 applies and the record survives.
        h.host.set_stats_failing(true);
        h.service.collect(&secret).await;
        assert!(h.service.store.get(&secret.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_placeholder_recognises_legacy_shape() {
        let h = harness();
        let secret = h.service.create("u_a", "c_1", "", "hello").await.unwrap();

        // Legacy placeholder: no secret_id prop, only a button URL.
        let mut legacy = Post {
            channel_id: "c_1".to_string(),
            ..Default::default()
        };
        legacy.set_attachments(vec![SlackAttachment {
            title: ATTACHMENT_TITLE.to_string(),
            actions: vec![PostAction {
                name: "View Secret".to_string(),
                action_type: "button".to_string(),
                integration: PostActionIntegration {
                    url: view_action_url(&secret.id),
                },
                ..Default::default()
            }],
            ..Default::default()
        }]);
        let legacy = h.host.create_post(legacy).await.unwrap();

        let found = h.service.find_placeholder("c_1", &secret.id).await.unwrap();
        assert_eq!(found.id, legacy.id);
    }

    #[tokio::test]
    async fn test_expire_sweep_ignores_live_records() {
        let h = harness();
        h.service.create("u_a", "c_1", "", "hello").await.unwrap();
        assert_eq!(h.service.expire_sweep().await.unwrap(), 0);
    }
}
