//! Plugin root: process-wide wiring and lifecycle.
//!
//! Owns the host handle, the configuration holder, the service and the
//! sweeper. Everything long-lived starts in [`Plugin::on_activate`] and stops
//! in [`Plugin::on_deactivate`] via an explicit shutdown signal; nothing here
//! is a static singleton.

use crate::clock::{Clock, IdSource};
use crate::config::{ConfigHolder, PluginConfig};
use crate::error::{AppError, AppResult};
use crate::host::types::{Bot, Command, CommandResponse};
use crate::host::{HostApi, SharedHost};
use crate::service::SecretService;
use crate::store::KvSecretStore;
use crate::sweeper;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const BOT_USERNAME: &str = "secrets-bot";
const BOT_DISPLAY_NAME: &str = "Secrets Bot";
const BOT_DESCRIPTION: &str = "A bot account for the Secrets plugin";

pub const COMMAND_TRIGGER: &str = "secret";

pub struct Plugin {
    host: SharedHost,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    config: Arc<ConfigHolder>,
    service: Option<Arc<SecretService>>,
    sweeper: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Plugin {
    pub fn new(
        host: SharedHost,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        config: PluginConfig,
    ) -> Self {
        Self {
            host,
            clock,
            ids,
            config: Arc::new(ConfigHolder::new(config)),
            service: None,
            sweeper: None,
            shutdown: None,
        }
    }

    /// Provision the bot account, register the slash command, build the
    /// service and start the sweeper.
    pub async fn on_activate(&mut self) -> AppResult<()> {
        self.config.current().validate()?;

        let bot_id = self.ensure_bot().await?;

        self.host
            .register_command(Command {
                trigger: COMMAND_TRIGGER.to_string(),
                display_name: "Secret Message".to_string(),
                description: "Send a secret message that disappears after being viewed"
                    .to_string(),
                auto_complete: true,
                auto_complete_desc: "Create a secret message".to_string(),
                auto_complete_hint: "[message]".to_string(),
            })
            .await
            .map_err(|e| AppError::HostUnavailable(format!("failed to register command: {e}")))?;

        let (tx, rx) = watch::channel(false);
        let service = Arc::new(SecretService::new(
            Arc::new(KvSecretStore::new(Arc::clone(&self.host))),
            Arc::clone(&self.host),
            Arc::clone(&self.config),
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
            bot_id,
            rx.clone(),
        ));
        let sweeper = sweeper::spawn(Arc::clone(&service), rx);

        self.service = Some(service);
        self.sweeper = Some(sweeper);
        self.shutdown = Some(tx);

        info!("secrets plugin activated");
        Ok(())
    }

    /// Signal shutdown and join the sweeper. Fire-and-forget tasks holding a
    /// shutdown receiver wind down on their own.
    pub async fn on_deactivate(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(sweeper) = self.sweeper.take() {
            if let Err(e) = sweeper.await {
                error!(error = %e, "sweeper task did not shut down cleanly");
            }
        }
        self.service = None;
        info!("secrets plugin deactivated");
    }

    /// Service handle for the request router. `None` before activation.
    pub fn service(&self) -> Option<Arc<SecretService>> {
        self.service.clone()
    }

    pub fn config(&self) -> Arc<ConfigHolder> {
        Arc::clone(&self.config)
    }

    /// Validate and atomically swap the active configuration snapshot.
    pub fn update_configuration(&self, config: PluginConfig) -> AppResult<()> {
        config.validate()?;
        self.config.replace(config);
        Ok(())
    }

    /// Handle `/secret <text>`: create the record and its placeholder post,
    /// replying to the author ephemerally.
    pub async fn execute_command(
        &self,
        author_id: &str,
        channel_id: &str,
        root_id: &str,
        command: &str,
    ) -> CommandResponse {
        let Some(service) = self.service.as_ref() else {
            return CommandResponse::ephemeral("The secrets plugin is not active.");
        };

        let message = command
            .strip_prefix(&format!("/{COMMAND_TRIGGER}"))
            .unwrap_or(command)
            .trim();
        if message.is_empty() {
            return CommandResponse::ephemeral("Please provide a message to be kept secret.");
        }

        let secret = match service.create(author_id, channel_id, root_id, message).await {
            Ok(secret) => secret,
            Err(e) => {
                return CommandResponse::ephemeral(format!("Error creating secret: {e}"));
            }
        };

        if let Err(e) = service.create_placeholder(&secret).await {
            return CommandResponse::ephemeral(format!("Error creating post: {e}"));
        }

        CommandResponse::ephemeral("Secret message created successfully!")
    }

    /// Resolve the bot user, creating it on first activation. A create that
    /// fails because another instance won the race is resolved by re-fetching.
    async fn ensure_bot(&self) -> AppResult<String> {
        match self.host.get_user_by_username(BOT_USERNAME).await {
            Ok(Some(user)) => return Ok(user.id),
            Ok(None) => {}
            Err(e) => {
                return Err(AppError::HostUnavailable(format!(
                    "failed to look up bot account: {e}"
                )))
            }
        }

        match self
            .host
            .create_bot(Bot {
                username: BOT_USERNAME.to_string(),
                display_name: BOT_DISPLAY_NAME.to_string(),
                description: BOT_DESCRIPTION.to_string(),
            })
            .await
        {
            Ok(user) => Ok(user.id),
            Err(create_err) => {
                warn!(error = %create_err, "bot creation failed, re-fetching");
                match self.host.get_user_by_username(BOT_USERNAME).await {
                    Ok(Some(user)) => Ok(user.id),
                    _ => Err(AppError::HostUnavailable(format!(
                        "failed to create bot account: {create_err}"
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SequentialIds};
    use crate::host::types::ChannelType;
    use crate::host::MemoryHost;

    const T0: i64 = 1_000_000_000_000;

    fn plugin_over(host: Arc<MemoryHost>) -> Plugin {
        Plugin::new(
            host,
            FixedClock::new(T0),
            Arc::new(SequentialIds::default()),
            PluginConfig::default(),
        )
    }

    fn seeded_host() -> Arc<MemoryHost> {
        let host = Arc::new(MemoryHost::new());
        host.add_user("u_a", "alice");
        host.add_channel("c_1", ChannelType::Open, 2);
        host
    }

    #[tokio::test]
    async fn test_activate_provisions_bot_and_command() {
        let host = seeded_host();
        let mut plugin = plugin_over(host.clone());
        plugin.on_activate().await.unwrap();

        let bot = host.get_user_by_username(BOT_USERNAME).await.unwrap();
        assert!(bot.is_some());

        let commands = host.registered_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].trigger, COMMAND_TRIGGER);
        assert_eq!(commands[0].auto_complete_hint, "[message]");

        assert!(plugin.service().is_some());
        plugin.on_deactivate().await;
        assert!(plugin.service().is_none());
    }

    #[tokio::test]
    async fn test_activate_reuses_existing_bot() {
        let host = seeded_host();
        host.add_user("bot_existing", BOT_USERNAME);

        let mut plugin = plugin_over(host.clone());
        plugin.on_activate().await.unwrap();

        // No second account was created for the same username.
        let bot = host.get_user_by_username(BOT_USERNAME).await.unwrap();
        assert_eq!(bot.unwrap().id, "bot_existing");
        plugin.on_deactivate().await;
    }

    #[tokio::test]
    async fn test_activate_rejects_invalid_config() {
        let host = seeded_host();
        let mut plugin = Plugin::new(
            host,
            FixedClock::new(T0),
            Arc::new(SequentialIds::default()),
            PluginConfig {
                secret_expiry_time: 0,
                allow_copy_to_clipboard: true,
            },
        );
        assert!(matches!(
            plugin.on_activate().await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_command_creates_secret_and_placeholder() {
        let host = seeded_host();
        let mut plugin = plugin_over(host.clone());
        plugin.on_activate().await.unwrap();

        let response = plugin
            .execute_command("u_a", "c_1", "", "/secret the launch code is 0000")
            .await;
        assert_eq!(response.response_type, "ephemeral");
        assert_eq!(response.text, "Secret message created successfully!");

        let posts = host.get_posts_for_channel("c_1", 0, 100).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].prop_str("secret_id").is_some());
        let attachments = posts[0].attachments();
        assert!(attachments[0].text.contains("@alice"));

        // The message itself never appears in the placeholder.
        let raw = serde_json::to_string(&posts[0]).unwrap();
        assert!(!raw.contains("launch code"));

        plugin.on_deactivate().await;
    }

    #[tokio::test]
    async fn test_execute_command_empty_message() {
        let host = seeded_host();
        let mut plugin = plugin_over(host.clone());
        plugin.on_activate().await.unwrap();

        let response = plugin.execute_command("u_a", "c_1", "", "/secret   ").await;
        assert_eq!(response.text, "Please provide a message to be kept secret.");
        assert_eq!(host.post_count(), 0);

        plugin.on_deactivate().await;
    }

    #[tokio::test]
    async fn test_execute_command_surfaces_create_error() {
        let host = seeded_host();
        let mut plugin = plugin_over(host.clone());
        plugin.on_activate().await.unwrap();

        host.set_kv_failing(true);
        let response = plugin.execute_command("u_a", "c_1", "", "/secret hush").await;
        assert!(response.text.starts_with("Error creating secret:"));

        plugin.on_deactivate().await;
    }

    #[tokio::test]
    async fn test_update_configuration_swaps_snapshot() {
        let host = seeded_host();
        let plugin = plugin_over(host);

        plugin
            .update_configuration(PluginConfig {
                secret_expiry_time: 5,
                allow_copy_to_clipboard: false,
            })
            .unwrap();
        assert_eq!(plugin.config().current().secret_expiry_time, 5);

        assert!(plugin
            .update_configuration(PluginConfig {
                secret_expiry_time: -1,
                allow_copy_to_clipboard: true,
            })
            .is_err());
        // The bad snapshot was rejected, not applied.
        assert_eq!(plugin.config().current().secret_expiry_time, 5);
    }
}
