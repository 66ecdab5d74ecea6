use secretdrop::clock::{RandomIds, SystemClock};
use secretdrop::config::AppConfig;
use secretdrop::host::types::ChannelType;
use secretdrop::host::{MemoryHost, SharedHost};
use secretdrop::plugin::Plugin;
use secretdrop::web::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Standalone development server.
///
/// Runs the plugin against the in-memory host so the HTTP surface can be
/// exercised without a real chat platform. Production deployments embed the
/// same [`Plugin`] behind the host's plugin runtime instead.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging first
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secretdrop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SecretDrop v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    // Seed the in-memory host with a demo user and channel so requests with
    // the Mattermost-User-Id header have something to act on.
    let memory_host = Arc::new(MemoryHost::new());
    memory_host.add_user("dev_user", "dev");
    memory_host.add_channel("dev_channel", ChannelType::Open, 2);
    let host: SharedHost = memory_host;

    let mut plugin = Plugin::new(
        host,
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        config.plugin.clone(),
    );
    plugin.on_activate().await?;

    let service = plugin
        .service()
        .ok_or_else(|| anyhow::anyhow!("plugin activation did not produce a service"))?;
    let app = web::create_router(AppState { service });

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Web server listening on http://{}", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    plugin.on_deactivate().await;
    server.abort();

    Ok(())
}
