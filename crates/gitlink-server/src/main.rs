mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{error, info};

use gitlink_api::{
    AppStateInner, CommandDispatcher, CommandToken, DispatcherConfig, GatewayHost, KvSubscriptions, router,
};
use gitlink_crypto::AesGcmCipher;
use gitlink_db::{Database, KvStore, Vault};
use gitlink_gateway::EventHub;
use gitlink_gitlab::{Aggregator, HttpClientFactory, OrgScope};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitlink=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("FATAL: {}. Set it in your .env file and restart.", e);
            std::process::exit(1);
        }
    };

    // Storage and vault
    let store: Arc<dyn KvStore> = Arc::new(Database::open(&config.db_path)?);
    let cipher = Arc::new(AesGcmCipher::from_secret(&config.encryption_key));
    let vault = Vault::new(store.clone(), cipher);

    // Collaborators
    let scope = OrgScope::new(config.gitlab_org.as_deref());
    let hub = EventHub::new();
    let clients = Arc::new(HttpClientFactory::new(&config.gitlab_url));
    let aggregator = Aggregator::new(scope.clone(), &config.gitlab_url, config.upstream_timeout);
    let subscriptions = Arc::new(KvSubscriptions::new(store.clone(), scope, &config.gitlab_url));
    let host = Arc::new(GatewayHost::new(hub.clone(), store));

    let dispatcher = CommandDispatcher::new(
        DispatcherConfig {
            site_url: config.site_url.clone(),
            gitlab_url: config.gitlab_url.clone(),
        },
        vault,
        clients,
        aggregator,
        subscriptions,
        host,
    );

    let state = Arc::new(AppStateInner {
        dispatcher,
        hub,
        events_secret: config.events_secret.clone(),
    });

    let app = router(state, CommandToken::new(&config.command_token)).layer(TraceLayer::new_for_http());

    if config.site_url.is_none() {
        info!("GITLINK_SITE_URL is not set; /gitlab connect will report an error");
    }
    match &config.gitlab_org {
        Some(org) => info!("Restricting repositories to the {} organization", org),
        None => info!("No organization restriction"),
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("GitLab plugin listening on {} (upstream {})", addr, config.gitlab_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
