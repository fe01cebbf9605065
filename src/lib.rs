// Leshiy-AI dispatcher - model routing for the chat client

pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod intent;
pub mod providers;
pub mod proxy;
pub mod registry;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::ChatService;
use crate::config::{GlobalSecrets, SecretResolver};
use crate::dispatch::Dispatcher;
use crate::proxy::RelayTransport;
use crate::registry::ModelRegistry;
use crate::storage::{StorageBackend, StorageGateway};

pub use crate::dispatch::{Attachment, InboundRequest, NormalizedResult, ResultKind};
pub use crate::error::{DispatchError, DispatchResult};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Load config, open the selection store and serve the local API.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = config::init_config(config_path)?;

    let store = Arc::new(db::SqliteStore::open(&config.resolve_store_path())?);
    let secrets: Arc<dyn SecretResolver> = Arc::new(GlobalSecrets);
    let transport = Arc::new(RelayTransport::new(
        config.relay_url.clone(),
        secrets.clone(),
        config.proxy_secret_ref.clone(),
    ));
    tracing::info!("Relaying provider calls through {}", transport.relay_url());

    let dispatcher = Dispatcher::new(Arc::new(ModelRegistry::builtin()), store, secrets, transport);

    let storage = StorageGateway::from_config(&config).map(|g| Arc::new(g) as Arc<dyn StorageBackend>);
    if storage.is_none() {
        tracing::warn!("Storage gateway not configured; save requests will fail");
    }

    let state = api::AppState::new(ChatService::new(dispatcher, storage), config.api_keys.clone());

    let shutdown = tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
            let _ = api::stop_server().await;
        }
    });

    let served = api::start_server(state, &config.host, config.port).await;
    shutdown.abort();
    served
}
