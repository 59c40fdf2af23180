use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use project_box::{
    api,
    config::{Config, PublisherBackend, StorageBackend},
    lifecycle::{LifecycleSettings, ProjectManager},
    object_store as obj,
    publisher::{LogPublisher, MessagePublisher, RabbitHttpPublisher},
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "project-box starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.node.data_dir)?;
    info!("Database opened at: {}", config.node.data_dir);

    // Initialize object store backend
    let (object_store, url_signer): (Arc<dyn obj::ObjectStore>, Option<obj::UrlSigner>) =
        match config.storage.backend {
            StorageBackend::Local => {
                let signer = obj::UrlSigner::new(
                    &config.storage.public_base_url,
                    &config.storage.url_signing_secret,
                );
                let store =
                    obj::LocalStore::new(&config.storage.local_storage_path, signer.clone())?;
                info!(
                    "Using local storage backend at: {}",
                    config.storage.local_storage_path
                );
                (Arc::new(store), Some(signer))
            }
            StorageBackend::Gcs => {
                let store =
                    obj::GcsStore::new(config.storage.gcs_credentials_file.as_deref()).await?;
                info!(
                    "Using GCS storage backend, bucket: {}",
                    config.storage.resource_bucket
                );
                (Arc::new(store), None)
            }
        };

    // Initialize index publisher
    let publisher: Arc<dyn MessagePublisher> = match config.publisher.backend {
        PublisherBackend::RabbitHttp => {
            let publisher = RabbitHttpPublisher::new(
                &config.publisher.rabbitmq_api_url,
                &config.publisher.rabbitmq_vhost,
                &config.publisher.rabbitmq_username,
                &config.publisher.rabbitmq_password,
            )?;
            info!(
                api = %config.publisher.rabbitmq_api_url,
                exchange = %config.publisher.exchange,
                "Publishing index events to RabbitMQ"
            );
            Arc::new(publisher)
        }
        PublisherBackend::Disabled => {
            info!("Index publishing disabled");
            Arc::new(LogPublisher)
        }
    };

    let projects = ProjectManager::with_database(
        db.clone(),
        Arc::clone(&object_store),
        publisher,
        LifecycleSettings {
            resource_bucket: config.storage.resource_bucket.clone(),
            exchange: config.publisher.exchange.clone(),
            url_ttl: config.storage.url_ttl,
            allocation_retries: config.lifecycle.allocation_retries,
        },
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        object_store,
        url_signer,
        projects,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
