//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, DocumentExtractor, InMemoryStore, LoggingResetNotifier, OpenAiTextAdapter,
        StoreMonitor,
    },
    config::Config,
    error::ApiError,
    web::{app, cors_layer, AppState, TokenIssuer},
};
use async_openai::{config::OpenAIConfig, Client};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use study_assistant_core::ports::{BlobStore, SessionStore, UserStore};
use study_assistant_core::{AssistantSettings, StudyAssistant, UploadPipeline};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The three persistence ports, served by one backing store.
struct Stores {
    sessions: Arc<dyn SessionStore>,
    blobs: Arc<dyn BlobStore>,
    users: Arc<dyn UserStore>,
    pool: Option<PgPool>,
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Store & Run Migrations ---
    let monitor = StoreMonitor::new();
    let stores = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = monitor
                .connect_with_retry(config.store_retry_delay, || {
                    PgPoolOptions::new().max_connections(5).connect(url)
                })
                .await;
            let db_adapter = Arc::new(DbAdapter::new(pool.clone()));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Stores {
                sessions: db_adapter.clone(),
                blobs: db_adapter.clone(),
                users: db_adapter,
                pool: Some(pool),
            }
        }
        None => {
            warn!("DATABASE_URL is not set; using the in-memory store. Data will not survive a restart.");
            let memory = Arc::new(InMemoryStore::new());
            monitor.mark_ready();
            Stores {
                sessions: memory.clone(),
                blobs: memory.clone(),
                users: memory,
                pool: None,
            }
        }
    };

    // --- 3. Initialize Service Adapters ---
    let openai_client =
        Client::with_config(OpenAIConfig::new().with_api_key(config.openai_api_key.as_str()));
    let summarizer = Arc::new(OpenAiTextAdapter::new(
        openai_client.clone(),
        config.summary_model.clone(),
    ));
    let question_writer = Arc::new(OpenAiTextAdapter::new(
        openai_client,
        config.questions_model.clone(),
    ));

    let assistant = Arc::new(StudyAssistant::new(
        summarizer,
        question_writer,
        AssistantSettings {
            question_count: config.question_count,
            max_input_chars: config.max_prompt_chars,
            call_timeout: config.ai_timeout,
            ..AssistantSettings::default()
        },
    ));
    let pipeline = Arc::new(UploadPipeline::new(
        stores.sessions.clone(),
        stores.blobs.clone(),
        Arc::new(DocumentExtractor::new()),
        assistant,
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        sessions: stores.sessions,
        blobs: stores.blobs,
        users: stores.users,
        notifier: Arc::new(LoggingResetNotifier),
        pipeline,
        tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl),
        config: config.clone(),
        store_status: monitor.subscribe(),
    });

    // --- 5. Create the Web Router ---
    let app = app(app_state).layer(cors_layer(&config)?);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Release the Store ---
    if let Some(pool) = stores.pool {
        pool.close().await;
    }
    monitor.mark_closed();
    info!("Server stopped.");

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received.");
}
