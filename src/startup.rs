//! Application Startup
//!
//! Infrastructure selection, pipeline workers and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::pipeline::{
    DeliveryStage, MessageLocator, NotificationStage, PipelineMode, PipelineWorker,
    SequentialPipeline, StorageStage, SubmissionHandler, DELIVERY_GROUP, NOTIFICATION_GROUP,
    SEQUENTIAL_GROUP, STORAGE_GROUP,
};
use crate::application::services::{
    ConversationService, ConversationServiceImpl, MessageService, MessageServiceImpl,
};
use crate::config::{InfrastructureMode, Settings};
use crate::domain::{
    ConversationRepository, MessageRepository, PresenceRegistry, RealtimeChannel, SubmissionQueue,
};
use crate::infrastructure::memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryQueue,
};
use crate::infrastructure::presence::InMemoryPresenceRegistry;
use crate::infrastructure::repositories::{PgConversationRepository, PgMessageRepository};
use crate::infrastructure::{database, queue};
use crate::presentation::http::handlers::health;
use crate::presentation::http::routes;
use crate::presentation::websocket::Gateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub conversations: Arc<dyn ConversationService>,
    pub messages: Arc<dyn MessageService>,
    pub gateway: Arc<Gateway>,
    pub queue: Arc<dyn SubmissionQueue>,
    /// Present when the store is PostgreSQL
    pub db: Option<PgPool>,
}

/// Store, queue and presence backing one process
#[derive(Clone)]
pub struct Infrastructure {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub queue: Arc<dyn SubmissionQueue>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub db: Option<PgPool>,
}

impl Infrastructure {
    /// Process-local store and queue.
    pub fn in_memory(settings: &Settings) -> Self {
        Self {
            conversations: Arc::new(InMemoryConversationRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            queue: Arc::new(InMemoryQueue::new(
                settings.queue.block(),
                settings.queue.ack_timeout(),
            )
            .with_max_len(settings.queue.max_len)),
            presence: Arc::new(InMemoryPresenceRegistry::new()),
            db: None,
        }
    }

    /// Connect the backing services selected by `infrastructure.mode`.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        match settings.infrastructure.mode {
            InfrastructureMode::Memory => {
                tracing::warn!("Running on in-memory store and queue; nothing survives a restart");
                Ok(Self::in_memory(settings))
            }
            InfrastructureMode::Postgres => {
                let db = database::create_pool(&settings.database)
                    .await
                    .context("failed to create database pool")?;
                tracing::info!("Database connection pool created");

                if settings.database.run_migrations {
                    database::run_migrations(&db)
                        .await
                        .context("failed to run migrations")?;
                    tracing::info!("Database migrations applied");
                }

                let stream_queue = queue::create_stream_queue(&settings.redis, &settings.queue)
                    .await
                    .context("failed to connect to redis")?;

                Ok(Self {
                    conversations: Arc::new(PgConversationRepository::new(db.clone())),
                    messages: Arc::new(PgMessageRepository::new(db.clone())),
                    queue: Arc::new(stream_queue),
                    presence: Arc::new(InMemoryPresenceRegistry::new()),
                    db: Some(db),
                })
            }
        }
    }
}

/// Wire services and the gateway over the given infrastructure.
pub fn build_state(settings: Settings, infra: &Infrastructure) -> AppState {
    let gateway = Arc::new(Gateway::new(infra.presence.clone()));
    let realtime: Arc<dyn RealtimeChannel> = gateway.clone();

    let conversations = Arc::new(ConversationServiceImpl::new(
        infra.conversations.clone(),
        infra.messages.clone(),
        infra.presence.clone(),
        realtime.clone(),
    ));
    let messages = Arc::new(MessageServiceImpl::new(
        infra.conversations.clone(),
        infra.messages.clone(),
        infra.queue.clone(),
        realtime,
    ));

    AppState {
        settings: Arc::new(settings),
        conversations,
        messages,
        gateway,
        queue: infra.queue.clone(),
        db: infra.db.clone(),
    }
}

/// Running pipeline workers
pub struct PipelineHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Signal every worker and wait for them to finish their current event.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Pipeline worker panicked");
            }
        }
        tracing::info!("Pipeline stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Start the workers for the configured pipeline mode.
///
/// Fan-out runs one worker per stage on its own consumer group; sequential
/// runs one worker chaining all three stages.
pub fn spawn_pipeline(
    settings: &Settings,
    infra: &Infrastructure,
    realtime: Arc<dyn RealtimeChannel>,
) -> PipelineHandle {
    let options = settings.pipeline_options();
    let locator = MessageLocator::new(infra.messages.clone(), options.lookup);

    let storage: Arc<dyn SubmissionHandler> = Arc::new(StorageStage::new(
        infra.conversations.clone(),
        infra.messages.clone(),
        options.duplicate_policy,
    ));
    let delivery: Arc<dyn SubmissionHandler> =
        Arc::new(DeliveryStage::new(locator.clone(), realtime.clone()));
    let notification: Arc<dyn SubmissionHandler> = Arc::new(NotificationStage::new(
        infra.conversations.clone(),
        infra.messages.clone(),
        locator,
        infra.presence.clone(),
        realtime,
        options.effective_seen_settle(),
    ));

    let bindings: Vec<(&str, Arc<dyn SubmissionHandler>)> = match options.mode {
        PipelineMode::Fanout => vec![
            (STORAGE_GROUP, storage),
            (DELIVERY_GROUP, delivery),
            (NOTIFICATION_GROUP, notification),
        ],
        PipelineMode::Sequential => vec![(
            SEQUENTIAL_GROUP,
            Arc::new(SequentialPipeline::new(storage, delivery, notification)),
        )],
    };

    let (shutdown, shutdown_rx) = watch::channel(false);
    let workers = bindings
        .into_iter()
        .map(|(group, handler)| {
            let worker = PipelineWorker::new(
                infra.queue.clone(),
                handler,
                group,
                settings.queue.consumer.clone(),
                settings.queue.reconnect_delay(),
            );
            tokio::spawn(worker.run(shutdown_rx.clone()))
        })
        .collect();

    tracing::info!(mode = ?options.mode, duplicate_policy = ?options.duplicate_policy, "Pipeline started");
    PipelineHandle { shutdown, workers }
}

/// Create the HTTP router for a state.
pub fn build_router(state: AppState) -> Router {
    routes::create_router(state)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    pipeline: PipelineHandle,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        let infra = Infrastructure::connect(&settings).await?;
        let addr: SocketAddr = settings
            .server_addr()
            .parse()
            .with_context(|| format!("invalid server address {}", settings.server_addr()))?;

        let state = build_state(settings.clone(), &infra);
        let pipeline = spawn_pipeline(&settings, &infra, state.gateway.clone());
        let router = build_router(state);

        // Bind to address
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            pipeline,
        })
    }

    /// Run the server until a shutdown signal, then drain the pipeline
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.pipeline.shutdown().await;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
    tracing::info!("Shutdown signal received");
}
