use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jobfront_core::store::FsJobStore;
use jobfront_events::{EventBus, GroupBroadcaster};
use jobfront_pipeline::{HttpFront, InteractionManager, JobQueue, PipelineConfig};
use jobfront_worker::TokioSupervisor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobfront_api::config::ServerConfig;
use jobfront_api::notifications::GroupRouter;
use jobfront_api::router::build_app_router;
use jobfront_api::state::AppState;
use jobfront_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobfront_api=debug,jobfront_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env(&config.local_callback_address());
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        worker = %pipeline_config.worker_program,
        max_queue = pipeline_config.max_queue,
        workspace = %pipeline_config.workspace_root.display(),
        callback = %pipeline_config.callback_address,
        "Loaded pipeline configuration",
    );

    // --- Job store ---
    let job_store = Arc::new(FsJobStore::new(&pipeline_config.workspace_root));

    // --- WebSocket manager and job groups ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let groups = Arc::new(GroupBroadcaster::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let router_cancel = CancellationToken::new();
    let group_router = GroupRouter::new(Arc::clone(&groups), Arc::clone(&ws_manager));
    let router_handle = tokio::spawn(group_router.run(event_bus.subscribe(), router_cancel.clone()));

    // --- Interactions and dispatcher ---
    let interactions = Arc::new(InteractionManager::new(
        job_store.clone(),
        Arc::clone(&event_bus),
        Arc::new(HttpFront::new()),
        pipeline_config.interaction_timeout,
    ));
    let job_queue = JobQueue::start(
        pipeline_config,
        job_store.clone(),
        Arc::new(TokioSupervisor::default()),
        Arc::clone(&interactions),
        Arc::clone(&event_bus),
    );
    tracing::info!("Job dispatcher started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        groups,
        job_store,
        job_queue: Arc::clone(&job_queue),
        interactions,
        event_bus,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Jobs are canceled as soon as the signal arrives: that ends their
    // pending interactions, whose requests would otherwise hold the
    // server open.
    let dispatcher = Arc::clone(&job_queue);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            dispatcher.shutdown().await;
            tracing::info!("Job dispatcher shut down");
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    router_cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let _ = tokio::time::timeout(grace, router_handle).await;
    tracing::info!("Group router shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
