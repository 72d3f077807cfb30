//! Live Notifier
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus metrics recorder
//! 3. Load the subscription registry (migrating legacy state)
//! 4. Spawn the dispatch queue, connection supervisor and gift name refresh
//! 5. Watch every stored room
//! 6. Serve health, metrics and commands over HTTP
//! 7. Wait for shutdown signal
//!
//! # Shutdown Flow
//!
//! Readiness is cleared and the supervisor stops every room and link
//! (pending cooldowns are dropped). The dispatcher then drains in-flight sends
//! within the grace period, the gift refresh stops, and the registry is flushed.

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use live_notifier::actors::{ActorMetrics, ConnectionSupervisor};
use live_notifier::clients::gift_config::spawn_refresh;
use live_notifier::clients::{GatewayStreamClient, GiftConfigClient, RoomApiClient, WebhookSender};
use live_notifier::commands::CommandService;
use live_notifier::config::Config;
use live_notifier::dispatch::{DispatchQueue, NotificationDispatcher};
use live_notifier::gifts::GiftCatalog;
use live_notifier::observability::{init_metrics_recorder, HealthState, StartupStep};
use live_notifier::persistence::PersistenceManager;
use live_notifier::registry::SubscriptionRegistry;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long to wait for the supervisor to stop rooms and links.
const SUPERVISOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it decides the log format
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config);
    info!("Starting Live Notifier");
    info!(
        data_file = %config.data_file.display(),
        cooldown_secs = config.cooldown.as_secs(),
        reconnect_delay_secs = config.reconnect_delay.as_secs(),
        max_attempts = config.retry.max_attempts,
        dispatch_concurrency = config.dispatch_concurrency,
        high_value_tier = %config.high_value_tier,
        http_bind_address = %config.http_bind_address,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    info!("Loading subscription registry...");
    let registry = Arc::new(
        SubscriptionRegistry::open(PersistenceManager::new(config.data_file.clone())).await,
    );
    health_state.complete(StartupStep::RegistryLoaded);

    let room_api = RoomApiClient::new(config.room_api_url.clone()).map_err(|e| {
        error!(error = %e, "Failed to create room API client");
        e
    })?;
    let sender = WebhookSender::new(config.webhook_url.clone(), config.webhook_token.clone())
        .map_err(|e| {
            error!(error = %e, "Failed to create webhook sender");
            e
        })?;
    let stream_client = GatewayStreamClient::new(config.stream_gateway_url.clone(), room_api.clone());

    let actor_metrics = ActorMetrics::new();

    let gift_catalog = GiftCatalog::new(config.high_value_tier);
    let gift_refresh_token = CancellationToken::new();
    let gift_refresh_task = match config.gift_refresh_interval {
        Some(interval) => {
            let client = GiftConfigClient::new(config.gift_config_url.clone()).map_err(|e| {
                error!(error = %e, "Failed to create gift config client");
                e
            })?;
            Some(spawn_refresh(
                client,
                gift_catalog.clone(),
                interval,
                gift_refresh_token.clone(),
            ))
        }
        None => {
            info!("Online gift names disabled, using the built-in table");
            None
        }
    };

    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&registry),
        Arc::new(sender),
        config.retry,
        gift_catalog,
        config.dispatch_concurrency,
    );
    let (dispatch_handle, dispatch_task) =
        DispatchQueue::spawn(dispatcher, config.shutdown_grace, Arc::clone(&actor_metrics));

    let (supervisor, supervisor_task) = ConnectionSupervisor::spawn(
        config.supervisor(),
        Arc::new(stream_client),
        dispatch_handle.notifier(),
        Arc::clone(&actor_metrics),
    );
    info!("Actor system initialized");

    let commands = CommandService::new(Arc::clone(&registry), supervisor.clone(), Arc::new(room_api));
    let watched = commands.start().await.map_err(|e| {
        error!(error = %e, "Failed to watch stored rooms");
        e
    })?;
    info!(rooms = watched, "Stored rooms watched");
    health_state.complete(StartupStep::RoomsWatched);

    let http_addr: SocketAddr = config.http_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.http_bind_address, "Invalid HTTP bind address");
        format!("Invalid HTTP bind address: {e}")
    })?;

    // Bind before spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %http_addr, "Failed to bind HTTP server");
            format!("Failed to bind HTTP server to {http_addr}: {e}")
        })?;

    let app = live_notifier::http::router(commands, Arc::clone(&health_state), prometheus_handle);
    let http_shutdown = CancellationToken::new();
    let server_token = http_shutdown.clone();
    let http_task = tokio::spawn(async move {
        info!(addr = %http_addr, "HTTP server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.complete(StartupStep::ListenerBound);
    info!("Live Notifier running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Readiness drops before any room stops
    health_state.begin_shutdown();

    if let Err(e) = supervisor.shutdown().await {
        warn!(error = %e, "Supervisor shutdown error");
    }
    join_task("supervisor", supervisor_task, SUPERVISOR_SHUTDOWN_TIMEOUT).await;

    dispatch_handle.shutdown();
    // The queue aborts its own sends after the grace period
    join_task(
        "dispatcher",
        dispatch_task,
        config.shutdown_grace + Duration::from_secs(1),
    )
    .await;

    gift_refresh_token.cancel();
    if let Some(task) = gift_refresh_task {
        join_task("gift-refresh", task, Duration::from_secs(5)).await;
    }

    http_shutdown.cancel();
    join_task("http", http_task, Duration::from_secs(5)).await;

    registry.flush().await;

    info!("Live Notifier shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{},tower_http=info",
            config.observability.default_directive("live_notifier")
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn join_task(name: &'static str, task: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(())) => info!(task = name, "Task stopped"),
        Ok(Err(e)) => warn!(task = name, error = %e, "Task ended with error"),
        Err(_) => warn!(
            task = name,
            timeout_secs = timeout.as_secs(),
            "Task did not stop in time"
        ),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
