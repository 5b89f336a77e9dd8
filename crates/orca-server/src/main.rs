//! Orca server binary.
//!
//! Starts the rooms API with structured logging, database initialization, the
//! moderator agent supervisor, and graceful shutdown on SIGTERM/SIGINT.

use orca_server::agents::{AgentSupervisor, VoiceSessionFactory};
use orca_server::config::{self, Config};
use orca_server::{app, AppState};
use orca_voice::{OpenAiChatModel, TtsService, VoiceService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ORCA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

async fn build_supervisor(config: &Config, voice: Arc<VoiceService>) -> AgentSupervisor {
    if !config.agent.enabled {
        tracing::info!("moderator agent disabled by configuration");
        return AgentSupervisor::disabled(voice);
    }

    let model = match OpenAiChatModel::new(config.agent.model.clone()) {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(error = %e, "chat model unavailable, moderator agent disabled");
            return AgentSupervisor::disabled(voice);
        }
    };

    let tts = TtsService::new(&config.agent.voices_dir, &config.agent.piper_binary);
    tts.add_profile(config.agent.voice.clone()).await;

    tracing::info!(
        model = %config.agent.model.model,
        voice = %config.agent.voice.id,
        "moderator agent enabled"
    );
    AgentSupervisor::new(
        voice,
        Arc::new(VoiceSessionFactory::new(
            Arc::new(model),
            Arc::new(tts),
            config.agent.voice.clone(),
        )),
    )
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let pool = orca_db::create_pool(
        &config.database.path,
        orca_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool, check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = orca_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    if !config.livekit.has_credentials() {
        tracing::warn!("LiveKit API key or secret missing, voice credentials will fail");
    }
    let voice_service = Arc::new(VoiceService::new(config.livekit.clone()));
    let agents = build_supervisor(&config, Arc::clone(&voice_service)).await;

    let state = AppState::new(pool, voice_service, agents.clone());
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting orca server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    agents.stop_all();
    tracing::info!("orca server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
