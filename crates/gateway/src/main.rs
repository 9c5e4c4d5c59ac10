use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use gw_domain::bus::EventBus;
use gw_domain::config::{Config, ConfigSeverity};
use gw_gateway::api;
use gw_gateway::cli::{Cli, Command, ConfigCommand};
use gw_gateway::runtime::cancel::CancelMap;
use gw_gateway::runtime::commands::CommandRegistry;
use gw_gateway::runtime::schedules::ScheduleStore;
use gw_gateway::runtime::session_lock::SessionLockMap;
use gw_gateway::runtime::ScheduleTurnInjector;
use gw_gateway::state::AppState;
use gw_providers::LlmRouter;
use gw_sessions::{IdentityResolver, LifecycleManager, SessionStore, TranscriptWriter};
use gw_tools::{ProcessManager, ToolRegistry};

/// Env var read once at startup to gate protected routes behind a bearer
/// token. Unset or empty disables auth (dev mode).
const API_TOKEN_ENV: &str = "SA_API_TOKEN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = gw_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = gw_gateway::cli::load_config()?;
            let passed = gw_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = gw_gateway::cli::load_config()?;
            let valid = gw_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = gw_gateway::cli::load_config()?;
            gw_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Setup) => gw_gateway::cli::setup::run().await,
        Some(Command::Version) => {
            println!("personal-agent-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gw_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("personal agent gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    std::fs::create_dir_all(&config.workspace.path)
        .with_context(|| format!("creating workspace dir {}", config.workspace.path.display()))?;
    std::fs::create_dir_all(&config.workspace.state_path).with_context(|| {
        format!(
            "creating state dir {}",
            config.workspace.state_path.display()
        )
    })?;

    // ── LLM providers ────────────────────────────────────────────────
    let llm = Arc::new(LlmRouter::from_config(&config.llm).context("initializing LLM providers")?);
    if llm.registry().is_empty() {
        tracing::warn!(
            "no LLM providers initialized — gateway will run but \
             /v1/models will be empty and chat calls will fail"
        );
    } else {
        tracing::info!(providers = llm.registry().len(), "LLM provider registry ready");
    }

    // ── Session management ───────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::new(&config.workspace.state_path).context("initializing session store")?,
    );
    let identity = Arc::new(IdentityResolver::from_config(&config.sessions.identity_links));
    let lifecycle = Arc::new(LifecycleManager::new(config.sessions.lifecycle.clone()));
    let transcript_dir = sessions.transcript_dir();
    let transcripts = Arc::new(TranscriptWriter::new(&transcript_dir));
    tracing::info!(
        agent_id = %config.sessions.agent_id,
        dm_scope = ?config.sessions.dm_scope,
        identity_links = identity.len(),
        "session management ready"
    );

    // ── Tools & process manager ──────────────────────────────────────
    let tools = Arc::new(ToolRegistry::with_builtin_tools());
    let processes = Arc::new(ProcessManager::new(config.tools.exec.clone()));
    tracing::info!(tool_count = tools.definitions().len(), "tool registry ready");

    // ── Session locks + cancellation ─────────────────────────────────
    let session_locks = Arc::new(SessionLockMap::new());
    let cancel_map = Arc::new(CancelMap::new());

    // ── Schedule store ────────────────────────────────────────────────
    let schedules = Arc::new(ScheduleStore::new(&config.workspace.state_path));
    tracing::info!("schedule store ready");

    // ── Event/command bus ─────────────────────────────────────────────
    let bus = Arc::new(EventBus::new());

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = match std::env::var(API_TOKEN_ENV) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = API_TOKEN_ENV, "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = API_TOKEN_ENV,
                "API bearer-token auth DISABLED — set {} to enable",
                API_TOKEN_ENV
            );
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        llm,
        sessions: sessions.clone(),
        identity,
        lifecycle,
        transcripts,
        session_locks,
        tools,
        processes: processes.clone(),
        cancel_map,
        schedules: schedules.clone(),
        commands: Arc::new(CommandRegistry::with_builtins()),
        bus,
        api_token_hash,
        workspace_root: config.workspace.path.clone(),
    };

    // ── Periodic session flush ───────────────────────────────────────
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.flush() {
                    tracing::warn!(error = %e, "session store flush failed");
                }
            }
        });
    }

    // ── Periodic process cleanup ─────────────────────────────────────
    {
        let processes = processes.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                processes.cleanup_stale();
            }
        });
    }

    // ── Schedule runner (tick every 30s, inject due schedules as turns) ──
    {
        let injector: Arc<dyn gw_gateway::runtime::schedules::TurnInjector> =
            Arc::new(ScheduleTurnInjector {
                state: state.clone(),
            });
        let runner = gw_gateway::runtime::schedules::ScheduleRunner::new(schedules.clone(), injector);
        tokio::spawn(async move {
            runner.run().await;
        });
    }
    tracing::info!("schedule runner started");

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = std::env::var("SA_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "personal agent gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). These are expanded into a predicate that
/// matches any port on that host.  A literal `"*"` allows all origins
/// (not recommended for production).
fn build_cors_layer(cors: &gw_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    // Special case: if the only entry is "*", use fully permissive CORS.
    // Note: allow_credentials is incompatible with wildcard origins.
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    // Partition into exact origins and wildcard-port patterns.
    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            // e.g. "http://localhost:*" -> prefix "http://localhost:"
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            // Check exact matches first.
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            // Check wildcard-port patterns -- validate remainder is digits only
            // to prevent prefix-based bypass (e.g. "http://localhost:3000.evil.com").
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
