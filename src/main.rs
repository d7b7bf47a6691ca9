//! monix - system monitor API server
//!
//! Serves live system metrics as JSON with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod prompt;
mod state;

use anyhow::{anyhow, Context};
use axum::{routing::get, Router};
use clap::Parser;
use monix::engine::Engine;
use monix::source::ProcfsSource;
use monix::Telemetry;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, level_filters::LevelFilter};

use cli::{Args, Commands, LogLevel};
use commands::{command_config, command_sample};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::{
    api_info_handler, domain_handler, health_handler, metrics_handler, root::UI_PATH,
    root_handler,
};
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args).map_err(|e| anyhow!("{}", e))?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves the listen address, asking on the terminal when allowed.
fn resolve_listen_address(config: &Config, args: &Args) -> (String, u16) {
    let interactive = config.interactive.unwrap_or(true)
        && args.bind.is_none()
        && args.port.is_none()
        && io::stdin().is_terminal();

    if !interactive {
        return (config.bind(), config.port());
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    match prompt::prompt_server_address(&mut input, &mut output, &config.bind(), config.port()) {
        Ok(address) => address,
        Err(e) => {
            error!("Failed to read server configuration from stdin: {}", e);
            (config.bind(), config.port())
        }
    }
}

/// Builds the HTTP router.
fn build_router(state: SharedState, frontend_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/api", get(api_info_handler))
        .route("/api/{domain}", get(domain_handler))
        .route("/health", get(health_handler));

    if state.telemetry.is_some() {
        app = app.route("/metrics", get(metrics_handler));
    }

    if let Some(dir) = frontend_dir {
        app = app.nest_service(UI_PATH, ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args).map_err(|e| anyhow!("{}", e))?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone()).map_err(|e| anyhow!("{}", e));
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = load_validated_config(&args)?;

        return match command {
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::Sample {
                domains,
                iterations,
                interval_ms,
            } => command_sample(domains, *iterations, *interval_ms, &config),
        }
        .map_err(|e| anyhow!("{}", e));
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    prompt::print_banner();
    setup_logging(&args);

    info!("Starting monix");

    let (bind, port) = resolve_listen_address(&config, &args);

    let frontend_dir = config.resolve_frontend_dir();
    match &frontend_dir {
        Some(dir) => info!("Found frontend at: {}", dir.display()),
        None => info!("Frontend directory not found. Only API will be available."),
    }

    let telemetry = if config.enable_telemetry.unwrap_or(true) {
        Some(Arc::new(
            Telemetry::new().context("Failed to register telemetry metrics")?,
        ))
    } else {
        debug!("Telemetry disabled in configuration");
        None
    };

    let engine_config = config.engine_config();
    debug!("Engine configuration: {:?}", engine_config);
    let mut engine = Engine::new(Arc::new(ProcfsSource::new()), engine_config);
    if let Some(telemetry) = &telemetry {
        engine = engine.with_telemetry(Arc::clone(telemetry));
    }

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
        telemetry,
        frontend_mounted: frontend_dir.is_some(),
        start_time: Instant::now(),
    });

    let app = build_router(state, frontend_dir.as_deref());

    // Configure HTTP server
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind, port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("Starting Monix server on {}:{}", bind, port);
    println!("API available at: http://{}:{}/api", bind, port);
    if frontend_dir.is_some() {
        println!("UI available at: http://{}:{}{}", bind, port, UI_PATH);
    }
    info!("monix listening on http://{}", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    info!("monix stopped gracefully");
    Ok(())
}
