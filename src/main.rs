use clap::Parser;
use errlens::config::Config;
use errlens::gemini::{GeminiClient, GenerationBackend};
use errlens::server::{create_router, AppState, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "errlens", version, about = "Error analysis service backed by a text-generation provider")]
struct Cli {
    /// Path to a TOML config file (takes precedence over ERRLENS_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("errlens=debug".parse()?)
        .add_directive("axum::rejection=trace".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    info!("Errlens error analysis service starting");

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load_auto(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    let listener_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Binding to {}", listener_addr);

    // Initialize the provider client once; handlers share it read-only
    let backend: Arc<dyn GenerationBackend> = Arc::new(GeminiClient::new(&config)?);

    // Create application state
    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        backend,
    });

    // Create router
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&listener_addr).await?;
    info!("Server listening on http://{}", listener_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e.into()
        })
}
