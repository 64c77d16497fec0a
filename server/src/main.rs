use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pairlink_server::client::{FileCredentialStore, GatewayConnector};
use pairlink_server::config::Config;
use pairlink_server::session::{ManagerSettings, RetryPolicy, SessionManager};
use pairlink_server::{AppState, app_router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ensure a directory exists, creating it if necessary.
/// Returns true if directory exists and is empty.
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<bool> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(true) // newly created, so empty
    } else if path.is_dir() {
        let is_empty = path.read_dir()?.next().is_none();
        Ok(is_empty)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Route panics through tracing so they land in the same log stream
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairlink=debug,pairlink_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    install_panic_hook();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, session={}, env={}",
        config.host, config.port, config.session.name, config.environment
    );
    if config.uses_default_api_key() {
        warn!("API_KEY is not set - using the placeholder secret, override it in production");
    }

    // Credential directory is created up front so /debug/info reports it
    let auth_dir = config.session.auth_dir();
    match ensure_directory(&auth_dir, "credentials") {
        Ok(true) => info!("No stored credentials in {:?} - a QR scan will be required", auth_dir),
        Ok(false) => {}
        Err(e) => warn!("Failed to create credentials directory {:?}: {}", auth_dir, e),
    }

    info!("Using messaging gateway at: {}", config.gateway.url);
    let connector = GatewayConnector::new(config.gateway.clone())
        .context("Failed to build gateway client")?;

    let mut settings = ManagerSettings::new(config.session.name.clone(), auth_dir)
        .with_retry(RetryPolicy::from(&config.session))
        .with_print_qr(config.qr.print_in_terminal);
    settings.connect_options.connect_timeout = config.gateway.connect_timeout;

    let gateway_inbound = connector.inbound();
    let session_manager = Arc::new(SessionManager::new(
        Arc::new(connector),
        Arc::new(FileCredentialStore::new()),
        settings,
    ));

    let app_state = AppState::new(session_manager.clone(), &config.api_key)
        .with_environment(config.environment.clone())
        .with_qr_width(config.qr.width)
        .with_debug_routes(config.debug_routes)
        .with_prometheus(prometheus_handle)
        .with_gateway_inbound(gateway_inbound);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Pairlink server listening on {}", addr);

    // Bring the session up once the port is bound
    tokio::spawn(async move {
        session_manager.start_session().await;
    });

    axum::serve(listener, app).await?;

    Ok(())
}
