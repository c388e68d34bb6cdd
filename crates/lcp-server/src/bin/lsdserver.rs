use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lcp_api::PasswordFile;
use lcp_db::{Database, Schema};
use lcp_notify::NotifyClient;
use lcp_server::config::LsdConfig;
use lcp_server::telemetry;
use lcp_status::StatusService;
use lcp_status::compliance::{Compliance, TracingCompliance};
use lcp_status::notifier::RpcNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = LsdConfig::from_env();
    anyhow::ensure!(
        !config.rpc_user.is_empty() && !config.rpc_password.is_empty(),
        "LSD_RPC_USER and LSD_RPC_PASSWORD must be set"
    );
    let db = Arc::new(Database::open(&config.db_path, Schema::Status)?);

    let passwords = match &config.auth_file {
        Some(path) => PasswordFile::load(path)?,
        None => PasswordFile::default(),
    };
    if passwords.is_empty() {
        warn!("No admin credentials configured, admin routes will refuse every request");
    }

    let lcp = NotifyClient::new(&config.lcp_rpc_addr, &config.lcp_rpc_user, &config.lcp_rpc_password);
    let compliance = Compliance::new(config.status.compliance_mode, Arc::new(TracingCompliance));
    if compliance.enabled() {
        info!("Compliance mode enabled");
    }

    let service = Arc::new(StatusService::new(
        db,
        Arc::new(config.status.clone()),
        Arc::new(RpcNotifier::new(lcp)),
        compliance,
    ));

    // RPC endpoint for the issuing server
    let rpc_addr = SocketAddr::new(config.http_addr.ip(), config.rpc_port);
    let rpc_listener = tokio::net::TcpListener::bind(rpc_addr)
        .await
        .with_context(|| format!("binding RPC endpoint on {}", rpc_addr))?;
    let endpoint = lcp_status::rpc::endpoint(service.clone(), &config.rpc_user, &config.rpc_password);
    let rpc_handle = tokio::spawn(endpoint.run(rpc_listener));

    let app = lcp_api::status::router(service, Arc::new(passwords))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("License status server listening on {}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    rpc_handle.abort();
    info!("License status server stopped");
    Ok(())
}
