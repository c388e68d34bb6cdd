use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lcp_api::PasswordFile;
use lcp_crypto::sign::Signer;
use lcp_db::{Database, Schema};
use lcp_license::notifier::RpcStatusNotifier;
use lcp_license::sync::run_sync_loop;
use lcp_license::{LicenseBuilder, LicenseService};
use lcp_notify::NotifyClient;
use lcp_server::config::LcpConfig;
use lcp_server::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = LcpConfig::from_env();
    anyhow::ensure!(!config.hint_link.is_empty(), "LCP_HINT_LINK must be set");
    anyhow::ensure!(
        !config.rpc_user.is_empty() && !config.rpc_password.is_empty(),
        "LCP_RPC_USER and LCP_RPC_PASSWORD must be set"
    );

    let cert = std::fs::read_to_string(&config.cert_file)
        .with_context(|| format!("reading certificate {}", config.cert_file.display()))?;
    let key = std::fs::read_to_string(&config.key_file)
        .with_context(|| format!("reading private key {}", config.key_file.display()))?;
    let signer = Arc::new(Signer::from_pem(&cert, &key)?);
    info!(algorithm = signer.algorithm(), profile = %config.profile, "Signing key loaded");

    let db = Arc::new(Database::open(&config.db_path, Schema::License)?);

    let passwords = match &config.auth_file {
        Some(path) => PasswordFile::load(path)?,
        None => PasswordFile::default(),
    };
    if passwords.is_empty() {
        warn!("No admin credentials configured, every route will refuse requests");
    }

    let builder = LicenseBuilder::new(
        config.profile,
        config.hint_link.clone(),
        config.publication_link.clone(),
        config.status_link.clone(),
        signer,
    );
    let lsd = NotifyClient::new(&config.lsd_rpc_addr, &config.lsd_rpc_user, &config.lsd_rpc_password);
    let service = Arc::new(LicenseService::new(
        db,
        builder,
        config.provider.clone(),
        Arc::new(RpcStatusNotifier::new(lsd.clone())),
    ));

    // RPC endpoint for the status server
    let rpc_addr = SocketAddr::new(config.http_addr.ip(), config.rpc_port);
    let rpc_listener = tokio::net::TcpListener::bind(rpc_addr)
        .await
        .with_context(|| format!("binding RPC endpoint on {}", rpc_addr))?;
    let endpoint = lcp_license::rpc::endpoint(service.clone(), &config.rpc_user, &config.rpc_password);
    let rpc_handle = tokio::spawn(endpoint.run(rpc_listener));

    let sync_handle = match config.sync_interval {
        Some(every) => Some(tokio::spawn(run_sync_loop(service.clone(), lsd, every))),
        None => {
            info!("Status reconciliation disabled");
            None
        }
    };

    let app = lcp_api::license::router(service, Arc::new(passwords))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("License server listening on {}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    rpc_handle.abort();
    if let Some(handle) = sync_handle {
        handle.abort();
    }
    info!("License server stopped");
    Ok(())
}
