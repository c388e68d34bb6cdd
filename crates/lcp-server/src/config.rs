//! Server configuration loaded from environment variables.
//!
//! Every setting has a default suitable for running both servers on one
//! machine. Invalid values are logged and replaced by the default.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lcp_license::Profile;
use lcp_status::StatusConfig;
use tracing::warn;

/// Status server settings (`LSD_*`).
#[derive(Debug, Clone)]
pub struct LsdConfig {
    /// Env: `LSD_HOST`, `LSD_PORT`
    pub http_addr: SocketAddr,
    /// Env: `LSD_RPC_PORT`
    pub rpc_port: u16,
    /// Env: `LSD_DB_PATH`
    pub db_path: PathBuf,
    /// `user:argon2-hash` lines guarding the admin routes.
    /// Env: `LSD_AUTH_FILE`
    pub auth_file: Option<PathBuf>,
    /// Credential accepted by our RPC endpoint.
    /// Env: `LSD_RPC_USER`, `LSD_RPC_PASSWORD`
    pub rpc_user: String,
    pub rpc_password: String,
    /// Env: `LCP_RPC_ADDR`
    pub lcp_rpc_addr: String,
    /// Credential presented to the issuing server.
    /// Env: `LCP_RPC_USER`, `LCP_RPC_PASSWORD`
    pub lcp_rpc_user: String,
    pub lcp_rpc_password: String,
    pub status: StatusConfig,
}

impl Default for LsdConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8990).into(),
            rpc_port: 9000,
            db_path: PathBuf::from("lsd.db"),
            auth_file: None,
            rpc_user: String::new(),
            rpc_password: String::new(),
            lcp_rpc_addr: "127.0.0.1:10000".to_string(),
            lcp_rpc_user: String::new(),
            lcp_rpc_password: String::new(),
            status: StatusConfig::default(),
        }
    }
}

impl LsdConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.http_addr = http_addr(&var, "LSD_HOST", "LSD_PORT", config.http_addr);
        parse_into(&var, "LSD_RPC_PORT", &mut config.rpc_port);
        if let Some(path) = var("LSD_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.auth_file = var("LSD_AUTH_FILE").map(PathBuf::from);

        set_string(&var, "LSD_RPC_USER", &mut config.rpc_user);
        set_string(&var, "LSD_RPC_PASSWORD", &mut config.rpc_password);
        set_string(&var, "LCP_RPC_ADDR", &mut config.lcp_rpc_addr);
        set_string(&var, "LCP_RPC_USER", &mut config.lcp_rpc_user);
        set_string(&var, "LCP_RPC_PASSWORD", &mut config.lcp_rpc_password);

        // -- Status behaviour --

        let status = &mut config.status;
        set_string(&var, "LSD_PUBLIC_BASE_URL", &mut status.public_base_url);
        set_string(&var, "LCP_PUBLIC_BASE_URL", &mut status.lcp_base_url);
        status.license_link_url = var("LSD_LICENSE_LINK_URL").filter(|s| !s.is_empty());
        parse_into(&var, "LSD_REGISTER", &mut status.register);
        parse_into(&var, "LSD_RENEW", &mut status.renew);
        parse_into(&var, "LSD_RETURN", &mut status.allow_return);
        parse_into(&var, "LSD_RENEW_DAYS", &mut status.renew_days);
        parse_into(&var, "LSD_RENTING_DAYS", &mut status.renting_days);
        parse_into(&var, "LSD_COMPLIANCE_MODE", &mut status.compliance_mode);

        config
    }
}

/// Issuing server settings (`LCP_*`).
#[derive(Debug, Clone)]
pub struct LcpConfig {
    /// Env: `LCP_HOST`, `LCP_PORT`
    pub http_addr: SocketAddr,
    /// Env: `LCP_RPC_PORT`
    pub rpc_port: u16,
    /// Env: `LCP_DB_PATH`
    pub db_path: PathBuf,
    /// Env: `LCP_PROFILE` (`basic` or `1.0`)
    pub profile: Profile,
    /// Default provider URI of issued licenses.
    /// Env: `LCP_PROVIDER`
    pub provider: String,
    /// Env: `LCP_CERT_FILE`
    pub cert_file: PathBuf,
    /// Env: `LCP_KEY_FILE`
    pub key_file: PathBuf,
    /// Passphrase hint page, required for issuing.
    /// Env: `LCP_HINT_LINK`
    pub hint_link: String,
    /// Env: `LCP_PUBLICATION_LINK`
    pub publication_link: String,
    /// Env: `LCP_STATUS_LINK`
    pub status_link: String,
    /// Env: `LCP_AUTH_FILE`
    pub auth_file: Option<PathBuf>,
    /// Env: `LCP_RPC_USER`, `LCP_RPC_PASSWORD`
    pub rpc_user: String,
    pub rpc_password: String,
    /// Env: `LSD_RPC_ADDR`
    pub lsd_rpc_addr: String,
    /// Env: `LSD_RPC_USER`, `LSD_RPC_PASSWORD`
    pub lsd_rpc_user: String,
    pub lsd_rpc_password: String,
    /// Reconciliation period, `None` when disabled.
    /// Env: `LCP_SYNC_INTERVAL_SECS` (0 disables)
    pub sync_interval: Option<Duration>,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8989).into(),
            rpc_port: 10000,
            db_path: PathBuf::from("lcp.db"),
            profile: Profile::Basic,
            provider: "http://localhost:8989".to_string(),
            cert_file: PathBuf::from("cert.pem"),
            key_file: PathBuf::from("key.pem"),
            hint_link: String::new(),
            publication_link: "http://localhost:8989/contents/{publication_id}".to_string(),
            status_link: "http://localhost:8990/licenses/{license_id}/status".to_string(),
            auth_file: None,
            rpc_user: String::new(),
            rpc_password: String::new(),
            lsd_rpc_addr: "127.0.0.1:9000".to_string(),
            lsd_rpc_user: String::new(),
            lsd_rpc_password: String::new(),
            sync_interval: Some(Duration::from_secs(300)),
        }
    }
}

impl LcpConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.http_addr = http_addr(&var, "LCP_HOST", "LCP_PORT", config.http_addr);
        parse_into(&var, "LCP_RPC_PORT", &mut config.rpc_port);
        if let Some(path) = var("LCP_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        parse_into(&var, "LCP_PROFILE", &mut config.profile);
        set_string(&var, "LCP_PROVIDER", &mut config.provider);
        if let Some(path) = var("LCP_CERT_FILE") {
            config.cert_file = PathBuf::from(path);
        }
        if let Some(path) = var("LCP_KEY_FILE") {
            config.key_file = PathBuf::from(path);
        }
        set_string(&var, "LCP_HINT_LINK", &mut config.hint_link);
        set_string(&var, "LCP_PUBLICATION_LINK", &mut config.publication_link);
        set_string(&var, "LCP_STATUS_LINK", &mut config.status_link);
        config.auth_file = var("LCP_AUTH_FILE").map(PathBuf::from);

        set_string(&var, "LCP_RPC_USER", &mut config.rpc_user);
        set_string(&var, "LCP_RPC_PASSWORD", &mut config.rpc_password);
        set_string(&var, "LSD_RPC_ADDR", &mut config.lsd_rpc_addr);
        set_string(&var, "LSD_RPC_USER", &mut config.lsd_rpc_user);
        set_string(&var, "LSD_RPC_PASSWORD", &mut config.lsd_rpc_password);

        let mut secs = 300u64;
        parse_into(&var, "LCP_SYNC_INTERVAL_SECS", &mut secs);
        config.sync_interval = (secs > 0).then(|| Duration::from_secs(secs));

        config
    }
}

fn set_string(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut String) {
    if let Some(value) = var(key).filter(|v| !v.is_empty()) {
        *slot = value;
    }
}

fn parse_into<T>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(e) => warn!(key, value = %raw, error = %e, "Invalid setting, using default"),
    }
}

fn http_addr(var: &impl Fn(&str) -> Option<String>, host_key: &str, port_key: &str, default: SocketAddr) -> SocketAddr {
    let host = var(host_key).unwrap_or_else(|| default.ip().to_string());
    let mut port = default.port();
    parse_into(var, port_key, &mut port);

    match format!("{}:{}", host, port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(host = %host, error = %e, "Invalid {}, using default", host_key);
            SocketAddr::new(default.ip(), port)
        }
    }
}
