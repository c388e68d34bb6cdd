use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tracing::info;

use lcp_notify::NotifyClient;
use lcp_types::rpc::{Command, LicenseSummary, RightsUpdate};

use crate::Result;

/// Pushes a new rights end to the issuing server.
pub trait LicenseNotifier: Send + Sync {
    fn update_license<'a>(&'a self, license_id: &'a str, end: DateTime<Utc>) -> BoxFuture<'a, Result<()>>;
}

/// Notifier speaking `UPDATELICENSE` to the issuing server's RPC endpoint.
pub struct RpcNotifier {
    client: NotifyClient,
}

impl RpcNotifier {
    pub fn new(client: NotifyClient) -> Self {
        Self { client }
    }
}

impl LicenseNotifier for RpcNotifier {
    fn update_license<'a>(&'a self, license_id: &'a str, end: DateTime<Utc>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let update = RightsUpdate {
                license_id: license_id.to_string(),
                end,
            };
            let summary: LicenseSummary = self.client.call(Command::UpdateLicense, &update).await?;
            info!(license_id, end = %end, updated = ?summary.updated, "License server notified");
            Ok(())
        })
    }
}
