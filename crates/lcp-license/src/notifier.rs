use futures_util::future::BoxFuture;
use tracing::info;

use lcp_notify::NotifyClient;
use lcp_types::license::LicenseHeader;
use lcp_types::rpc::{Ack, Command};

use crate::Result;

/// Announces a freshly issued license to the status server.
pub trait StatusNotifier: Send + Sync {
    fn license_issued<'a>(&'a self, license: &'a LicenseHeader) -> BoxFuture<'a, Result<()>>;
}

/// Notifier speaking `UPDATELICENSESTATUS` to the status server's RPC endpoint.
pub struct RpcStatusNotifier {
    client: NotifyClient,
}

impl RpcStatusNotifier {
    pub fn new(client: NotifyClient) -> Self {
        Self { client }
    }
}

impl StatusNotifier for RpcStatusNotifier {
    fn license_issued<'a>(&'a self, license: &'a LicenseHeader) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let ack: Ack = self.client.call(Command::UpdateLicenseStatus, license).await?;
            info!(license_id = %license.id, affected = ack.affected, "Status server notified");
            Ok(())
        })
    }
}
