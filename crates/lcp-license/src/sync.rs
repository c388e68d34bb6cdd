use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use lcp_notify::NotifyClient;
use lcp_types::rpc::{Command, SincePayload};
use lcp_types::status::StatusRecord;

use crate::LicenseService;

/// Result of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPass {
    pub updated: usize,
    /// Latest change time among the pulled records, on the status server's clock.
    pub watermark: Option<DateTime<Utc>>,
}

/// Background task pulling status changes from the status server.
///
/// Each tick asks for the records changed since the latest change seen so
/// far and copies their current end onto the stored licenses. The first pull
/// covers every record. The watermark only ever comes from the status
/// server's own timestamps, and the boundary second is pulled again.
pub async fn run_sync_loop(service: Arc<LicenseService>, client: NotifyClient, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut since: Option<DateTime<Utc>> = None;

    loop {
        interval.tick().await;

        match sync_once(&service, &client, since).await {
            Ok(pass) => {
                since = pass.watermark.max(since);
                if pass.updated > 0 {
                    info!("Sync: updated {} licenses", pass.updated);
                } else {
                    debug!("Sync: nothing to update");
                }
            }
            Err(e) => {
                warn!("Sync error: {}", e);
            }
        }
    }
}

pub async fn sync_once(
    service: &LicenseService,
    client: &NotifyClient,
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<SyncPass> {
    let records: Vec<StatusRecord> = client.call(Command::Licenses, &SincePayload { since }).await?;
    let updated = service.reconcile(&records).await?;
    let watermark = records
        .iter()
        .map(|r| r.status_updated.max(r.license_updated))
        .max();
    Ok(SyncPass { updated, watermark })
}
