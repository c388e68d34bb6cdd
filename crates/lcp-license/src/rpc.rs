//! RPC command served to the status server.

use std::sync::Arc;

use lcp_notify::{Endpoint, Handler};
use lcp_types::rpc::{Command, LicenseSummary, RightsUpdate};

use crate::{LicenseError, LicenseService};

pub fn endpoint(service: Arc<LicenseService>, user: &str, password: &str) -> Endpoint {
    Endpoint::new(user, password).register(Command::UpdateLicense, UpdateLicense(service))
}

/// Applies a new rights end decided by the status server.
pub struct UpdateLicense(Arc<LicenseService>);

impl Handler for UpdateLicense {
    type Request = RightsUpdate;
    type Response = LicenseSummary;
    type Error = LicenseError;

    async fn call(&self, req: RightsUpdate) -> Result<LicenseSummary, LicenseError> {
        self.0.update_end(&req.license_id, req.end).await
    }
}
