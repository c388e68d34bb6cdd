use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, error, info, warn};

use lcp_db::Database;
use lcp_db::models::{NewEvent, Transition};
use lcp_types::api::{DeviceParams, FilterParams, RenewParams, StatusChange};
use lcp_types::license::LicenseHeader;
use lcp_types::status::{
    EventType, LicenseStatus, PotentialRights, RegisteredDevice, Status, StatusDocument, StatusRecord, Updated,
};

use crate::compliance::{Compliance, Stage};
use crate::links::make_links;
use crate::locks::LicenseLocks;
use crate::machine::{self, Device, Registration};
use crate::notifier::LicenseNotifier;
use crate::{Result, StatusConfig, StatusError};

const DEFAULT_PER_PAGE: i64 = 10;

/// One page of the device-count filter plus its `Link` header value.
#[derive(Debug, Clone)]
pub struct FilterPage {
    pub records: Vec<StatusRecord>,
    pub link: Option<String>,
}

/// Orchestrates lifecycle requests: validate, notify the issuing server,
/// then commit the event and the new row together.
pub struct StatusService {
    db: Arc<Database>,
    config: Arc<StatusConfig>,
    notifier: Arc<dyn LicenseNotifier>,
    compliance: Compliance,
    locks: LicenseLocks,
}

impl StatusService {
    pub fn new(
        db: Arc<Database>,
        config: Arc<StatusConfig>,
        notifier: Arc<dyn LicenseNotifier>,
        compliance: Compliance,
    ) -> Self {
        Self {
            db,
            config,
            notifier,
            compliance,
            locks: LicenseLocks::new(),
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn compliance(&self) -> &Compliance {
        &self.compliance
    }

    // -- Reads --

    /// Current status row, with lapsed loans switched to expired first.
    pub async fn status(&self, license_ref: &str) -> Result<LicenseStatus> {
        let result = self.load_current(license_ref).await;
        self.record(Stage::Status, &result);
        result
    }

    pub async fn get_status(&self, license_ref: &str) -> Result<StatusDocument> {
        let ls = self.status(license_ref).await?;
        self.document(ls).await
    }

    /// Status document of a row: message, links and event history.
    pub async fn document(&self, ls: LicenseStatus) -> Result<StatusDocument> {
        let status_id = ls.id;
        let events = self.db(move |db| db.list_events(status_id)).await?;

        Ok(StatusDocument {
            links: make_links(&self.config, &ls),
            message: ls.status.message().to_string(),
            updated: Updated {
                license: ls.license_updated,
                status: ls.status_updated,
            },
            potential_rights: ls.potential_rights_end.map(|end| PotentialRights { end: Some(end) }),
            events: events.iter().map(Into::into).collect(),
            id: ls.license_ref,
            status: ls.status,
        })
    }

    pub async fn registered_devices(&self, license_ref: &str) -> Result<Vec<RegisteredDevice>> {
        let ls = self.load(license_ref).await?;
        let status_id = ls.id;
        self.db(move |db| db.list_registered_devices(status_id)).await
    }

    pub async fn filter(&self, params: &FilterParams) -> Result<FilterPage> {
        let devices = positive("devices", params.devices.as_deref(), 1)?;
        let page = positive("page", params.page.as_deref(), 1)?;
        let per_page = positive("per_page", params.per_page.as_deref(), DEFAULT_PER_PAGE)?;

        let offset = (page - 1).saturating_mul(per_page);
        let rows = self
            .db(move |db| db.list_statuses_by_device_count(devices, per_page, offset))
            .await?;

        let mut links = Vec::new();
        if !rows.is_empty() {
            links.push(page_link(devices, page + 1, per_page, "next"));
        }
        if page > 1 {
            links.push(page_link(devices, page - 1, per_page, "previous"));
        }

        Ok(FilterPage {
            records: rows.iter().map(StatusRecord::from).collect(),
            link: (!links.is_empty()).then(|| links.join(", ")),
        })
    }

    pub async fn list_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<StatusRecord>> {
        let rows = self.db(move |db| db.list_statuses_since(since)).await?;
        Ok(rows.iter().map(StatusRecord::from).collect())
    }

    // -- Creation and purge --

    /// Create the status row of a license just issued.
    pub async fn create_from_license(&self, license: &LicenseHeader) -> Result<()> {
        if license.id.is_empty() {
            return Err(StatusError::Validation("the license id is missing".into()));
        }

        let _guard = self.locks.acquire(&license.id).await;
        if self.find(&license.id).await?.is_some() {
            return Err(StatusError::Validation(format!(
                "a status for license {} already exists",
                license.id
            )));
        }

        let new = machine::make_license_status(license, self.config.register, self.config.renting_days, machine::now());
        self.db(move |db| db.insert_status(&new)).await?;

        info!(license_id = %license.id, "License status created");
        Ok(())
    }

    pub async fn purge(&self, license_refs: Vec<String>) -> Result<usize> {
        let count = license_refs.len();
        let removed = self.db(move |db| db.delete_statuses(&license_refs)).await?;
        info!(requested = count, removed, "License statuses purged");
        Ok(removed)
    }

    // -- Lifecycle --

    pub async fn register(&self, license_ref: &str, params: &DeviceParams) -> Result<LicenseStatus> {
        let result = self.register_inner(license_ref, params).await;
        self.record(Stage::Register, &result);
        result
    }

    async fn register_inner(&self, license_ref: &str, params: &DeviceParams) -> Result<LicenseStatus> {
        let _guard = self.locks.acquire(license_ref).await;
        let ls = self.load_current(license_ref).await?;
        let device = machine::required_device(params.id.as_deref(), params.name.as_deref())?;

        let last = self.last_event(ls.id, &device.id).await?;
        match machine::register(&ls, last)? {
            Registration::AlreadyActive => {
                debug!(license_id = %license_ref, device_id = %device.id, "Device already registered");
                Ok(ls)
            }
            Registration::Activate { device_count } => {
                let now = machine::now();
                self.commit(
                    &ls,
                    Transition {
                        status_id: ls.id,
                        expected_version: ls.version,
                        status: Status::Active,
                        license_updated: ls.license_updated,
                        status_updated: now,
                        current_end: ls.current_end,
                        device_count: Some(device_count),
                        event: Some(event(&device, now, EventType::Register)),
                    },
                )
                .await?;

                info!(license_id = %license_ref, device_id = %device.id, device_count, "Device registered");
                self.load(license_ref).await
            }
        }
    }

    pub async fn return_license(&self, license_ref: &str, params: &DeviceParams) -> Result<LicenseStatus> {
        let result = self.return_inner(license_ref, params).await;
        self.record(Stage::Return, &result);
        result
    }

    async fn return_inner(&self, license_ref: &str, params: &DeviceParams) -> Result<LicenseStatus> {
        let _guard = self.locks.acquire(license_ref).await;
        let ls = self.load_current(license_ref).await?;
        let device = machine::optional_device(params.id.as_deref(), params.name.as_deref())?;

        if !self.config.allow_return {
            return Err(StatusError::Forbidden("return is not available on this server".into()));
        }
        let next = machine::returned_status(ls.status)?;

        let now = machine::now();
        self.notify(license_ref, now).await?;
        self.commit(
            &ls,
            Transition {
                status_id: ls.id,
                expected_version: ls.version,
                status: next,
                license_updated: now,
                status_updated: now,
                current_end: Some(now),
                device_count: ls.device_count,
                event: Some(event(&device, now, EventType::Return)),
            },
        )
        .await?;

        info!(license_id = %license_ref, status = %next, "License returned");
        self.load(license_ref).await
    }

    /// Renew on behalf of a reading app; `end` comes from the query string.
    pub async fn renew(&self, license_ref: &str, params: &RenewParams) -> Result<LicenseStatus> {
        let result = self.renew_from_device(license_ref, params).await;
        self.record(Stage::Renew, &result);
        result
    }

    /// Renew on behalf of the issuing server.
    pub async fn renew_as_system(&self, license_ref: &str, end: Option<DateTime<Utc>>) -> Result<LicenseStatus> {
        let result = self.renew_from_system(license_ref, end).await;
        self.record(Stage::Renew, &result);
        result
    }

    async fn renew_from_system(&self, license_ref: &str, end: Option<DateTime<Utc>>) -> Result<LicenseStatus> {
        let _guard = self.locks.acquire(license_ref).await;
        let ls = self.load_current(license_ref).await?;
        let end = end.map(|e| e.trunc_subsecs(0));
        self.apply_renew(ls, Device::system(), end).await
    }

    async fn renew_from_device(&self, license_ref: &str, params: &RenewParams) -> Result<LicenseStatus> {
        let _guard = self.locks.acquire(license_ref).await;
        let ls = self.load_current(license_ref).await?;
        let device = machine::optional_device(params.id.as_deref(), params.name.as_deref())?;

        if !self.config.renew {
            return Err(StatusError::Forbidden("renew is not available on this server".into()));
        }
        let requested = params
            .end
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(machine::parse_end)
            .transpose()?;

        self.apply_renew(ls, device, requested).await
    }

    async fn apply_renew(
        &self,
        ls: LicenseStatus,
        device: Device,
        requested: Option<DateTime<Utc>>,
    ) -> Result<LicenseStatus> {
        let now = machine::now();
        let end = machine::renewal_end(&ls, requested, self.config.renew_days, now)?;

        self.notify(&ls.license_ref, end).await?;
        self.commit(
            &ls,
            Transition {
                status_id: ls.id,
                expected_version: ls.version,
                status: Status::Active,
                license_updated: now,
                status_updated: now,
                current_end: Some(end),
                device_count: ls.device_count,
                event: Some(event(&device, now, EventType::Renew)),
            },
        )
        .await?;

        info!(license_id = %ls.license_ref, end = %end, "License renewed");
        self.load(&ls.license_ref).await
    }

    pub async fn cancel(&self, license_ref: &str) -> Result<LicenseStatus> {
        let result = self.terminate(license_ref, EventType::Cancel, machine::cancelled_status).await;
        self.record(Stage::CancelRevoke, &result);
        result
    }

    pub async fn revoke(&self, license_ref: &str) -> Result<LicenseStatus> {
        let result = self.terminate(license_ref, EventType::Revoke, machine::revoked_status).await;
        self.record(Stage::CancelRevoke, &result);
        result
    }

    /// Administrative status change: only cancellation and revocation.
    pub async fn change_status(&self, license_ref: &str, change: &StatusChange) -> Result<LicenseStatus> {
        if let Some(message) = &change.message {
            debug!(license_id = %license_ref, status = %change.status, reason = %message, "Status change requested");
        }
        match change.status {
            Status::Revoked => self.revoke(license_ref).await,
            Status::Cancelled => self.cancel(license_ref).await,
            other => Err(StatusError::Validation(format!(
                "the status can only be changed to revoked or cancelled, not {}",
                other
            ))),
        }
    }

    async fn terminate(
        &self,
        license_ref: &str,
        kind: EventType,
        rule: fn(Status) -> Result<Status>,
    ) -> Result<LicenseStatus> {
        let _guard = self.locks.acquire(license_ref).await;
        let ls = self.load_current(license_ref).await?;
        let next = rule(ls.status)?;

        let now = machine::now();
        self.notify(license_ref, now).await?;
        self.commit(
            &ls,
            Transition {
                status_id: ls.id,
                expected_version: ls.version,
                status: next,
                license_updated: now,
                status_updated: now,
                current_end: Some(now),
                device_count: ls.device_count,
                event: Some(event(&Device::system(), now, kind)),
            },
        )
        .await?;

        info!(license_id = %license_ref, status = %next, "License terminated");
        self.load(license_ref).await
    }

    // -- Helpers --

    async fn db<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("DB task failed: {}", e);
                StatusError::Internal("database task failed".into())
            })?
            .map_err(Into::into)
    }

    async fn find(&self, license_ref: &str) -> Result<Option<LicenseStatus>> {
        let license_ref = license_ref.to_string();
        self.db(move |db| db.get_status_by_ref(&license_ref)).await
    }

    async fn load(&self, license_ref: &str) -> Result<LicenseStatus> {
        self.find(license_ref)
            .await?
            .ok_or_else(|| StatusError::NotFound(license_ref.to_string()))
    }

    async fn load_current(&self, license_ref: &str) -> Result<LicenseStatus> {
        let ls = self.load(license_ref).await?;
        let now = machine::now();
        let Some(status) = machine::lapsed(&ls, now) else {
            return Ok(ls);
        };

        let t = Transition {
            status_id: ls.id,
            expected_version: ls.version,
            status,
            license_updated: ls.license_updated,
            status_updated: now,
            current_end: ls.current_end,
            device_count: ls.device_count,
            event: None,
        };
        if self.db(move |db| db.commit_transition(&t)).await? {
            info!(license_id = %license_ref, "License expired");
        }
        // either way the row now reflects the latest writer
        self.load(license_ref).await
    }

    async fn last_event(&self, status_id: i64, device_id: &str) -> Result<Option<EventType>> {
        let device_id = device_id.to_string();
        self.db(move |db| db.last_device_event(status_id, &device_id)).await
    }

    async fn notify(&self, license_ref: &str, end: DateTime<Utc>) -> Result<()> {
        self.notifier.update_license(license_ref, end).await.map_err(|e| {
            warn!(license_id = %license_ref, "License server notification failed: {}", e);
            e
        })
    }

    async fn commit(&self, ls: &LicenseStatus, t: Transition) -> Result<()> {
        if self.db(move |db| db.commit_transition(&t)).await? {
            Ok(())
        } else {
            warn!(license_id = %ls.license_ref, version = ls.version, "Stale license status version");
            Err(StatusError::Conflict(ls.license_ref.clone()))
        }
    }

    fn record<T>(&self, stage: Stage, result: &Result<T>) {
        match result {
            Ok(_) => self.compliance.record(stage, 200, "ok"),
            Err(e) => self.compliance.record(stage, e.http_status(), e.to_string()),
        }
    }
}

fn event(device: &Device, at: DateTime<Utc>, kind: EventType) -> NewEvent {
    NewEvent {
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        timestamp: at,
        kind,
    }
}

fn positive(name: &str, raw: Option<&str>, default: i64) -> Result<i64> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(StatusError::Validation(format!("{} must be a positive integer", name))),
    }
}

fn page_link(devices: i64, page: i64, per_page: i64, rel: &str) -> String {
    format!(
        "</licenses?devices={}&page={}&per_page={}>; rel=\"{}\"; title=\"{}\"",
        devices, page, per_page, rel, rel
    )
}
