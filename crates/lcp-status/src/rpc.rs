//! RPC commands served to the issuing server.

use std::sync::Arc;

use lcp_notify::{Endpoint, Handler};
use lcp_types::license::LicenseHeader;
use lcp_types::rpc::{Ack, Command, LicenseIdPayload, LicenseIdsPayload, RenewPayload, SincePayload};
use lcp_types::status::StatusRecord;

use crate::{StatusError, StatusService};

/// Build the endpoint answering every status-side command.
pub fn endpoint(service: Arc<StatusService>, user: &str, password: &str) -> Endpoint {
    Endpoint::new(user, password)
        .register(Command::UpdateLicenseStatus, CreateStatus(service.clone()))
        .register(Command::Licenses, ListSince(service.clone()))
        .register(Command::LicenseStatus, GetRecord(service.clone()))
        .register(Command::LicensesDeleted, Purge(service.clone()))
        .register(Command::Renew, Renew(service.clone()))
        .register(Command::Cancel, Cancel(service.clone()))
        .register(Command::Revoke, Revoke(service))
}

pub struct CreateStatus(Arc<StatusService>);

impl Handler for CreateStatus {
    type Request = LicenseHeader;
    type Response = Ack;
    type Error = StatusError;

    async fn call(&self, license: LicenseHeader) -> Result<Ack, StatusError> {
        self.0.create_from_license(&license).await?;
        Ok(Ack { affected: 1 })
    }
}

pub struct ListSince(Arc<StatusService>);

impl Handler for ListSince {
    type Request = SincePayload;
    type Response = Vec<StatusRecord>;
    type Error = StatusError;

    async fn call(&self, req: SincePayload) -> Result<Vec<StatusRecord>, StatusError> {
        self.0.list_since(req.since).await
    }
}

pub struct GetRecord(Arc<StatusService>);

impl Handler for GetRecord {
    type Request = LicenseIdPayload;
    type Response = StatusRecord;
    type Error = StatusError;

    async fn call(&self, req: LicenseIdPayload) -> Result<StatusRecord, StatusError> {
        let ls = self.0.status(&req.license_id).await?;
        Ok(StatusRecord::from(&ls))
    }
}

pub struct Purge(Arc<StatusService>);

impl Handler for Purge {
    type Request = LicenseIdsPayload;
    type Response = Ack;
    type Error = StatusError;

    async fn call(&self, req: LicenseIdsPayload) -> Result<Ack, StatusError> {
        let affected = self.0.purge(req.license_ids).await?;
        Ok(Ack { affected })
    }
}

pub struct Renew(Arc<StatusService>);

impl Handler for Renew {
    type Request = RenewPayload;
    type Response = StatusRecord;
    type Error = StatusError;

    async fn call(&self, req: RenewPayload) -> Result<StatusRecord, StatusError> {
        let ls = self.0.renew_as_system(&req.license_id, req.end).await?;
        Ok(StatusRecord::from(&ls))
    }
}

pub struct Cancel(Arc<StatusService>);

impl Handler for Cancel {
    type Request = LicenseIdPayload;
    type Response = StatusRecord;
    type Error = StatusError;

    async fn call(&self, req: LicenseIdPayload) -> Result<StatusRecord, StatusError> {
        let ls = self.0.cancel(&req.license_id).await?;
        Ok(StatusRecord::from(&ls))
    }
}

pub struct Revoke(Arc<StatusService>);

impl Handler for Revoke {
    type Request = LicenseIdPayload;
    type Response = StatusRecord;
    type Error = StatusError;

    async fn call(&self, req: LicenseIdPayload) -> Result<StatusRecord, StatusError> {
        let ls = self.0.revoke(&req.license_id).await?;
        Ok(StatusRecord::from(&ls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusConfig;
    use crate::compliance::Compliance;
    use crate::notifier::LicenseNotifier;
    use chrono::{DateTime, Duration, Utc};
    use futures_util::future::BoxFuture;
    use lcp_db::{Database, Schema};
    use lcp_notify::{NotifyClient, NotifyError};
    use lcp_types::license::Rights;
    use lcp_types::status::Status;
    use tokio::net::TcpListener;

    struct Accepting;

    impl LicenseNotifier for Accepting {
        fn update_license<'a>(&'a self, _: &'a str, _: DateTime<Utc>) -> BoxFuture<'a, crate::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    async fn spawn() -> NotifyClient {
        let db = Arc::new(Database::open_in_memory(Schema::Status).unwrap());
        let service = Arc::new(StatusService::new(
            db,
            Arc::new(StatusConfig::default()),
            Arc::new(Accepting),
            Compliance::disabled(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(endpoint(service, "lcp", "s3cret").run(listener));
        NotifyClient::new(addr, "lcp", "s3cret")
    }

    fn header(id: &str) -> LicenseHeader {
        let issued = crate::machine::now();
        LicenseHeader {
            id: id.into(),
            issued,
            updated: None,
            rights: Some(Rights {
                end: Some(issued + Duration::days(10)),
                ..Default::default()
            }),
        }
    }

    fn id(license_id: &str) -> LicenseIdPayload {
        LicenseIdPayload {
            license_id: license_id.into(),
        }
    }

    #[tokio::test]
    async fn issuing_server_flow() {
        let client = spawn().await;

        let ack: Ack = client.call(Command::UpdateLicenseStatus, &header("L1")).await.unwrap();
        assert_eq!(ack.affected, 1);

        let record: StatusRecord = client.call(Command::LicenseStatus, &id("L1")).await.unwrap();
        assert_eq!(record.status, Status::Ready);

        let all: Vec<StatusRecord> = client.call(Command::Licenses, &SincePayload::default()).await.unwrap();
        assert_eq!(all.len(), 1);

        let record: StatusRecord = client.call(Command::Revoke, &id("L1")).await.unwrap();
        assert_eq!(record.status, Status::Revoked);

        let ack: Ack = client
            .call(
                Command::LicensesDeleted,
                &LicenseIdsPayload {
                    license_ids: vec!["L1".into(), "L2".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.affected, 1);
    }

    #[tokio::test]
    async fn illegal_transition_is_reported_remotely() {
        let client = spawn().await;
        let _: Ack = client.call(Command::UpdateLicenseStatus, &header("L1")).await.unwrap();

        let err = client
            .call::<_, StatusRecord>(
                Command::Renew,
                &RenewPayload {
                    license_id: "L1".into(),
                    end: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Remote(m) if m.contains("ready")));

        let err = client
            .call::<_, StatusRecord>(Command::Cancel, &id("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Remote(m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn duplicate_status_is_refused() {
        let client = spawn().await;
        let _: Ack = client.call(Command::UpdateLicenseStatus, &header("L1")).await.unwrap();
        assert!(
            client
                .call::<_, Ack>(Command::UpdateLicenseStatus, &header("L1"))
                .await
                .is_err()
        );
    }
}
