use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use lcp_db::Database;
use lcp_db::models::LicenseRow;
use lcp_types::license::{
    ContentRecord, ContentRequest, License, LicenseDraft, LicenseHeader, LicenseRequest, Rights, StoredLicense,
    UserInfo,
};
use lcp_types::api::PageParams;
use lcp_types::rpc::LicenseSummary;
use lcp_types::status::StatusRecord;

use crate::builder::LicenseBuilder;
use crate::notifier::StatusNotifier;
use crate::{LicenseError, Result};

/// Value of `lsd_status` once the status server acknowledged a license.
pub const LSD_NOTIFIED: i64 = 201;

/// Page size of the license listings when the caller gives none.
pub const DEFAULT_PER_PAGE: i64 = 30;

/// One page of stored licenses and its `Link` header value.
#[derive(Debug, Clone)]
pub struct LicensePage {
    pub licenses: Vec<StoredLicense>,
    pub link: Option<String>,
}

pub struct LicenseService {
    db: Arc<Database>,
    builder: LicenseBuilder,
    /// Used when a license request names no provider.
    provider: String,
    notifier: Arc<dyn StatusNotifier>,
}

impl LicenseService {
    pub fn new(db: Arc<Database>, builder: LicenseBuilder, provider: String, notifier: Arc<dyn StatusNotifier>) -> Self {
        Self {
            db,
            builder,
            provider,
            notifier,
        }
    }

    // -- Contents --

    /// Store the encryption output of a publication. Returns `true` when new.
    pub async fn put_content(&self, content_id: &str, req: ContentRequest) -> Result<bool> {
        if content_id.is_empty() {
            return Err(LicenseError::Validation("the content id is missing".into()));
        }
        if req.encryption_key.len() != 32 {
            return Err(LicenseError::Validation(format!(
                "the content key must be 32 bytes, got {}",
                req.encryption_key.len()
            )));
        }

        let record = ContentRecord {
            id: content_id.to_string(),
            encryption_key: req.encryption_key,
            location: req.location,
            length: req.length,
            sha256: req.sha256,
        };
        let created = self.db(move |db| db.upsert_content(&record)).await?;

        info!(content_id, created, "Content stored");
        Ok(created)
    }

    // -- Licenses --

    /// Issue a new license for a stored publication and announce it to the
    /// status server.
    pub async fn generate(&self, content_id: &str, req: LicenseRequest) -> Result<License> {
        let content = self.content(content_id).await?;

        let provider = req.provider.filter(|p| !p.is_empty()).unwrap_or_else(|| self.provider.clone());
        if !provider.starts_with("http://") && !provider.starts_with("https://") {
            return Err(LicenseError::Validation(format!("invalid provider {:?}", provider)));
        }
        if req.user.id.is_empty() {
            return Err(LicenseError::Validation("the user id is missing".into()));
        }
        let rights = req.rights.map(Rights::truncated);
        if let Some(rights) = &rights {
            check_rights(rights)?;
        }

        let draft = LicenseDraft {
            id: Uuid::new_v4().to_string(),
            provider,
            issued: now(),
            updated: None,
            user: req.user,
            rights,
            user_key: req.encryption.user_key,
        };
        let license = self.builder.build(&draft, &content)?;

        let row = LicenseRow {
            id: license.id.clone(),
            user_id: license.user.id.clone(),
            provider: license.provider.clone(),
            issued: license.issued,
            updated: license.updated,
            rights: license.rights.clone().unwrap_or_default(),
            content_id: content.id.clone(),
            lsd_status: 0,
        };
        self.db(move |db| db.insert_license(&row)).await?;
        info!(license_id = %license.id, content_id, "License issued");

        // a failed push leaves lsd_status at 0
        let header = LicenseHeader::from(&license);
        match self.notifier.license_issued(&header).await {
            Ok(()) => {
                let id = license.id.clone();
                self.db(move |db| db.set_lsd_status(&id, LSD_NOTIFIED)).await?;
            }
            Err(e) => warn!(license_id = %license.id, "Status server notification failed: {}", e),
        }

        Ok(license)
    }

    /// Rebuild and re-sign a stored license with a fresh user key.
    pub async fn regenerate(&self, license_id: &str, req: LicenseRequest) -> Result<License> {
        let row = self.row(license_id).await?;
        let content = self.content(&row.content_id).await?;

        let draft = LicenseDraft {
            id: row.id,
            provider: row.provider,
            issued: row.issued,
            updated: row.updated,
            user: UserInfo {
                id: row.user_id,
                email: req.user.email,
                name: req.user.name,
                encrypted: req.user.encrypted,
            },
            rights: (row.rights != Rights::default()).then_some(row.rights),
            user_key: req.encryption.user_key,
        };
        self.builder.build(&draft, &content)
    }

    /// Merge the given rights into a stored license.
    pub async fn update_rights(&self, license_id: &str, rights: &Rights) -> Result<Rights> {
        let row = self.row(license_id).await?;
        let mut merged = row.rights;
        merged.merge(&rights.clone().truncated());
        check_rights(&merged)?;

        let id = license_id.to_string();
        let stored = merged.clone();
        let updated = now();
        self.db(move |db| db.update_license_rights(&id, &stored, updated)).await?;

        info!(license_id, end = ?merged.end, "License rights updated");
        Ok(merged)
    }

    pub async fn get_license(&self, license_id: &str) -> Result<StoredLicense> {
        Ok(stored(self.row(license_id).await?))
    }

    /// Stored licenses, newest first, optionally for one publication only.
    pub async fn list_licenses(&self, content_id: Option<&str>, params: &PageParams) -> Result<LicensePage> {
        let page = positive("page", params.page.as_deref(), 1)?;
        let per_page = positive("per_page", params.per_page.as_deref(), DEFAULT_PER_PAGE)?;

        let base = match content_id {
            Some(id) => {
                self.content(id).await?;
                format!("/contents/{}/licenses", id)
            }
            None => "/licenses".to_string(),
        };

        let filter = content_id.map(str::to_string);
        let offset = (page - 1).saturating_mul(per_page);
        let rows = self
            .db(move |db| db.list_licenses(filter.as_deref(), per_page, offset))
            .await?;

        let mut links = Vec::new();
        if !rows.is_empty() {
            links.push(page_link(&base, page + 1, per_page, "next"));
        }
        if page > 1 {
            links.push(page_link(&base, page - 1, per_page, "previous"));
        }

        Ok(LicensePage {
            licenses: rows.into_iter().map(stored).collect(),
            link: (!links.is_empty()).then(|| links.join(", ")),
        })
    }

    /// Move the end of a stored license, on behalf of the status server.
    pub async fn update_end(&self, license_id: &str, end: DateTime<Utc>) -> Result<LicenseSummary> {
        let end = end.trunc_subsecs(0);
        let id = license_id.to_string();
        let updated = now();
        if !self.db(move |db| db.set_license_end(&id, end, updated)).await? {
            return Err(LicenseError::NotFound(format!("license {}", license_id)));
        }

        info!(license_id, end = %end, "License end updated");
        Ok(LicenseSummary {
            id: license_id.to_string(),
            end: Some(end),
            updated: Some(updated),
        })
    }

    /// Align stored ends with status records pulled from the status server.
    /// Returns how many licenses changed.
    pub async fn reconcile(&self, records: &[StatusRecord]) -> Result<usize> {
        let mut changed = 0;
        for record in records {
            let Some(end) = record.current_end.map(|e| e.trunc_subsecs(0)) else {
                continue;
            };
            let id = record.license_id.clone();
            let Some(row) = self.db(move |db| db.get_license(&id)).await? else {
                continue;
            };
            if row.rights.end == Some(end) {
                continue;
            }
            self.update_end(&record.license_id, end).await?;
            changed += 1;
        }
        Ok(changed)
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
                LicenseError::Internal("database task failed".into())
            })?
            .map_err(Into::into)
    }

    async fn content(&self, content_id: &str) -> Result<ContentRecord> {
        let id = content_id.to_string();
        self.db(move |db| db.get_content(&id))
            .await?
            .ok_or_else(|| LicenseError::NotFound(format!("content {}", content_id)))
    }

    async fn row(&self, license_id: &str) -> Result<LicenseRow> {
        let id = license_id.to_string();
        self.db(move |db| db.get_license(&id))
            .await?
            .ok_or_else(|| LicenseError::NotFound(format!("license {}", license_id)))
    }
}

fn stored(row: LicenseRow) -> StoredLicense {
    StoredLicense {
        id: row.id,
        provider: row.provider,
        user_id: row.user_id,
        issued: row.issued,
        updated: row.updated,
        rights: row.rights,
        content_id: row.content_id,
        lsd_status: row.lsd_status,
    }
}

fn positive(name: &str, raw: Option<&str>, default: i64) -> Result<i64> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(LicenseError::Validation(format!("{} must be a positive integer", name))),
    }
}

fn page_link(base: &str, page: i64, per_page: i64, rel: &str) -> String {
    format!(
        "<{}?page={}&per_page={}>; rel=\"{}\"; title=\"{}\"",
        base, page, per_page, rel, rel
    )
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn check_rights(rights: &Rights) -> Result<()> {
    if let (Some(start), Some(end)) = (rights.start, rights.end) {
        if end <= start {
            return Err(LicenseError::Validation("the rights end must be after their start".into()));
        }
    }
    if rights.print.is_some_and(|n| n < 0) || rights.copy.is_some_and(|n| n < 0) {
        return Err(LicenseError::Validation("print and copy rights cannot be negative".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::tests::{PASSPHRASE_HASH, builder, content};
    use chrono::Duration;
    use futures_util::future::BoxFuture;
    use lcp_db::Schema;
    use lcp_types::license::{EncryptionRequest, UserKeyRequest};
    use lcp_types::status::Status;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockNotifier {
        issued: Mutex<Vec<LicenseHeader>>,
        fail: AtomicBool,
    }

    impl StatusNotifier for MockNotifier {
        fn license_issued<'a>(&'a self, license: &'a LicenseHeader) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(LicenseError::Internal("status server down".into()));
                }
                self.issued.lock().unwrap().push(license.clone());
                Ok(())
            })
        }
    }

    async fn fixture() -> (LicenseService, Arc<MockNotifier>) {
        let db = Arc::new(Database::open_in_memory(Schema::License).unwrap());
        let notifier = Arc::new(MockNotifier::default());
        let service = LicenseService::new(db, builder(), "https://provider.example.com".into(), notifier.clone());

        let c = content();
        let created = service
            .put_content(
                &c.id,
                ContentRequest {
                    encryption_key: c.encryption_key,
                    location: c.location,
                    length: c.length,
                    sha256: c.sha256,
                },
            )
            .await
            .unwrap();
        assert!(created);
        (service, notifier)
    }

    fn request(end: Option<DateTime<Utc>>) -> LicenseRequest {
        LicenseRequest {
            provider: None,
            user: UserInfo {
                id: "u1".into(),
                ..Default::default()
            },
            encryption: EncryptionRequest {
                user_key: UserKeyRequest {
                    text_hint: "the usual".into(),
                    value: PASSPHRASE_HASH.into(),
                    algorithm: None,
                },
            },
            rights: Some(Rights {
                end,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn generate_stores_and_announces() {
        let (service, notifier) = fixture().await;
        let end = now() + Duration::days(14);

        let license = service.generate("book-1", request(Some(end))).await.unwrap();
        assert_eq!(license.provider, "https://provider.example.com");
        assert!(license.signature.is_some());

        let stored = service.get_license(&license.id).await.unwrap();
        assert_eq!(stored.rights.end, Some(end));
        assert_eq!(stored.lsd_status, LSD_NOTIFIED);

        let issued = notifier.issued.lock().unwrap();
        assert_eq!(issued[0].id, license.id);
    }

    #[tokio::test]
    async fn fractional_rights_are_stored_and_pushed_in_whole_seconds() {
        let (service, notifier) = fixture().await;
        let end: DateTime<Utc> = "2031-03-01T10:00:00.500Z".parse().unwrap();
        let whole: DateTime<Utc> = "2031-03-01T10:00:00Z".parse().unwrap();

        let license = service.generate("book-1", request(Some(end))).await.unwrap();
        assert_eq!(license.rights.as_ref().and_then(|r| r.end), Some(whole));
        assert_eq!(service.get_license(&license.id).await.unwrap().rights.end, Some(whole));
        let pushed = notifier.issued.lock().unwrap()[0].rights.clone().unwrap_or_default();
        assert_eq!(pushed.end, Some(whole));

        let later: DateTime<Utc> = "2031-04-01T10:00:00.750Z".parse().unwrap();
        let rights = service
            .update_rights(&license.id, &Rights { end: Some(later), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(rights.end, Some(later.trunc_subsecs(0)));

        let summary = service.update_end(&license.id, end).await.unwrap();
        assert_eq!(summary.end, Some(whole));
    }

    #[tokio::test]
    async fn failed_announcement_keeps_the_license() {
        let (service, notifier) = fixture().await;
        notifier.fail.store(true, Ordering::SeqCst);

        let license = service.generate("book-1", request(None)).await.unwrap();
        let stored = service.get_license(&license.id).await.unwrap();
        assert_eq!(stored.lsd_status, 0);
    }

    #[tokio::test]
    async fn generate_validates_its_inputs() {
        let (service, _) = fixture().await;

        assert!(matches!(
            service.generate("missing", request(None)).await,
            Err(LicenseError::NotFound(_))
        ));

        let mut req = request(None);
        req.user.id.clear();
        assert!(matches!(service.generate("book-1", req).await, Err(LicenseError::Validation(_))));

        let mut req = request(None);
        req.provider = Some("not a url".into());
        assert!(matches!(service.generate("book-1", req).await, Err(LicenseError::Validation(_))));

        let mut req = request(Some(now()));
        if let Some(r) = req.rights.as_mut() {
            r.start = Some(now() + Duration::days(1));
        }
        assert!(matches!(service.generate("book-1", req).await, Err(LicenseError::Validation(_))));
    }

    #[tokio::test]
    async fn listings_page_through_licenses() {
        let (service, _) = fixture().await;
        for _ in 0..3 {
            service.generate("book-1", request(None)).await.unwrap();
        }

        let first = service
            .list_licenses(None, &PageParams { page: None, per_page: Some("2".into()) })
            .await
            .unwrap();
        assert_eq!(first.licenses.len(), 2);
        assert_eq!(
            first.link.as_deref(),
            Some("</licenses?page=2&per_page=2>; rel=\"next\"; title=\"next\"")
        );

        let second = service
            .list_licenses(
                Some("book-1"),
                &PageParams {
                    page: Some("2".into()),
                    per_page: Some("2".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.licenses.len(), 1);
        assert_eq!(second.licenses[0].content_id, "book-1");
        let link = second.link.unwrap();
        assert!(link.contains("</contents/book-1/licenses?page=3&per_page=2>; rel=\"next\""));
        assert!(link.contains("</contents/book-1/licenses?page=1&per_page=2>; rel=\"previous\""));

        assert!(matches!(
            service.list_licenses(Some("missing"), &PageParams::default()).await,
            Err(LicenseError::NotFound(_))
        ));
        assert!(matches!(
            service
                .list_licenses(None, &PageParams { page: Some("0".into()), per_page: None })
                .await,
            Err(LicenseError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn content_key_length_is_checked() {
        let (service, _) = fixture().await;
        let err = service
            .put_content(
                "short",
                ContentRequest {
                    encryption_key: vec![1; 16],
                    location: "x".into(),
                    length: 1,
                    sha256: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LicenseError::Validation(_)));
    }

    #[tokio::test]
    async fn rights_merge_and_regenerate() {
        let (service, _) = fixture().await;
        let license = service.generate("book-1", request(Some(now() + Duration::days(7)))).await.unwrap();

        let later = now() + Duration::days(21);
        let rights = service
            .update_rights(
                &license.id,
                &Rights {
                    print: Some(5),
                    end: Some(later),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rights.print, Some(5));
        assert_eq!(rights.end, Some(later));

        let fresh = service.regenerate(&license.id, request(None)).await.unwrap();
        assert_eq!(fresh.id, license.id);
        assert_eq!(fresh.rights.unwrap().end, Some(later));
        assert!(service.get_license(&license.id).await.unwrap().updated.is_some());
    }

    #[tokio::test]
    async fn reconcile_applies_changed_ends_only() {
        let (service, _) = fixture().await;
        let end = now() + Duration::days(7);
        let license = service.generate("book-1", request(Some(end))).await.unwrap();

        let record = |current_end| StatusRecord {
            license_id: license.id.clone(),
            status: Status::Active,
            license_updated: now(),
            status_updated: now(),
            potential_rights_end: None,
            current_end,
        };
        let unknown = StatusRecord {
            license_id: "elsewhere".into(),
            ..record(Some(end))
        };

        assert_eq!(service.reconcile(&[record(Some(end)), unknown]).await.unwrap(), 0);

        let renewed = end + Duration::days(3);
        assert_eq!(service.reconcile(&[record(Some(renewed)), record(None)]).await.unwrap(), 1);
        assert_eq!(service.get_license(&license.id).await.unwrap().rights.end, Some(renewed));
    }

    #[tokio::test]
    async fn update_end_on_unknown_license() {
        let (service, _) = fixture().await;
        assert!(matches!(
            service.update_end("nope", now()).await,
            Err(LicenseError::NotFound(_))
        ));
    }
}
