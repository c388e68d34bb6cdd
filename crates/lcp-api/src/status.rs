//! Status server routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use tracing::info;

use lcp_status::{StatusError, StatusService};
use lcp_types::CONTENT_TYPE_LSD_JSON;
use lcp_types::api::{ComplianceParams, DeviceParams, FilterParams, ProblemKind, RenewParams, StatusChange};
use lcp_types::license::LicenseHeader;
use lcp_types::status::{RegisteredDevice, StatusDocument, StatusRecord};

use crate::auth::{PasswordFile, require_basic};
use crate::problem::ApiError;

pub type StatusState = Arc<StatusService>;

pub fn router(service: Arc<StatusService>, passwords: Arc<PasswordFile>) -> Router {
    let public = Router::new()
        .route("/licenses/{key}/status", get(get_status))
        .route("/licenses/{key}/register", post(register))
        .route("/licenses/{key}/return", put(return_license))
        .route("/licenses/{key}/renew", put(renew));

    let public = if service.compliance().enabled() {
        public.route("/compliancetest", post(compliance_test))
    } else {
        public
    };

    let protected = Router::new()
        .route("/licenses", get(filter).put(create))
        .route("/licenses/{key}/status", patch(change_status))
        .route("/licenses/{key}/registered", get(registered_devices))
        .layer(middleware::from_fn_with_state(passwords, require_basic));

    public.merge(protected).with_state(service)
}

fn lsd(doc: StatusDocument) -> Response {
    let mut response = Json(doc).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_LSD_JSON));
    response
}

async fn get_status(State(service): State<StatusState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let doc = service
        .get_status(&key)
        .await
        .map_err(ApiError::status(ProblemKind::Server))?;
    Ok(lsd(doc))
}

async fn register(
    State(service): State<StatusState>,
    Path(key): Path<String>,
    Query(params): Query<DeviceParams>,
) -> Result<Response, ApiError> {
    let kind = ProblemKind::Registration;
    let ls = service.register(&key, &params).await.map_err(ApiError::status(kind))?;
    let doc = service.document(ls).await.map_err(ApiError::status(kind))?;
    Ok(lsd(doc))
}

async fn return_license(
    State(service): State<StatusState>,
    Path(key): Path<String>,
    Query(params): Query<DeviceParams>,
) -> Result<Response, ApiError> {
    let kind = ProblemKind::Return;
    let ls = service.return_license(&key, &params).await.map_err(ApiError::status(kind))?;
    let doc = service.document(ls).await.map_err(ApiError::status(kind))?;
    Ok(lsd(doc))
}

async fn renew(
    State(service): State<StatusState>,
    Path(key): Path<String>,
    Query(params): Query<RenewParams>,
) -> Result<Response, ApiError> {
    let ls = service.renew(&key, &params).await.map_err(|e| {
        // a malformed end date has its own problem type
        let kind = match &e {
            StatusError::InvalidDate(_) => ProblemKind::RenewDate,
            _ => ProblemKind::Renew,
        };
        ApiError::status(kind)(e)
    })?;
    let doc = service.document(ls).await.map_err(ApiError::status(ProblemKind::Renew))?;
    Ok(lsd(doc))
}

async fn change_status(
    State(service): State<StatusState>,
    Path(key): Path<String>,
    Json(change): Json<StatusChange>,
) -> Result<Response, ApiError> {
    let kind = ProblemKind::Cancel;
    let ls = service.change_status(&key, &change).await.map_err(ApiError::status(kind))?;
    let doc = service.document(ls).await.map_err(ApiError::status(kind))?;
    Ok(lsd(doc))
}

async fn create(State(service): State<StatusState>, Json(license): Json<LicenseHeader>) -> Result<StatusCode, ApiError> {
    service
        .create_from_license(&license)
        .await
        .map_err(ApiError::status(ProblemKind::Server))?;
    Ok(StatusCode::CREATED)
}

async fn filter(
    State(service): State<StatusState>,
    Query(params): Query<FilterParams>,
) -> Result<Response, ApiError> {
    let page = service.filter(&params).await.map_err(ApiError::status(ProblemKind::Filter))?;

    let mut response = Json::<Vec<StatusRecord>>(page.records).into_response();
    if let Some(link) = page.link {
        let value = HeaderValue::from_str(&link)
            .map_err(|e| ApiError::new(ProblemKind::Filter, 500, e.to_string()))?;
        response.headers_mut().insert(header::LINK, value);
    }
    Ok(response)
}

async fn registered_devices(
    State(service): State<StatusState>,
    Path(key): Path<String>,
) -> Result<Json<Vec<RegisteredDevice>>, ApiError> {
    let devices = service
        .registered_devices(&key)
        .await
        .map_err(ApiError::status(ProblemKind::Server))?;
    Ok(Json(devices))
}

async fn compliance_test(
    State(service): State<StatusState>,
    Query(params): Query<ComplianceParams>,
) -> Result<StatusCode, ApiError> {
    service
        .compliance()
        .bracket(&params)
        .map_err(ApiError::status(ProblemKind::Server))?;
    info!(stage = ?params.test_stage, test = ?params.test_number, "Compliance bracket");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::password_file;
    use axum::body::Body;
    use axum::http::Request;
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use chrono::{DateTime, Duration, SubsecRound, Utc};
    use futures_util::future::BoxFuture;
    use http_body_util::BodyExt;
    use lcp_db::{Database, Schema};
    use lcp_status::compliance::{Compliance, NullCompliance};
    use lcp_status::notifier::LicenseNotifier;
    use lcp_status::StatusConfig;
    use lcp_types::api::Problem;
    use lcp_types::license::Rights;
    use lcp_types::status::Status;
    use tower::ServiceExt;

    struct Accepting;

    impl LicenseNotifier for Accepting {
        fn update_license<'a>(&'a self, _: &'a str, _: DateTime<Utc>) -> BoxFuture<'a, Result<(), StatusError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn app(compliance: bool) -> Router {
        let db = Arc::new(Database::open_in_memory(Schema::Status).unwrap());
        let config = StatusConfig {
            compliance_mode: compliance,
            ..Default::default()
        };
        let service = Arc::new(StatusService::new(
            db,
            Arc::new(config),
            Arc::new(Accepting),
            Compliance::new(compliance, Arc::new(NullCompliance)),
        ));
        router(service, Arc::new(password_file("admin", "letmein")))
    }

    fn basic() -> String {
        format!("Basic {}", BASE64.encode("admin:letmein"))
    }

    fn license_json(id: &str) -> String {
        let issued = Utc::now().trunc_subsecs(0);
        serde_json::to_string(&LicenseHeader {
            id: id.into(),
            issued,
            updated: None,
            rights: Some(Rights {
                end: Some(issued + Duration::days(10)),
                ..Default::default()
            }),
        })
        .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn create_license(app: &Router, id: &str) {
        let req = Request::put("/licenses")
            .header(header::AUTHORIZATION, basic())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(license_json(id)))
            .unwrap();
        assert_eq!(send(app, req).await.status(), StatusCode::CREATED);
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn admin_routes_need_credentials() {
        let app = app(false);
        let req = Request::put("/licenses")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(license_json("L1")))
            .unwrap();

        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn register_then_read_status() {
        let app = app(false);
        create_license(&app, "L1").await;

        let response = send(&app, Request::get("/licenses/L1/status").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE_LSD_JSON);
        let doc: StatusDocument = json(response).await;
        assert_eq!(doc.status, Status::Ready);

        let req = Request::post("/licenses/L1/register?id=d1&name=reader")
            .body(Body::empty())
            .unwrap();
        let doc: StatusDocument = json(send(&app, req).await).await;
        assert_eq!(doc.status, Status::Active);
        assert_eq!(doc.events.len(), 1);
    }

    #[tokio::test]
    async fn refused_registration_is_a_problem_document() {
        let app = app(false);
        create_license(&app, "L1").await;

        let req = Request::patch("/licenses/L1/status")
            .header(header::AUTHORIZATION, basic())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"status":"revoked","message":"fraud"}"#))
            .unwrap();
        let doc: StatusDocument = json(send(&app, req).await).await;
        assert_eq!(doc.status, Status::Revoked);

        let req = Request::post("/licenses/L1/register?id=d1&name=reader")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let problem: Problem = json(response).await;
        assert!(problem.kind.unwrap().ends_with("/registration"));
    }

    #[tokio::test]
    async fn malformed_renew_date_is_a_renew_date_problem() {
        let app = app(false);
        create_license(&app, "L1").await;
        let req = Request::post("/licenses/L1/register?id=d1&name=reader")
            .body(Body::empty())
            .unwrap();
        send(&app, req).await;

        let req = Request::put("/licenses/L1/renew?end=tomorrow").body(Body::empty()).unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let problem: Problem = json(response).await;
        assert!(problem.kind.unwrap().ends_with("/renew/date"));
    }

    #[tokio::test]
    async fn other_renew_errors_keep_the_renew_problem_type() {
        let app = app(false);
        create_license(&app, "L1").await;

        let long = "d".repeat(lcp_status::machine::MAX_DEVICE_FIELD_LEN + 1);
        let end = (Utc::now() + Duration::days(3)).trunc_subsecs(0).to_rfc3339();
        let uri = format!("/licenses/L1/renew?id={}&name=reader&end={}", long, end.replace('+', "%2B"));
        let response = send(&app, Request::put(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let problem: Problem = json(response).await;
        assert!(problem.kind.unwrap().ends_with("/renew"));
    }

    #[tokio::test]
    async fn filter_sets_link_header() {
        let app = app(false);
        create_license(&app, "L1").await;
        let req = Request::post("/licenses/L1/register?id=d1&name=reader")
            .body(Body::empty())
            .unwrap();
        send(&app, req).await;

        let req = Request::get("/licenses?devices=1&page=1&per_page=5")
            .header(header::AUTHORIZATION, basic())
            .body(Body::empty())
            .unwrap();
        let response = send(&app, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        let link = response.headers()[header::LINK].to_str().unwrap().to_string();
        assert!(link.contains("rel=\"next\""));

        let records: Vec<StatusRecord> = json(response).await;
        assert_eq!(records[0].license_id, "L1");

        let req = Request::get("/licenses/L1/registered")
            .header(header::AUTHORIZATION, basic())
            .body(Body::empty())
            .unwrap();
        let devices: Vec<RegisteredDevice> = json(send(&app, req).await).await;
        assert_eq!(devices[0].id, "d1");
    }

    #[tokio::test]
    async fn compliance_route_follows_the_mode() {
        let req = || {
            Request::post("/compliancetest?test_stage=start&test_number=1.1")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&app(false), req()).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send(&app(true), req()).await.status(), StatusCode::OK);
    }
}
