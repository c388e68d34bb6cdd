//! Issuing server routes. Every route requires Basic credentials.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use lcp_license::LicenseService;
use lcp_license::service::LicensePage;
use lcp_types::CONTENT_TYPE_LCP_JSON;
use lcp_types::api::{PageParams, ProblemKind};
use lcp_types::license::{ContentRequest, License, LicenseRequest, Rights, StoredLicense};

use crate::auth::{PasswordFile, require_basic};
use crate::problem::ApiError;

pub type LicenseState = Arc<LicenseService>;

pub fn router(service: Arc<LicenseService>, passwords: Arc<PasswordFile>) -> Router {
    Router::new()
        .route("/contents/{content_id}", put(put_content))
        .route("/contents/{content_id}/license", post(generate))
        .route("/contents/{content_id}/licenses", get(list_content_licenses))
        .route("/licenses", get(list_licenses))
        .route(
            "/licenses/{license_id}",
            post(regenerate).patch(update_rights).get(get_license),
        )
        .layer(middleware::from_fn_with_state(passwords, require_basic))
        .with_state(service)
}

fn lcpl(status: StatusCode, license: License) -> Response {
    let mut response = (status, Json(license)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_LCP_JSON));
    response
}

fn listing(page: LicensePage) -> Result<Response, ApiError> {
    let mut response = Json::<Vec<StoredLicense>>(page.licenses).into_response();
    if let Some(link) = page.link {
        let value =
            HeaderValue::from_str(&link).map_err(|e| ApiError::new(ProblemKind::Server, 500, e.to_string()))?;
        response.headers_mut().insert(header::LINK, value);
    }
    Ok(response)
}

async fn put_content(
    State(service): State<LicenseState>,
    Path(content_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Result<StatusCode, ApiError> {
    let created = service.put_content(&content_id, req).await?;
    Ok(if created { StatusCode::CREATED } else { StatusCode::OK })
}

async fn generate(
    State(service): State<LicenseState>,
    Path(content_id): Path<String>,
    Json(req): Json<LicenseRequest>,
) -> Result<Response, ApiError> {
    let license = service.generate(&content_id, req).await?;
    Ok(lcpl(StatusCode::CREATED, license))
}

async fn regenerate(
    State(service): State<LicenseState>,
    Path(license_id): Path<String>,
    Json(req): Json<LicenseRequest>,
) -> Result<Response, ApiError> {
    let license = service.regenerate(&license_id, req).await?;
    Ok(lcpl(StatusCode::OK, license))
}

async fn update_rights(
    State(service): State<LicenseState>,
    Path(license_id): Path<String>,
    Json(req): Json<LicenseRequest>,
) -> Result<Json<Rights>, ApiError> {
    let rights = service.update_rights(&license_id, &req.rights.unwrap_or_default()).await?;
    Ok(Json(rights))
}

async fn list_licenses(
    State(service): State<LicenseState>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    listing(service.list_licenses(None, &params).await?)
}

async fn list_content_licenses(
    State(service): State<LicenseState>,
    Path(content_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response, ApiError> {
    listing(service.list_licenses(Some(&content_id), &params).await?)
}

async fn get_license(
    State(service): State<LicenseState>,
    Path(license_id): Path<String>,
) -> Result<Json<StoredLicense>, ApiError> {
    Ok(Json(service.get_license(&license_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::password_file;
    use axum::body::Body;
    use axum::http::Request;
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use futures_util::future::BoxFuture;
    use http_body_util::BodyExt;
    use lcp_crypto::sign::Signer;
    use lcp_db::{Database, Schema};
    use lcp_license::notifier::StatusNotifier;
    use lcp_license::{LicenseBuilder, LicenseError, Profile};
    use lcp_types::license::LicenseHeader;
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;
    use serde_json::json;
    use tower::ServiceExt;

    struct Silent;

    impl StatusNotifier for Silent {
        fn license_issued<'a>(&'a self, _: &'a LicenseHeader) -> BoxFuture<'a, Result<(), LicenseError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn app() -> Router {
        let db = Arc::new(Database::open_in_memory(Schema::License).unwrap());
        let signer = Arc::new(Signer::ecdsa(SigningKey::random(&mut OsRng), vec![0x30]));
        let builder = LicenseBuilder::new(
            Profile::V1,
            "https://shop.example.com/lcp/hint".into(),
            "https://cdn.example.com/{publication_id}".into(),
            "https://lsd.example.com/licenses/{license_id}/status".into(),
            signer,
        );
        let service = Arc::new(LicenseService::new(
            db,
            builder,
            "https://provider.example.com".into(),
            Arc::new(Silent),
        ));
        router(service, Arc::new(password_file("admin", "letmein")))
    }

    fn call(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Basic {}", BASE64.encode("admin:letmein")))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn content() -> serde_json::Value {
        json!({
            "encryption_key": BASE64.encode([9u8; 32]),
            "location": "s3://bucket/book.epub",
            "length": 2048,
            "sha256": "00ff",
        })
    }

    fn license_request() -> serde_json::Value {
        json!({
            "user": { "id": "u1", "email": "reader@example.com", "encrypted": ["email"] },
            "encryption": { "user_key": {
                "text_hint": "usual",
                "value": "0101010101010101010101010101010101010101010101010101010101010101",
            }},
            "rights": { "print": 10, "end": "2031-01-01T00:00:00Z" },
        })
    }

    #[tokio::test]
    async fn content_put_is_created_then_replaced() {
        let app = app();
        let first = app.clone().oneshot(call("PUT", "/contents/book", content())).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app.clone().oneshot(call("PUT", "/contents/book", content())).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn issue_patch_and_fetch() {
        let app = app();
        app.clone().oneshot(call("PUT", "/contents/book", content())).await.unwrap();

        let response = app
            .clone()
            .oneshot(call("POST", "/contents/book/license", license_request()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE_LCP_JSON);
        let license = body_json(response).await;
        let id = license["id"].as_str().unwrap().to_string();
        assert_eq!(license["encryption"]["profile"], "http://readium.org/lcp/profile-1.0");
        assert!(license["signature"]["value"].is_string());

        let response = app
            .clone()
            .oneshot(call("PATCH", &format!("/licenses/{}", id), json!({"rights": {"copy": 3}})))
            .await
            .unwrap();
        let rights = body_json(response).await;
        assert_eq!(rights["copy"], 3);
        assert_eq!(rights["print"], 10);

        let response = app
            .clone()
            .oneshot(call("GET", &format!("/licenses/{}", id), json!({})))
            .await
            .unwrap();
        let stored = body_json(response).await;
        assert_eq!(stored["content_id"], "book");
        assert!(stored.get("encryption").is_none());
    }

    #[tokio::test]
    async fn listings_carry_link_headers() {
        let app = app();
        app.clone().oneshot(call("PUT", "/contents/book", content())).await.unwrap();
        app.clone()
            .oneshot(call("POST", "/contents/book/license", license_request()))
            .await
            .unwrap();

        let response = app.clone().oneshot(call("GET", "/licenses", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::LINK].to_str().unwrap().contains("rel=\"next\""));
        let listed = body_json(response).await;
        assert_eq!(listed[0]["content_id"], "book");

        let response = app
            .clone()
            .oneshot(call("GET", "/contents/book/licenses?page=1&per_page=5", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(call("GET", "/contents/other/licenses", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_content_is_404() {
        let response = app()
            .oneshot(call("POST", "/contents/nope/license", license_request()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn credentials_are_required() {
        let req = Request::get("/licenses/any").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
