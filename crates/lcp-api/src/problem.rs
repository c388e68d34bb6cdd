//! RFC 7807 problem responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use lcp_license::LicenseError;
use lcp_status::StatusError;
use lcp_types::CONTENT_TYPE_PROBLEM_JSON;
use lcp_types::api::{Problem, ProblemKind};

/// Error returned by every handler, rendered as `application/problem+json`.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ProblemKind,
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ProblemKind, status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            detail: detail.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ProblemKind::Server, 401, "")
    }

    /// Map a status server error onto the problem type of the calling route.
    pub fn status(kind: ProblemKind) -> impl Fn(StatusError) -> Self {
        move |e| Self::new(kind, e.http_status(), e.to_string())
    }
}

impl From<LicenseError> for ApiError {
    fn from(e: LicenseError) -> Self {
        Self::new(ProblemKind::Server, e.http_status(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), "{}", self.detail);
        } else {
            debug!(status = self.status.as_u16(), "{}", self.detail);
        }

        let problem = Problem {
            kind: Some(self.kind.type_uri()),
            title: self.status.canonical_reason().unwrap_or("Error").to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
        };

        let mut response = (self.status, Json(problem)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PROBLEM_JSON));
        if self.status == StatusCode::UNAUTHORIZED {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"Readium LCP\""));
        }
        response
    }
}
