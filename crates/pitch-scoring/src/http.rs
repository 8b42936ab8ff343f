use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, warn};

use pitch_common::api::{
    ErrorResponse, PitchScoreResponse, PitchScoresResponse, SubmitPitchDeckResponse,
};

use crate::error::AppError;
use crate::model::{parse_startup_id, Caller};
use crate::service::PitchService;

const CALLER_ID_HEADER: &str = "x-user-id";
const CALLER_ROLE_HEADER: &str = "x-user-role";

/// HTTP routes. Caller identity comes from headers set by the upstream gateway.
pub fn router(service: Arc<PitchService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/founders/upload", post(upload))
        .route("/startups/{id}/pitch-score", get(get_score))
        .route("/batch/pitch-scores", get(get_scores))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Extraction(_) | AppError::EmptyContent => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_)
            | AppError::Classification(_)
            | AppError::Database(_)
            | AppError::Common(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
    };
    Caller::parse(header(CALLER_ID_HEADER)?, header(CALLER_ROLE_HEADER)?)
}

async fn upload(
    State(service): State<Arc<PitchService>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SubmitPitchDeckResponse>, AppError> {
    let caller = caller_from_headers(&headers)?;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?;
        let Some(field) = field else {
            return Err(AppError::InvalidInput("no file provided".to_string()));
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("file field has no file name".to_string()))?;
        let content_type = field.content_type().map(str::to_string);

        let submission = service
            .submit_document(caller, &filename, content_type.as_deref(), field)
            .await?;
        return Ok(Json(SubmitPitchDeckResponse {
            document: submission.document.to_api(),
            analysis: submission.analysis.to_api(),
        }));
    }
}

async fn get_score(
    State(service): State<Arc<PitchService>>,
    Path(id): Path<String>,
) -> Result<Json<PitchScoreResponse>, AppError> {
    let startup_id = parse_startup_id(&id)?;
    match service.get_score(startup_id).await? {
        Some(result) => Ok(Json(PitchScoreResponse {
            score: Some(result.to_api()),
        })),
        None => Err(AppError::NotFound(format!("no pitch score for startup {startup_id}"))),
    }
}

#[derive(Debug, Deserialize)]
struct BatchQuery {
    ids: Option<String>,
}

async fn get_scores(
    State(service): State<Arc<PitchService>>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<PitchScoresResponse>, AppError> {
    let raw = query.ids.unwrap_or_default();
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_startup_id)
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|e| warn!(error = %e, "batch score request rejected"))?;
    if ids.is_empty() {
        return Err(AppError::InvalidInput("ids must list at least one startup id".to_string()));
    }

    let scores: BTreeMap<String, _> = service
        .get_scores(&ids)
        .await?
        .into_iter()
        .map(|(id, result)| (id.to_string(), result.to_api()))
        .collect();
    Ok(Json(PitchScoresResponse { scores }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::extract::tests::make_test_pdf;
    use crate::repository::tests::seed_startup;
    use crate::service::tests::test_service;

    const BOUNDARY: &str = "pitch-test-boundary";

    fn multipart_body(filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(caller: Uuid, role: &str, body: Vec<u8>) -> Request<Body> {
        Request::post("/founders/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header(CALLER_ID_HEADER, caller.to_string())
            .header(CALLER_ROLE_HEADER, role)
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repo) = test_service(dir.path()).await;
        let (founder, startup) = (Uuid::new_v4(), Uuid::new_v4());
        seed_startup(&repo, startup, founder);
        let app = router(service, 1024 * 1024);

        let pdf = make_test_pdf(&["market size and TAM", "revenue model"]);
        let response = app
            .clone()
            .oneshot(upload_request(founder, "founder", multipart_body("deck.pdf", "application/pdf", &pdf)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = json(response).await;
        assert_eq!(uploaded["analysis"]["startup_id"], startup.to_string());
        assert_eq!(uploaded["document"]["format"], "pdf");

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/startups/{startup}/pitch-score"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let score = json(response).await;
        assert_eq!(score["score"]["total"], uploaded["analysis"]["total"]);
        assert_eq!(score["score"]["categories"]["market"], 20.0);

        let missing = Uuid::new_v4();
        let response = app
            .oneshot(
                Request::get(format!("/batch/pitch-scores?ids={startup},{missing}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let batch = json(response).await;
        let scores = batch["scores"].as_object().unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&startup.to_string()));
    }

    #[tokio::test]
    async fn csv_upload_is_unsupported_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repo) = test_service(dir.path()).await;
        let founder = Uuid::new_v4();
        seed_startup(&repo, Uuid::new_v4(), founder);

        let response = router(service, 1024 * 1024)
            .oneshot(upload_request(founder, "founder", multipart_body("data.csv", "text/csv", b"a,b")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn investor_upload_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repo) = test_service(dir.path()).await;

        let pdf = make_test_pdf(&["funding"]);
        let response = router(service, 1024 * 1024)
            .oneshot(upload_request(Uuid::new_v4(), "investor", multipart_body("deck.pdf", "application/pdf", &pdf)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repo) = test_service(dir.path()).await;

        let request = Request::post("/founders/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body("deck.pdf", "application/pdf", b"%PDF")))
            .unwrap();
        let response = router(service, 1024 * 1024).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unscored_startup_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repo) = test_service(dir.path()).await;

        let response = router(service, 1024)
            .oneshot(
                Request::get(format!("/startups/{}/pitch-score", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_rejects_empty_or_malformed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _repo) = test_service(dir.path()).await;
        let app = router(service, 1024);

        for uri in ["/batch/pitch-scores", "/batch/pitch-scores?ids=", "/batch/pitch-scores?ids=abc"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[test]
    fn service_failures_map_to_503() {
        assert_eq!(
            AppError::Classification("model down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::EmptyContent.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
