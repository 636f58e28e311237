// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    admin::DecryptFailure,
    state::AppState,
    storage::{AuditEvent, AuditEventType, Flag, SortOrder},
    submission::{intake::MAX_TEXT_BYTES, MAX_FILES, MAX_FILE_SIZE},
};

pub mod admin;
pub mod audit;
pub mod health;
pub mod submissions;

/// Largest accepted request body: every file at the size limit, the text, and
/// multipart framing.
pub const MAX_UPLOAD_BYTES: usize = MAX_FILES * MAX_FILE_SIZE + MAX_TEXT_BYTES + 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let intake_routes = Router::new()
        .route("/submissions", post(submissions::create_submission))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let admin_routes = Router::new()
        .route("/submissions", get(admin::list_submissions))
        .route(
            "/submissions/{receipt_code}",
            get(admin::get_submission)
                .patch(admin::update_submission)
                .delete(admin::purge_submission),
        )
        .route(
            "/submissions/{receipt_code}/files/{index}",
            get(admin::download_file),
        )
        .route(
            "/submissions/{receipt_code}/delete",
            post(admin::delete_submission),
        )
        .route(
            "/submissions/{receipt_code}/restore",
            post(admin::restore_submission),
        )
        .route("/audit", get(audit::query_audit_log));

    let v1_routes = intake_routes.nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        submissions::create_submission,
        admin::list_submissions,
        admin::get_submission,
        admin::download_file,
        admin::update_submission,
        admin::delete_submission,
        admin::restore_submission,
        admin::purge_submission,
        audit::query_audit_log
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            submissions::SubmissionForm,
            submissions::SubmissionCreatedResponse,
            admin::SubmissionSummary,
            admin::SubmissionListResponse,
            admin::SubmissionDetailResponse,
            admin::FileView,
            admin::UpdateSubmissionRequest,
            admin::PurgeResponse,
            audit::AuditLogResponse,
            AuditEvent,
            AuditEventType,
            DecryptFailure,
            Flag,
            SortOrder
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Submissions", description = "Anonymous submission intake"),
        (name = "Admin", description = "Inbox, decryption, lifecycle and audit")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin_token, png_bytes, token_with, TestContext, JWT_SECRET};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cloak-test-boundary";

    fn multipart_body(text: Option<&str>, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(text) = text {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"textMessage\"\r\n\r\n{text}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, mime, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit(app: &Router, text: &str, files: &[(&str, &str, &[u8])]) -> Response {
        let request = Request::post("/v1/submissions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(Some(text), files)))
            .unwrap();
        send(app, request).await
    }

    fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", admin_token()));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn liveness_is_ok() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let response = send(&app, Request::get("/health/live").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_checks_storage() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["blob_store"], "ok");
        assert_eq!(body["checks"]["database"], "ok");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let response = send(
            &app,
            Request::get("/api-doc/openapi.json").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["paths"]["/v1/submissions"].is_object());
    }

    #[tokio::test]
    async fn submission_lifecycle_over_http() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let png = png_bytes(2_048);

        let response = submit(&app, "hello", &[("shot.png", "image/png", &png)]).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let receipt = created["receiptCode"].as_str().unwrap().to_string();
        assert_eq!(created["fileCount"], 1);

        // Listing exposes metadata only
        let response = send(&app, admin_request("GET", "/v1/admin/submissions", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let list = json_body(response).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["submissions"][0]["receiptCode"], receipt.as_str());
        assert!(list["submissions"][0].get("plainText").is_none());

        // Detail decrypts
        let uri = format!("/v1/admin/submissions/{receipt}");
        let detail = json_body(send(&app, admin_request("GET", &uri, None)).await).await;
        assert_eq!(detail["plainText"], "hello");
        assert_eq!(detail["files"][0]["decrypted"], true);

        // File download is byte-exact
        let response = send(&app, admin_request("GET", &format!("{uri}/files/0"), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), png.as_slice());

        // View and flag
        let response = send(
            &app,
            admin_request("PATCH", &uri, Some(serde_json::json!({ "viewed": true, "flag": "urgent" }))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json_body(response).await;
        assert_eq!(summary["isViewed"], true);
        assert_eq!(summary["isFlagged"], "urgent");

        // Purge from the inbox is refused
        let response = send(&app, admin_request("DELETE", &uri, None)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Bin, restore, bin again, purge
        let response = send(&app, admin_request("POST", &format!("{uri}/delete"), None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            admin_request("PATCH", &uri, Some(serde_json::json!({ "viewed": false }))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let restored =
            json_body(send(&app, admin_request("POST", &format!("{uri}/restore"), None)).await).await;
        assert_eq!(restored["isDeleted"], false);
        assert_eq!(restored["isViewed"], false);
        assert_eq!(restored["isFlagged"], "none");

        send(&app, admin_request("POST", &format!("{uri}/delete"), None)).await;
        let response = send(&app, admin_request("DELETE", &uri, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, admin_request("GET", &uri, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Audit trail
        let audit = json_body(
            send(
                &app,
                admin_request("GET", &format!("/v1/admin/audit?receipt_code={receipt}"), None),
            )
            .await,
        )
        .await;
        let types: Vec<&str> = audit["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap())
            .collect();
        assert!(types.contains(&"submission_created"));
        assert!(types.contains(&"submission_purged"));
    }

    #[tokio::test]
    async fn intake_rejects_missing_text() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let request = Request::post("/v1/submissions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(None, &[])))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn intake_rejects_six_files() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let png = png_bytes(64);
        let files: Vec<(&str, &str, &[u8])> = (0..6).map(|_| ("a.png", "image/png", png.as_slice())).collect();

        let response = submit(&app, "too many", &files).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "invalid_input");
    }

    #[tokio::test]
    async fn intake_rejects_disallowed_type() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let response = submit(&app, "gif", &[("a.gif", "image/gif", b"GIF89a")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let response = send(
            &app,
            Request::get("/v1/admin/submissions").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_admin_cannot_touch_submission() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let created = json_body(submit(&app, "for the inbox owner", &[]).await).await;
        let receipt = created["receiptCode"].as_str().unwrap();

        let intruder = token_with(JWT_SECRET, "someone-else", Some("admin"), 3600);
        let request = Request::get(format!("/v1/admin/submissions/{receipt}"))
            .header(header::AUTHORIZATION, format!("Bearer {intruder}"))
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::post(format!("/v1/admin/submissions/{receipt}/delete"))
            .header(header::AUTHORIZATION, format!("Bearer {intruder}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::FORBIDDEN);

        // The intruder's inbox is empty
        let request = Request::get("/v1/admin/submissions")
            .header(header::AUTHORIZATION, format!("Bearer {intruder}"))
            .body(Body::empty())
            .unwrap();
        let list = json_body(send(&app, request).await).await;
        assert_eq!(list["total"], 0);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let ctx = TestContext::new();
        let app = router(ctx.state.clone());
        let created = json_body(submit(&app, "patch me", &[]).await).await;
        let receipt = created["receiptCode"].as_str().unwrap();

        let response = send(
            &app,
            admin_request(
                "PATCH",
                &format!("/v1/admin/submissions/{receipt}"),
                Some(serde_json::json!({})),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
