// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin endpoints for the submission inbox.
//!
//! Every endpoint requires an admin token, and the token's principal must
//! own the submission. Listings only ever expose unencrypted metadata.
//! Plaintext is produced on the detail and download endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    admin::{DecryptFailure, FileOutcome},
    audit_log,
    auth::Admin,
    error::{ApiError, CloakError},
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, Flag, OwnershipEnforcer, SortOrder, StorageError,
        SubmissionQuery, SubmissionRecord, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    },
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the inbox listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListSubmissionsParams {
    /// Filter on viewed state.
    pub viewed: Option<bool>,
    /// Filter on flag.
    pub flag: Option<Flag>,
    /// List the bin instead of the inbox.
    #[serde(default)]
    pub bin: bool,
    /// Receipt-code substring (case-insensitive).
    pub search: Option<String>,
    /// Creation-time order (`asc` or `desc`, default `desc`).
    pub order: Option<SortOrder>,
    /// Page size (default 50, max 200).
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
}

/// Submission metadata. Never contains content.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub receipt_code: String,
    pub is_viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub is_flagged: Flag,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&SubmissionRecord> for SubmissionSummary {
    fn from(record: &SubmissionRecord) -> Self {
        Self {
            receipt_code: record.receipt_code.clone(),
            is_viewed: record.is_viewed,
            viewed_at: record.viewed_at,
            is_flagged: record.is_flagged,
            is_deleted: record.is_deleted,
            deleted_by: record.deleted_by.clone(),
            deleted_at: record.deleted_at,
            file_count: record.files.len(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionListResponse {
    pub submissions: Vec<SubmissionSummary>,
    /// Matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Per-file decryption status. Bytes are served by the download endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub index: usize,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub decrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DecryptFailure>,
}

/// Decrypted view of one submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDetailResponse {
    #[serde(flatten)]
    pub summary: SubmissionSummary,
    /// `null` when the text could not be decrypted.
    pub plain_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_error: Option<DecryptFailure>,
    pub files: Vec<FileView>,
}

/// Partial update of viewed state and flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSubmissionRequest {
    pub viewed: Option<bool>,
    pub flag: Option<Flag>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    pub receipt_code: String,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List submissions in the caller's inbox or bin.
#[utoipa::path(
    get,
    path = "/v1/admin/submissions",
    tag = "Admin",
    params(ListSubmissionsParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Submission metadata", body = SubmissionListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_submissions(
    Admin(principal): Admin,
    Query(params): Query<ListSubmissionsParams>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    let query = SubmissionQuery {
        recipient: Some(principal.id().to_string()),
        viewed: params.viewed,
        flag: params.flag,
        bin: params.bin,
        search: params.search,
        order: params.order.unwrap_or_default(),
        limit: Some(limit),
        offset,
    };

    let page = state.repository.list(&query)?;
    let has_more = offset + page.items.len() < page.total;

    Ok(Json(SubmissionListResponse {
        submissions: page.items.iter().map(SubmissionSummary::from).collect(),
        total: page.total,
        has_more,
    }))
}

/// Decrypt and return a submission.
///
/// Text and files fail independently; a failed item carries an error tag.
/// Files are authenticated here but their bytes are only served by the
/// download route.
#[utoipa::path(
    get,
    path = "/v1/admin/submissions/{receipt_code}",
    tag = "Admin",
    params(("receipt_code" = String, Path, description = "Receipt code")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Decrypted submission", body = SubmissionDetailResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission not found")
    )
)]
pub async fn get_submission(
    Admin(principal): Admin,
    Path(receipt_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionDetailResponse>, ApiError> {
    let record = load_owned(&state, principal.id(), &receipt_code)?;
    let view = state.decryptor.verify_submission(&record).await;

    let failed = view.text_error.is_some() || view.files.iter().any(|f| !f.is_decrypted());
    let mut event = AuditEvent::new(AuditEventType::SubmissionDecrypted)
        .with_user(principal.id())
        .with_resource(&record.receipt_code);
    if failed {
        event = event.failed("one or more items could not be decrypted");
    }
    state.audit.record(event);

    let files = view
        .files
        .into_iter()
        .map(|file| {
            let error = match file.outcome {
                FileOutcome::Decrypted { .. } | FileOutcome::Verified => None,
                FileOutcome::Failed { error } => Some(error),
            };
            FileView {
                index: file.index,
                original_name: file.original_name,
                mime_type: file.mime_type,
                size: file.size,
                decrypted: error.is_none(),
                error,
            }
        })
        .collect();

    Ok(Json(SubmissionDetailResponse {
        summary: SubmissionSummary::from(&record),
        plain_text: view.plain_text,
        text_error: view.text_error,
        files,
    }))
}

/// Download one decrypted attachment.
#[utoipa::path(
    get,
    path = "/v1/admin/submissions/{receipt_code}/files/{index}",
    tag = "Admin",
    params(
        ("receipt_code" = String, Path, description = "Receipt code"),
        ("index" = usize, Path, description = "Zero-based file index")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Decrypted file bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission or file not found"),
        (status = 500, description = "File could not be decrypted")
    )
)]
pub async fn download_file(
    Admin(principal): Admin,
    Path((receipt_code, index)): Path<(String, usize)>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let record = load_owned(&state, principal.id(), &receipt_code)?;

    let download = match state.decryptor.decrypt_file(&record, index).await {
        Ok(download) => download,
        Err(e) => {
            state.audit.record(
                AuditEvent::new(AuditEventType::SubmissionDecrypted)
                    .with_user(principal.id())
                    .with_resource(&record.receipt_code)
                    .with_details(serde_json::json!({ "file": index }))
                    .failed(e.code()),
            );
            return Err(e.into());
        }
    };
    state.audit.record(
        AuditEvent::new(AuditEventType::SubmissionDecrypted)
            .with_user(principal.id())
            .with_resource(&record.receipt_code)
            .with_details(serde_json::json!({ "file": index })),
    );

    let content_type = HeaderValue::from_str(&download.mime_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&download.original_name)
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

/// Update viewed state and/or flag.
#[utoipa::path(
    patch,
    path = "/v1/admin/submissions/{receipt_code}",
    tag = "Admin",
    params(("receipt_code" = String, Path, description = "Receipt code")),
    request_body = UpdateSubmissionRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated submission", body = SubmissionSummary),
        (status = 400, description = "Nothing to update"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission is in the bin")
    )
)]
pub async fn update_submission(
    Admin(principal): Admin,
    Path(receipt_code): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<UpdateSubmissionRequest>,
) -> Result<Json<SubmissionSummary>, ApiError> {
    if request.viewed.is_none() && request.flag.is_none() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    let actor = principal.id();

    let record = state
        .repository
        .update(&receipt_code, actor, request.viewed, request.flag)
        .map_err(|e| rejected(&state, actor, &receipt_code, e))?;

    if let Some(viewed) = request.viewed {
        let event_type = if viewed {
            AuditEventType::SubmissionViewed
        } else {
            AuditEventType::SubmissionUnviewed
        };
        audit_log!(state.audit, event_type, actor, &receipt_code);
    }
    if let Some(flag) = request.flag {
        state.audit.record(
            AuditEvent::new(AuditEventType::SubmissionFlagged)
                .with_user(actor)
                .with_resource(&receipt_code)
                .with_details(serde_json::json!({ "flag": flag })),
        );
    }

    Ok(Json(SubmissionSummary::from(&record)))
}

/// Move a submission to the bin.
#[utoipa::path(
    post,
    path = "/v1/admin/submissions/{receipt_code}/delete",
    tag = "Admin",
    params(("receipt_code" = String, Path, description = "Receipt code")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Submission moved to the bin", body = SubmissionSummary),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission already in the bin")
    )
)]
pub async fn delete_submission(
    Admin(principal): Admin,
    Path(receipt_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let actor = principal.id();
    let record = state
        .repository
        .soft_delete(&receipt_code, actor)
        .map_err(|e| rejected(&state, actor, &receipt_code, e))?;
    audit_log!(state.audit, AuditEventType::SubmissionDeleted, actor, &receipt_code);
    Ok(Json(SubmissionSummary::from(&record)))
}

/// Restore a submission from the bin as unviewed and unflagged.
#[utoipa::path(
    post,
    path = "/v1/admin/submissions/{receipt_code}/restore",
    tag = "Admin",
    params(("receipt_code" = String, Path, description = "Receipt code")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Submission restored", body = SubmissionSummary),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission is not in the bin, or is being purged")
    )
)]
pub async fn restore_submission(
    Admin(principal): Admin,
    Path(receipt_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let actor = principal.id();
    let record = state
        .repository
        .restore(&receipt_code, actor)
        .map_err(|e| rejected(&state, actor, &receipt_code, e))?;
    audit_log!(state.audit, AuditEventType::SubmissionRestored, actor, &receipt_code);
    Ok(Json(SubmissionSummary::from(&record)))
}

/// Permanently remove a binned submission and all of its ciphertext.
///
/// A failed purge leaves the submission in the bin and can be retried.
#[utoipa::path(
    delete,
    path = "/v1/admin/submissions/{receipt_code}",
    tag = "Admin",
    params(("receipt_code" = String, Path, description = "Receipt code")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Submission purged", body = PurgeResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not the recipient of this submission"),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission is not in the bin"),
        (status = 500, description = "Purge failed; retry")
    )
)]
pub async fn purge_submission(
    Admin(principal): Admin,
    Path(receipt_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PurgeResponse>, ApiError> {
    let actor = principal.id();
    match state
        .repository
        .purge(&receipt_code, actor, &state.content)
        .await
    {
        Ok(record) => {
            tracing::info!(receipt_code = %record.receipt_code, "Submission purged");
            audit_log!(state.audit, AuditEventType::SubmissionPurged, actor, &receipt_code);
            Ok(Json(PurgeResponse {
                receipt_code: record.receipt_code,
                message: "Submission purged".to_string(),
            }))
        }
        Err(e) => {
            let retryable = !matches!(
                e,
                StorageError::NotFound(_)
                    | StorageError::PermissionDenied { .. }
                    | StorageError::InvalidStateTransition { .. }
            );
            if retryable {
                tracing::warn!(receipt_code = %receipt_code, error = %e, "Purge failed");
                state.audit.record(
                    AuditEvent::new(AuditEventType::PurgeFailed)
                        .with_user(actor)
                        .with_resource(&receipt_code)
                        .failed(e.to_string()),
                );
            }
            Err(rejected(&state, actor, &receipt_code, e))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Load a record and check that `actor` owns it.
fn load_owned(state: &AppState, actor: &str, receipt_code: &str) -> Result<SubmissionRecord, ApiError> {
    let record = state.repository.get(receipt_code)?;
    record
        .verify_ownership(actor)
        .map_err(|e| rejected(state, actor, receipt_code, e))?;
    Ok(record)
}

/// Convert a storage failure, auditing ownership violations.
fn rejected(state: &AppState, actor: &str, receipt_code: &str, e: StorageError) -> ApiError {
    if matches!(e, StorageError::PermissionDenied { .. }) {
        tracing::warn!(user_id = %actor, receipt_code = %receipt_code, "Ownership check failed");
        state.audit.record(
            AuditEvent::new(AuditEventType::PermissionDenied)
                .with_user(actor)
                .with_resource(receipt_code)
                .failed(e.to_string()),
        );
    }
    CloakError::from(e).into()
}

/// Reduce a file name to printable ASCII without quotes or backslashes.
fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
