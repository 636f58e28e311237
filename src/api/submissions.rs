// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Anonymous submission intake.
//!
//! No authentication and no header inspection. The only thing handed back is
//! the receipt code.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{ApiError, CloakError},
    state::AppState,
    submission::{IncomingFile, SubmissionInput, MAX_FILES},
};

/// Multipart field carrying the message.
pub const TEXT_FIELD: &str = "textMessage";

/// Multipart field carrying attachments (repeatable).
pub const FILES_FIELD: &str = "files";

/// Multipart body schema, for documentation only.
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionForm {
    /// The message. Required.
    text_message: String,
    /// Up to five attachments: PDF, DOCX, JPEG, PNG or MP4, 25 MiB each.
    #[schema(value_type = Vec<String>, format = Binary)]
    files: Vec<Vec<u8>>,
}

/// Response after a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionCreatedResponse {
    /// Receipt code to reference the submission later.
    pub receipt_code: String,
    /// Number of files stored.
    pub file_count: usize,
}

/// Submit an anonymous message with optional attachments.
#[utoipa::path(
    post,
    path = "/v1/submissions",
    tag = "Submissions",
    request_body(content = SubmissionForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Submission stored", body = SubmissionCreatedResponse),
        (status = 400, description = "Invalid submission"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Submission could not be stored")
    )
)]
pub async fn create_submission(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionCreatedResponse>), ApiError> {
    let input = read_form(multipart).await?;
    let receipt = state.submissions.submit(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionCreatedResponse {
            receipt_code: receipt.receipt_code,
            file_count: receipt.file_count,
        }),
    ))
}

async fn read_form(mut multipart: Multipart) -> Result<SubmissionInput, ApiError> {
    let mut text_message: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(TEXT_FIELD) => {
                text_message = Some(field.text().await.map_err(multipart_error)?);
            }
            Some(FILES_FIELD) => {
                if files.len() == MAX_FILES {
                    return Err(CloakError::InvalidInput(format!(
                        "at most {MAX_FILES} files may be attached"
                    ))
                    .into());
                }
                let original_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                files.push(IncomingFile {
                    original_name,
                    mime_type,
                    bytes,
                });
            }
            // Unknown fields are drained and ignored
            _ => {
                field.bytes().await.map_err(multipart_error)?;
            }
        }
    }

    Ok(SubmissionInput {
        text_message: text_message
            .ok_or_else(|| ApiError::bad_request(format!("{TEXT_FIELD} is required")))?,
        files,
    })
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
