// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit log queries.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Admin,
    error::ApiError,
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditFilter},
};

/// Longest range a single query may span.
pub const MAX_RANGE_DAYS: i64 = 92;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for audit log queries.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Start date (YYYY-MM-DD). Defaults to today.
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD). Defaults to today.
    pub end_date: Option<String>,
    /// Filter by event type.
    pub event_type: Option<AuditEventType>,
    /// Filter by receipt code.
    pub receipt_code: Option<String>,
    /// Maximum number of results (default 100).
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
}

/// Response for audit log queries.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    /// Audit events matching the query.
    pub events: Vec<AuditEvent>,
    /// Total count (before limit/offset).
    pub total: usize,
    /// Whether there are more results.
    pub has_more: bool,
}

/// Query audit logs.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    params(AuditQueryParams),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn query_audit_log(
    Admin(principal): Admin,
    Query(params): Query<AuditQueryParams>,
    State(state): State<AppState>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let today = Utc::now().date_naive();
    let start = parse_date("start_date", params.start_date.as_deref(), today)?;
    let end = parse_date("end_date", params.end_date.as_deref(), today)?;
    if start > end {
        return Err(ApiError::bad_request("start_date is after end_date"));
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(format!(
            "date range exceeds {MAX_RANGE_DAYS} days"
        )));
    }

    let filter = AuditFilter {
        event_type: params.event_type,
        resource_id: params.receipt_code,
    };
    let events = state.audit.search(start, end, &filter)?;

    let total = events.len();
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let has_more = offset.saturating_add(limit) < total;
    let events = events.into_iter().skip(offset).take(limit).collect();

    tracing::debug!(user_id = %principal.id(), total, "Audit log queried");

    Ok(Json(AuditLogResponse {
        events,
        total,
        has_more,
    }))
}

fn parse_date(name: &str, raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, ApiError> {
    match raw {
        None => Ok(default),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::bad_request(format!("Invalid {name} format. Use YYYY-MM-DD."))
        }),
    }
}
