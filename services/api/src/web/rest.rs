//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use crate::web::sync::SyncError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use foyer_core::balance::{self, MonthlyStatus, WeeklyBalance};
use foyer_core::domain::{AppData, Task};
use foyer_core::{rotation, week};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_data_handler,
        update_data_handler,
        summary_handler,
        test_archive_handler,
    ),
    components(
        schemas(UpdateResponse, ArchiveResponse)
    ),
    tags(
        (name = "Household Sync API", description = "REST surface of the shared household document.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Outcome of a wholesale document replace.
#[derive(Serialize, ToSchema)]
pub struct UpdateResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// This week's chore for one group, per the rotation.
#[derive(Serialize)]
pub struct ChoreAssignment {
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub name: String,
    /// `None` while the rotation has never been started.
    pub task: Option<Task>,
}

/// Derived view of the current week and month: per-user balances, chore
/// assignments and monthly ledger status. Computed on demand, never stored.
#[derive(Serialize)]
pub struct SummaryResponse {
    pub week: String,
    #[serde(rename = "weeklyAmount")]
    pub weekly_amount: f64,
    pub balances: BTreeMap<String, WeeklyBalance>,
    pub chores: Vec<ChoreAssignment>,
    pub month: String,
    /// Empty when no bill has been recorded for the month.
    #[serde(rename = "monthlyStatus")]
    pub monthly_status: BTreeMap<String, MonthlyStatus>,
}

/// Outcome of a manually triggered weekly archival.
#[derive(Serialize, ToSchema)]
pub struct ArchiveResponse {
    success: bool,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Returns the full current document.
#[utoipa::path(
    get,
    path = "/api/data",
    responses(
        (status = 200, description = "The full current document"),
        (status = 500, description = "The document could not be read")
    )
)]
pub async fn get_data_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<AppData>, (StatusCode, String)> {
    app_state.sync.snapshot().await.map(Json).map_err(|e| {
        error!("Snapshot failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Replaces the document wholesale (last writer wins), persists it and
/// broadcasts `dataUpdated` to every connected channel.
#[utoipa::path(
    post,
    path = "/api/data",
    request_body(content_type = "application/json", description = "The complete replacement document."),
    responses(
        (status = 200, description = "Replace persisted and broadcast", body = UpdateResponse),
        (status = 400, description = "Replacement document failed validation", body = UpdateResponse),
        (status = 500, description = "Persistence failed", body = UpdateResponse)
    )
)]
pub async fn update_data_handler(
    State(app_state): State<Arc<AppState>>,
    Json(data): Json<AppData>,
) -> impl IntoResponse {
    match app_state.sync.replace_all(data, None).await {
        Ok(()) => (
            StatusCode::OK,
            Json(UpdateResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => {
            error!("Wholesale replace failed: {}", e);
            let status = match &e {
                SyncError::Validation(_) | SyncError::NotFound(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(UpdateResponse {
                    success: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Returns the derived balances, chore assignments and monthly status for
/// the current week and month.
#[utoipa::path(
    get,
    path = "/api/summary",
    responses(
        (status = 200, description = "Derived weekly and monthly view"),
        (status = 500, description = "The document could not be read")
    )
)]
pub async fn summary_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SummaryResponse>, (StatusCode, String)> {
    let doc = app_state.sync.snapshot().await.map_err(|e| {
        error!("Snapshot failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let now = Utc::now();
    let current_week = week::week_key(now);
    let week_number = week::week_number(now);
    let month = week::month_key(now);

    let balances = doc
        .users
        .iter()
        .map(|u| {
            let b = balance::weekly_balance(
                doc.weekly_amount,
                doc.payment_for(&current_week, &u.name),
                doc.debts_for(&current_week, &u.name),
            );
            (u.name.clone(), b)
        })
        .collect();

    let chores = doc
        .groups
        .iter()
        .enumerate()
        .map(|(index, g)| ChoreAssignment {
            group_id: g.id.clone(),
            name: g.name.clone(),
            task: rotation::current_task(&doc.group_rotation, index, week_number),
        })
        .collect();

    let monthly_status = match doc.monthly_bills.get(&month) {
        Some(bill) => match balance::per_person_share(bill, doc.users.len()) {
            Ok(share) => doc
                .users
                .iter()
                .map(|u| {
                    let paid = doc
                        .monthly_payments
                        .get(&month)
                        .and_then(|m| m.get(&u.name))
                        .map(|l| l.paid)
                        .unwrap_or(0.0);
                    (u.name.clone(), balance::monthly_status(paid, share))
                })
                .collect(),
            Err(_) => BTreeMap::new(),
        },
        None => BTreeMap::new(),
    };

    Ok(Json(SummaryResponse {
        week: current_week,
        weekly_amount: doc.weekly_amount,
        balances,
        chores,
        month,
        monthly_status,
    }))
}

/// Manually triggers the weekly archival routine.
#[utoipa::path(
    post,
    path = "/api/test-archive",
    responses(
        (status = 200, description = "Archival ran (or was a no-op for an empty week)", body = ArchiveResponse),
        (status = 500, description = "Archival failed", body = ArchiveResponse)
    )
)]
pub async fn test_archive_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    match app_state.sync.archive_week().await {
        Ok(Some(receipt)) => (
            StatusCode::OK,
            Json(ArchiveResponse {
                success: true,
                timestamp: receipt.archived_at,
                message: Some(format!("week {} archived", receipt.week)),
            }),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(ArchiveResponse {
                success: true,
                timestamp: Utc::now(),
                message: Some("no payments recorded this week, nothing archived".to_string()),
            }),
        ),
        Err(e) => {
            error!("Manual archival failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ArchiveResponse {
                    success: false,
                    timestamp: Utc::now(),
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}
