use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pulse_core::RankingCategory;
use pulse_db::DbError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RefreshRunsQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshRunItem {
    refresh_run_id: Uuid,
    category: String,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    signal_count: i32,
    groups_published: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunProviderItem {
    provider: String,
    status: String,
    signal_count: i32,
    retryable: bool,
    error_message: Option<String>,
    elapsed_ms: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshRunDetail {
    #[serde(flatten)]
    run: RefreshRunItem,
    providers: Vec<RunProviderItem>,
}

impl From<pulse_db::RefreshRunRow> for RefreshRunItem {
    fn from(row: pulse_db::RefreshRunRow) -> Self {
        Self {
            refresh_run_id: row.public_id,
            category: row.category,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            signal_count: row.signal_count,
            groups_published: row.groups_published,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_refresh_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RefreshRunsQuery>,
) -> Result<Json<ApiResponse<Vec<RefreshRunItem>>>, ApiError> {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| c.to_ascii_lowercase().parse::<RankingCategory>())
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let rows = pulse_db::list_refresh_runs(
        &state.pool,
        category.map(RankingCategory::as_str),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(RefreshRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_refresh_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<RefreshRunDetail>>, ApiError> {
    let public_id = Uuid::parse_str(run_id.trim()).map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("'{run_id}' is not a refresh run id"),
        )
    })?;

    let row = match pulse_db::get_refresh_run_by_public_id(&state.pool, public_id).await {
        Ok(row) => row,
        Err(DbError::NotFound) => {
            return Err(ApiError::new(
                req_id.0,
                "not_found",
                format!("refresh run {public_id} not found"),
            ));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    let providers = pulse_db::list_refresh_run_providers(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .into_iter()
        .map(|p| RunProviderItem {
            provider: p.provider,
            status: p.status,
            signal_count: p.signal_count,
            retryable: p.retryable,
            error_message: p.error_message,
            elapsed_ms: p.elapsed_ms,
        })
        .collect();

    Ok(Json(ApiResponse {
        data: RefreshRunDetail {
            run: row.into(),
            providers,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{build_app, default_rate_limit_state, test_support::lazy_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn refresh_run_detail_flattens_run_fields() {
        let detail = RefreshRunDetail {
            run: RefreshRunItem {
                refresh_run_id: Uuid::new_v4(),
                category: "hottest".to_string(),
                trigger_source: "scheduler".to_string(),
                status: "succeeded".to_string(),
                started_at: Some(Utc::now()),
                completed_at: Some(Utc::now()),
                signal_count: 24,
                groups_published: 4,
                error_message: None,
                created_at: Utc::now(),
            },
            providers: vec![RunProviderItem {
                provider: "open_meteo".to_string(),
                status: "succeeded".to_string(),
                signal_count: 24,
                retryable: false,
                error_message: None,
                elapsed_ms: 310,
            }],
        };

        let json = serde_json::to_value(&detail).expect("serialize refresh run detail");
        assert_eq!(json["category"], "hottest");
        assert_eq!(json["groups_published"], 4);
        assert_eq!(json["providers"][0]["provider"], "open_meteo");
    }

    #[tokio::test]
    async fn malformed_run_id_is_validation_error() {
        let app = build_app(lazy_state(), default_rate_limit_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/refresh-runs/not-a-uuid")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
