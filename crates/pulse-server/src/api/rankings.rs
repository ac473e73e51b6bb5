use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pulse_core::{EntityType, Period, RankingCategory};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RankingsQuery {
    pub category: Option<String>,
    pub period: Option<String>,
    pub entity_type: Option<String>,
    pub country: Option<String>,
    pub parent: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RankingItem {
    category: String,
    period: String,
    entity_type: String,
    entity_name: String,
    country_code: Option<String>,
    parent: Option<String>,
    rank: i32,
    stat: String,
    score: Decimal,
    trend: String,
    explanation: Option<String>,
    snapshot_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct SnapshotItem {
    snapshot_id: Uuid,
    category: String,
    period: String,
    snapshot_at: DateTime<Utc>,
    published_at: DateTime<Utc>,
    entry_count: i32,
    signal_count: i32,
    providers: serde_json::Value,
}

/// Validated form of [`RankingsQuery`].
#[derive(Debug, PartialEq)]
struct RankingSelection {
    category: RankingCategory,
    period: Period,
    entity_type: Option<EntityType>,
    country: Option<String>,
    parent: Option<String>,
    limit: i64,
}

fn parse_query(req_id: &str, query: RankingsQuery) -> Result<RankingSelection, ApiError> {
    let Some(category) = query.category.filter(|c| !c.trim().is_empty()) else {
        return Err(ApiError::new(
            req_id,
            "bad_request",
            "query parameter 'category' is required",
        ));
    };
    let category = category
        .trim()
        .to_ascii_lowercase()
        .parse::<RankingCategory>()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;

    let period = match query.period.as_deref().map(str::trim) {
        None | Some("") => Period::Today,
        Some(raw) => raw
            .to_ascii_lowercase()
            .parse::<Period>()
            .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?,
    };

    let entity_type = query
        .entity_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase().parse::<EntityType>())
        .transpose()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;

    let country = query
        .country
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());
    if country.as_ref().is_some_and(|c| c.len() != 2) {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "country must be an ISO-3166 alpha-2 code",
        ));
    }

    let parent = query
        .parent
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    Ok(RankingSelection {
        category,
        period,
        entity_type,
        country,
        parent,
        limit: normalize_limit(query.limit),
    })
}

pub(super) async fn list_rankings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<Vec<RankingItem>>>, ApiError> {
    let selection = parse_query(&req_id.0, query)?;

    let filters = pulse_db::RankingFilters {
        category: selection.category,
        period: selection.period,
        entity_type: selection.entity_type.map(EntityType::as_str),
        country_code: selection.country.as_deref(),
        parent: selection.parent.as_deref(),
        limit: selection.limit,
    };
    let rows = pulse_db::list_rankings(&state.pool, filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| RankingItem {
            category: row.category,
            period: row.period,
            entity_type: row.entity_type,
            entity_name: row.entity_name,
            country_code: row.country_code,
            parent: row.parent_name,
            rank: row.rank,
            stat: row.stat,
            score: row.score,
            trend: row.trend,
            explanation: row.explanation,
            snapshot_at: row.snapshot_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_latest_snapshots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<SnapshotItem>>>, ApiError> {
    let rows = pulse_db::list_latest_snapshots(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| SnapshotItem {
            snapshot_id: row.id,
            category: row.category,
            period: row.period,
            snapshot_at: row.snapshot_at,
            published_at: row.published_at,
            entry_count: row.entry_count,
            signal_count: row.signal_count,
            providers: row.providers,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(category: Option<&str>) -> RankingsQuery {
        RankingsQuery {
            category: category.map(str::to_string),
            period: None,
            entity_type: None,
            country: None,
            parent: None,
            limit: None,
        }
    }

    #[test]
    fn period_defaults_to_today_and_limit_to_ten() {
        let selection = parse_query("req", query(Some("hottest"))).expect("valid");
        assert_eq!(selection.category, RankingCategory::Hottest);
        assert_eq!(selection.period, Period::Today);
        assert_eq!(selection.limit, 10);
        assert_eq!(selection.entity_type, None);
    }

    #[test]
    fn filters_are_normalized() {
        let selection = parse_query(
            "req",
            RankingsQuery {
                category: Some(" Crime ".to_string()),
                period: Some("WEEK".to_string()),
                entity_type: Some("state".to_string()),
                country: Some("us".to_string()),
                parent: Some("  ".to_string()),
                limit: Some(500),
            },
        )
        .expect("valid");

        assert_eq!(selection.category, RankingCategory::Crime);
        assert_eq!(selection.period, Period::Week);
        assert_eq!(selection.entity_type, Some(EntityType::State));
        assert_eq!(selection.country.as_deref(), Some("US"));
        assert_eq!(selection.parent, None);
        assert_eq!(selection.limit, 200);
    }

    #[test]
    fn missing_category_is_bad_request() {
        let err = parse_query("req", query(None)).expect_err("category required");
        assert_eq!(err.error.code, "bad_request");

        let err = parse_query("req", query(Some(""))).expect_err("category required");
        assert_eq!(err.error.code, "bad_request");
    }

    #[test]
    fn malformed_country_is_rejected() {
        let mut q = query(Some("violent"));
        q.country = Some("USA".to_string());
        let err = parse_query("req", q).expect_err("three letters");
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let mut q = query(Some("business"));
        q.entity_type = Some("planet".to_string());
        let err = parse_query("req", q).expect_err("unknown type");
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn ranking_item_serializes_score_as_string() {
        let item = RankingItem {
            category: "hottest".to_string(),
            period: "today".to_string(),
            entity_type: "country".to_string(),
            entity_name: "Kuwait".to_string(),
            country_code: Some("KW".to_string()),
            parent: None,
            rank: 1,
            stat: "54.0°C".to_string(),
            score: Decimal::new(1_008_000, 4),
            trend: "same".to_string(),
            explanation: Some("Peak 54.0°C across 2 reports".to_string()),
            snapshot_at: Utc::now(),
        };

        let json = serde_json::to_value(&item).expect("serialize ranking item");
        assert_eq!(json["entity_name"], "Kuwait");
        assert_eq!(json["score"], "100.8000");
        assert_eq!(json["rank"], 1);
        assert!(json["parent"].is_null());
    }
}
