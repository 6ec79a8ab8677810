//! Ranking API 라우트
//!
//! 스마트 머니 거래 윈도우 기반 토큰 랭킹과 지갑 태그 관리 API를 제공합니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/ranking?timeframe=1h|6h|24h&dimension=count|inflow|outflow&limit=N` - 랭킹 조회
//! - `GET /api/v1/ranking/smart-money` - 태그 지갑 목록
//! - `POST /api/v1/ranking/smart-money` - 지갑 태그 추가/변경
//! - `DELETE /api/v1/ranking/smart-money/{address}` - 지갑 태그 삭제

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::validated;
use crate::error::ApiResponse;
use crate::ranking::{TaggedWallet, DEFAULT_RANK_LIMIT, MAX_RANK_LIMIT};
use crate::state::AppState;
use traderoom_core::{RankDimension, RoomError, RoomResult, Timeframe};

// ================================================================================================
// Request/Response Types
// ================================================================================================

/// 랭킹 조회 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    /// 시간 범위 (기본 1h)
    #[serde(default)]
    pub timeframe: Option<String>,

    /// 정렬 기준 (기본 count)
    #[serde(default)]
    pub dimension: Option<String>,

    /// 반환 개수 (기본 20, 최대 100)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl RankingQuery {
    fn resolve(&self) -> RoomResult<(Timeframe, RankDimension, usize)> {
        let timeframe = match self.timeframe.as_deref() {
            Some(raw) => raw.parse()?,
            None => Timeframe::OneHour,
        };
        let dimension = match self.dimension.as_deref() {
            Some(raw) => raw.parse()?,
            None => RankDimension::default(),
        };
        let limit = match self.limit {
            Some(0) => return Err(RoomError::Validation("limit은 1 이상이어야 합니다".into())),
            Some(limit) => limit.min(MAX_RANK_LIMIT),
            None => DEFAULT_RANK_LIMIT,
        };
        Ok((timeframe, dimension, limit))
    }
}

/// 지갑 태그 추가 요청
#[derive(Debug, Deserialize, Validate)]
pub struct SmartMoneyRequest {
    #[validate(length(min = 1, max = 64, message = "지갑 주소는 1-64자여야 합니다"))]
    pub address: String,
    #[validate(length(min = 1, max = 32, message = "태그는 1-32자여야 합니다"))]
    pub tag: String,
}

// ================================================================================================
// Handlers
// ================================================================================================

/// 랭킹 조회.
///
/// GET /api/v1/ranking
async fn get_ranking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankingQuery>,
) -> Response {
    let (timeframe, dimension, limit) = match query.resolve() {
        Ok(resolved) => resolved,
        Err(e) => return ApiResponse::<()>::fail(e).into_response(),
    };

    let snapshot = state.ranking.rank(timeframe, dimension, limit).await;
    ApiResponse::ok(snapshot).into_response()
}

async fn list_smart_money(State(state): State<Arc<AppState>>) -> Response {
    ApiResponse::ok(state.smart_money.list()).into_response()
}

async fn upsert_smart_money(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SmartMoneyRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let previous = state.smart_money.insert(&request.address, &request.tag);
    info!(
        wallet = %request.address,
        tag = %request.tag,
        replaced = previous.is_some(),
        "Smart money wallet tagged"
    );
    ApiResponse::ok(TaggedWallet {
        address: request.address,
        tag: request.tag,
    })
    .into_response()
}

async fn remove_smart_money(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Response {
    let result = state
        .smart_money
        .remove(&address)
        .map(|tag| TaggedWallet {
            address: address.clone(),
            tag,
        })
        .ok_or_else(|| RoomError::NotFound(format!("태그된 지갑이 아닙니다: {}", address)));
    ApiResponse::from_result(result).into_response()
}

/// 랭킹 라우터 생성.
pub fn ranking_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_ranking))
        .route("/smart-money", get(list_smart_money).post(upsert_smart_money))
        .route("/smart-money/{address}", delete(remove_smart_money))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get as get_json, send};
    use crate::state::create_test_state;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use traderoom_core::{SmartMoneyTransaction, TradeEvent, NATIVE_QUOTE_MINT};

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(create_test_state());
        let app = Router::new()
            .nest("/api/v1/ranking", ranking_router())
            .with_state(state.clone());
        (app, state)
    }

    fn buy(signature: &str, wallet: &str, mint: &str) -> SmartMoneyTransaction {
        let trade = TradeEvent::builder(signature, wallet)
            .input(NATIVE_QUOTE_MINT, dec!(1))
            .output(mint, dec!(100))
            .block_time(chrono::Utc::now())
            .build(NATIVE_QUOTE_MINT);
        SmartMoneyTransaction::new(trade, None)
    }

    #[test]
    fn test_query_defaults_and_cap() {
        let (timeframe, dimension, limit) = RankingQuery::default().resolve().unwrap();
        assert_eq!(timeframe, Timeframe::OneHour);
        assert_eq!(dimension, RankDimension::default());
        assert_eq!(limit, DEFAULT_RANK_LIMIT);

        let capped = RankingQuery {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(capped.resolve().unwrap().2, MAX_RANK_LIMIT);

        let zero = RankingQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert!(zero.resolve().is_err());
    }

    #[tokio::test]
    async fn test_ranking_endpoint_orders_by_count() {
        let (app, state) = app();
        state.ranking.ingest(buy("s1", "w1", "MintB")).await;
        state.ranking.ingest(buy("s2", "w2", "MintB")).await;
        state.ranking.ingest(buy("s3", "w3", "MintA")).await;

        let json = get_json(&app, "/api/v1/ranking?timeframe=1h&dimension=count&limit=5").await;
        assert_eq!(json["success"], true);
        let rankings = json["data"]["rankings"].as_array().unwrap();
        assert_eq!(rankings[0]["tokenMint"], "MintB");
        assert_eq!(rankings[0]["rank"], 1);
        assert_eq!(rankings[1]["tokenMint"], "MintA");

        let bad = get_json(&app, "/api/v1/ranking?timeframe=7d").await;
        assert_eq!(bad["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_smart_money_crud() {
        let (app, state) = app();

        let added = send(
            &app,
            "POST",
            "/api/v1/ranking/smart-money",
            json!({"address": "whale1", "tag": "whale"}),
        )
        .await;
        assert_eq!(added["success"], true);
        assert_eq!(state.smart_money.tag("whale1").as_deref(), Some("whale"));

        let listed = get_json(&app, "/api/v1/ranking/smart-money").await;
        assert_eq!(listed["data"][0]["address"], "whale1");

        let removed = send(&app, "DELETE", "/api/v1/ranking/smart-money/whale1", json!({})).await;
        assert_eq!(removed["data"]["tag"], "whale");
        let missing = send(&app, "DELETE", "/api/v1/ranking/smart-money/whale1", json!({})).await;
        assert_eq!(missing["code"], "NOT_FOUND");
    }
}
