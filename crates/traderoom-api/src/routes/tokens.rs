//! 토큰 메타데이터 라우트
//!
//! - `GET /api/v1/tokens/resolve?symbol=BONK` - 심볼 → 단일 토큰 (시가총액 우선)
//! - `GET /api/v1/tokens/{mint}` - 민트 주소로 조회
//! - `POST /api/v1/tokens` - 메타데이터 등록/갱신

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use super::validated;
use crate::error::ApiResponse;
use crate::state::AppState;
use traderoom_core::{resolve_symbol, RoomError, RoomResult, TokenInfo};

/// 심볼 해석 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    #[serde(default)]
    pub symbol: String,
}

/// 토큰 등록 요청
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTokenRequest {
    #[validate(length(min = 1, max = 64, message = "민트 주소는 1-64자여야 합니다"))]
    pub mint_address: String,
    #[validate(length(min = 1, max = 32, message = "심볼은 1-32자여야 합니다"))]
    pub symbol: String,
    #[serde(default)]
    #[validate(length(max = 128, message = "이름은 최대 128자입니다"))]
    pub name: String,
    #[serde(default)]
    #[validate(range(max = 18, message = "decimals는 18 이하여야 합니다"))]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
}

async fn resolve(State(state): State<Arc<AppState>>, Query(query): Query<ResolveQuery>) -> Response {
    ApiResponse::from_result(resolve_token(&state, query.symbol.trim()).await).into_response()
}

/// 같은 심볼의 후보 중 시가총액 우선으로 하나를 선택합니다.
async fn resolve_token(state: &AppState, symbol: &str) -> RoomResult<TokenInfo> {
    if symbol.is_empty() {
        return Err(RoomError::Validation("symbol 파라미터가 필요합니다".into()));
    }
    let candidates = state.tokens.find_by_symbol(symbol).await?;
    resolve_symbol(&candidates)
        .cloned()
        .ok_or_else(|| RoomError::NotFound(format!("심볼에 해당하는 토큰이 없습니다: {}", symbol)))
}

async fn get_token(State(state): State<Arc<AppState>>, Path(mint): Path<String>) -> Response {
    let result = state
        .tokens
        .find_by_mint_address(&mint)
        .await
        .and_then(|token| {
            token.ok_or_else(|| RoomError::NotFound(format!("토큰을 찾을 수 없습니다: {}", mint)))
        });
    ApiResponse::from_result(result).into_response()
}

async fn upsert_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UpsertTokenRequest>, JsonRejection>,
) -> Response {
    let request = match validated(body) {
        Ok(request) => request,
        Err(response) => return response.into_response(),
    };

    let mut token = TokenInfo::new(request.mint_address, request.symbol, request.name);
    token.decimals = request.decimals;
    token.market_cap = request.market_cap;

    let result = state.tokens.upsert(&token).await.map(|_| token);
    ApiResponse::from_result(result).into_response()
}

/// 토큰 라우터 생성.
pub fn tokens_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(upsert_token))
        .route("/resolve", get(resolve))
        .route("/{mint}", get(get_token))
}
