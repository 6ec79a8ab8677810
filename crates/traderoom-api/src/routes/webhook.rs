//! 프로바이더 웹훅 수신 라우트
//!
//! - `POST /api/v1/webhook` - 매칭 트랜잭션 배치 수신. 처리 결과와 관계없이 항상 성공으로 응답합니다.
//! - `GET /api/v1/webhook?challenge=...` - 엔드포인트 검증용 challenge 반환
//!
//! 실제 처리는 수집 큐를 거쳐 워커에서 수행합니다. 큐가 가득 차면 배치는 버려지고
//! 백프레셔 메트릭만 남습니다.

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiResponse;
use crate::ingest::{IngestJob, WebhookBatch};
use crate::state::AppState;

/// 웹훅 응답 데이터
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    /// 수집 큐에 들어갔는지 여부
    pub queued: bool,
    /// 배치 내 레코드 수
    pub records: usize,
}

/// challenge 쿼리
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    #[serde(default)]
    pub challenge: Option<String>,
}

/// 배치 수신.
///
/// 본문을 직접 파싱하여 형식이 잘못된 요청도 성공으로 응답합니다.
async fn receive_batch(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let batch: WebhookBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Unparsable webhook body acknowledged");
            return ApiResponse::ok(WebhookAck {
                queued: false,
                records: 0,
            })
            .into_response();
        }
    };

    let records = batch.matched_transactions.len();
    let queued = records > 0 && state.ingest.submit(IngestJob::Webhook(batch));
    debug!(records, queued, "Webhook batch acknowledged");

    ApiResponse::ok(WebhookAck { queued, records }).into_response()
}

/// 엔드포인트 검증.
async fn verify(Query(query): Query<ChallengeQuery>) -> String {
    query.challenge.unwrap_or_default()
}

/// 웹훅 라우터 생성.
pub fn webhook_router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(receive_batch).get(verify))
}
