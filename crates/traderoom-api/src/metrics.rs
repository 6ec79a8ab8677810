//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭, 룸/수집 파이프라인 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # 패닉
///
/// 레코더가 이미 설치되어 있으면 패닉합니다.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("히스토그램 버킷 설정 실패")
        .install_recorder()
        .expect("Prometheus 레코더 설치 실패")
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 도메인 메트릭 헬퍼 함수
// ============================================================================

/// 수집 레코드 처리 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Broadcast,
    Duplicate,
    ParseError,
    DroppedBackpressure,
}

impl IngestOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            IngestOutcome::Broadcast => "broadcast",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::ParseError => "parse_error",
            IngestOutcome::DroppedBackpressure => "dropped_backpressure",
        }
    }
}

/// 수집 레코드 카운터 증가.
pub fn record_ingest(outcome: IngestOutcome) {
    counter!("ingest_records_total", "outcome" => outcome.as_label()).increment(1);
}

/// 브로드캐스트 전달 실패 카운터 증가.
pub fn record_delivery_failure() {
    counter!("broadcast_delivery_failures_total").increment(1);
}

/// 활성 프로바이더 구독 수 설정.
pub fn set_provider_subscriptions(count: usize) {
    gauge!("provider_subscriptions_active").set(count as f64);
}

/// 프로바이더 구독 실패 카운터 증가.
pub fn record_subscribe_failure() {
    counter!("provider_subscribe_failures_total").increment(1);
}

/// 리퍼가 종료한 룸 수 기록.
pub fn record_rooms_reaped(count: usize) {
    counter!("rooms_reaped_total").increment(count as u64);
}

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("websocket_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("websocket_connections_active").decrement(1.0);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/v1/rooms/123e4567-e89b-12d3-a456-426614174000/join` → `/api/v1/rooms/:id/join`
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized: Vec<String> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let is_uuid = segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
        let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
        // 룸 ID는 불투명 문자열이므로 `rooms` 바로 뒤 세그먼트는 항상 치환
        let follows_rooms = i > 0 && segments[i - 1] == "rooms" && !segment.is_empty();

        if is_uuid || is_numeric || follows_rooms {
            normalized.push(":id".to_string());
        } else {
            normalized.push((*segment).to_string());
        }
    }
    normalized.join("/")
}
