//! Rate limiting middleware.
//!
//! 클라이언트별 Token Bucket 기반 rate limiting을 제공합니다.
//! 버킷은 리필 간격마다 용량까지 한 번에 채워집니다.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use traderoom_core::RateLimitSettings;

/// Rate Limiter 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 리필 간격당 허용 요청 수 (버킷 용량)
    pub capacity: u32,
    /// 리필 간격
    pub refill_interval: Duration,
    /// 이 시간 동안 요청이 없는 버킷은 sweep 시 제거
    pub idle_eviction: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 120,
            refill_interval: Duration::from_secs(60),
            idle_eviction: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    /// 새 설정 생성.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
            ..Default::default()
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_interval: Duration::from_secs(settings.refill_interval_secs),
            idle_eviction: Duration::from_secs(settings.idle_eviction_secs),
        }
    }
}

/// Token Bucket 구조체.
#[derive(Debug)]
struct TokenBucket {
    /// 현재 토큰 수
    tokens: u32,
    /// 마지막 리필 시각
    last_refill: Instant,
    /// 마지막 요청 시각 (idle 판정용)
    last_seen: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// 토큰 소비 시도.
    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        self.last_seen = now;

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// 리필 간격이 지났으면 용량까지 채웁니다.
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        if now.saturating_duration_since(self.last_refill) >= config.refill_interval {
            self.tokens = config.capacity;
            self.last_refill = now;
        }
    }

    /// 다음 리필까지 대기 시간 (초, 올림).
    fn retry_after_secs(&self, config: &RateLimitConfig, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let remaining = config.refill_interval.saturating_sub(elapsed);
        remaining.as_secs_f64().ceil().max(1.0) as u64
    }
}

/// Rate Limiter.
///
/// 클라이언트 키별로 독립된 버킷을 유지합니다. 키 단위 샤드 잠금만 사용하므로
/// 서로 다른 클라이언트의 요청은 서로를 막지 않습니다.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<DashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// 새 Rate Limiter 생성.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// 요청 허용 여부 확인.
    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    /// 지정 시각 기준으로 요청 허용 여부를 확인합니다.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.capacity, now));

        if bucket.try_acquire(&self.config, now) {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::Limited {
                retry_after: bucket.retry_after_secs(&self.config, now),
            }
        }
    }

    /// idle 시간을 넘긴 버킷 정리. 제거된 버킷 수를 반환합니다.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let idle = self.config.idle_eviction;
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < idle);
        before.saturating_sub(self.buckets.len())
    }

    /// 현재 추적 중인 클라이언트 수 반환.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

/// Rate Limit 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// 요청 허용됨
    Allowed,
    /// Rate limit 초과
    Limited {
        /// 재시도까지 대기 시간 (초)
        retry_after: u64,
    },
}

/// Rate Limit 미들웨어 상태.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
    enabled: bool,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
            enabled: true,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            limiter: RateLimiter::new(RateLimitConfig::from(settings)),
            enabled: settings.enabled,
        }
    }

    /// 내부 limiter (sweep 작업용).
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Rate Limiting 미들웨어 함수.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let key = extract_client_key(&request);

    match state.limiter.check(&key) {
        RateLimitResult::Allowed => {
            counter!("rate_limit_requests_total", "status" => "allowed").increment(1);
            next.run(request).await
        }
        RateLimitResult::Limited { retry_after } => {
            counter!("rate_limit_requests_total", "status" => "limited").increment(1);

            tracing::warn!(client = %key, retry_after = retry_after, "Rate limit exceeded");

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(serde_json::json!({
                    "success": false,
                    "message": "Rate limit exceeded. Please try again later.",
                    "code": "RATE_LIMITED",
                    "retry_after": retry_after
                })),
            )
                .into_response();

            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after),
            );

            response
        }
    }
}

/// 요청에서 클라이언트 키 추출.
///
/// X-Forwarded-For 첫 번째 hop, X-Real-IP, 연결 peer 주소 순으로 확인합니다.
fn extract_client_key(request: &Request) -> String {
    if let Some(value) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = value.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(value) = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
    {
        let value = value.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
