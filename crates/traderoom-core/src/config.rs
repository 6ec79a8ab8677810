//! 설정 관리.
//!
//! 기본값 → TOML 파일(선택) → 환경 변수 순서로 설정을 병합합니다.
//! 환경 변수는 `TRADEROOM` 접두사와 `__` 구분자를 사용합니다
//! (예: `TRADEROOM__SERVER__PORT=8080`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RoomError, RoomResult};

/// 네이티브 SOL (wrapped SOL) 민트 주소.
pub const NATIVE_QUOTE_MINT: &str = "So11111111111111111111111111111111111111112";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// Rate limit 설정
    pub rate_limit: RateLimitSettings,
    /// WebSocket 설정
    pub websocket: WebSocketConfig,
    /// 트랜잭션 수집 설정
    pub ingest: IngestConfig,
    /// 노드 프로바이더 설정
    pub provider: ProviderConfig,
    /// 룸 설정
    pub rooms: RoomsConfig,
    /// 스마트 머니 지갑 목록
    pub smart_money: SmartMoneyConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 30,
        }
    }
}

/// Rate limit 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 활성화 여부
    pub enabled: bool,
    /// 버킷 용량 (리필 간격당 허용 요청 수)
    pub capacity: u32,
    /// 버킷이 완전히 리필되는 간격 (초)
    pub refill_interval_secs: u64,
    /// 이 시간 동안 사용되지 않은 버킷은 제거 (초)
    pub idle_eviction_secs: u64,
    /// 버킷 정리 주기 (초)
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 120,
            refill_interval_secs: 60,
            idle_eviction_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

/// WebSocket 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// 연결별 송신 버퍼 크기
    pub outbound_buffer: usize,
    /// 소켓 쓰기 타임아웃 (밀리초)
    pub write_timeout_ms: u64,
    /// 마지막 ping 이후 허용되는 최대 유휴 시간 (초)
    pub max_idle_secs: u64,
    /// 유휴 연결 정리 주기 (초)
    pub prune_interval_secs: u64,
    /// 수신자가 없는 룸 브로드캐스트를 에러로 처리할지 여부
    pub require_recipients: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            write_timeout_ms: 5000,
            max_idle_secs: 120,
            prune_interval_secs: 30,
            require_recipients: false,
        }
    }
}

impl WebSocketConfig {
    /// 쓰기 타임아웃을 Duration으로 반환
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// 최대 유휴 시간을 Duration으로 반환
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

/// 트랜잭션 수집 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 작업 큐 용량 (초과 시 드롭)
    pub queue_capacity: usize,
    /// 시그니처 중복 제거 보존 기간 (초)
    pub dedup_retention_secs: u64,
    /// 중복 제거 테이블 정리 주기 (초)
    pub dedup_sweep_secs: u64,
    /// 동시에 진행할 수 있는 로그 알림 보강(트랜잭션 조회) 수
    pub enrich_concurrency: usize,
    /// 견적 자산(네이티브) 민트
    pub quote_mint: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            dedup_retention_secs: 3600,
            dedup_sweep_secs: 60,
            enrich_concurrency: 16,
            quote_mint: NATIVE_QUOTE_MINT.to_string(),
        }
    }
}

impl IngestConfig {
    /// 중복 제거 보존 기간을 Duration으로 반환
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }
}

/// 노드 프로바이더 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 로그 구독용 WebSocket URL (없으면 구독 비활성화)
    pub ws_url: Option<String>,
    /// 트랜잭션 조회용 JSON-RPC URL
    pub rpc_url: Option<String>,
    /// 커밋먼트 레벨
    pub commitment: String,
    /// 구독 알림 인코딩
    pub encoding: String,
    /// 요청 타임아웃 (밀리초)
    pub request_timeout_ms: u64,
    /// 재시도 기본 대기 시간 (밀리초)
    pub retry_base_ms: u64,
    /// 재시도 최대 대기 시간 (밀리초)
    pub retry_max_ms: u64,
    /// 재시도 워커 실행 주기 (초)
    pub retry_interval_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            rpc_url: None,
            commitment: "confirmed".to_string(),
            encoding: "jsonParsed".to_string(),
            request_timeout_ms: 10_000,
            retry_base_ms: 1_000,
            retry_max_ms: 60_000,
            retry_interval_secs: 5,
        }
    }
}

impl ProviderConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 룸 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// 기본 재활용 시간 (시간)
    pub default_recycle_hours: i64,
    /// 리퍼 실행 주기 (초)
    pub reaper_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_recycle_hours: 24,
            reaper_interval_secs: 60,
        }
    }
}

/// 스마트 머니 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SmartMoneyConfig {
    /// 추적 지갑 목록
    pub wallets: Vec<SmartMoneyWallet>,
}

/// 스마트 머니 지갑 항목.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmartMoneyWallet {
    /// 지갑 주소
    pub address: String,
    /// 지갑 태그 (예: "whale", "kol")
    pub tag: String,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> RoomResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("TRADEROOM")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    ///
    /// `TRADEROOM_CONFIG` 환경 변수가 있으면 해당 경로를 사용합니다.
    pub fn load_default() -> RoomResult<Self> {
        let path = std::env::var("TRADEROOM_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load(path)
    }

    /// 설정 값 검증.
    pub fn validate(&self) -> RoomResult<()> {
        let checks: [(&str, u64); 9] = [
            ("rate_limit.capacity", self.rate_limit.capacity as u64),
            ("rate_limit.refill_interval_secs", self.rate_limit.refill_interval_secs),
            ("websocket.outbound_buffer", self.websocket.outbound_buffer as u64),
            ("websocket.write_timeout_ms", self.websocket.write_timeout_ms),
            ("ingest.queue_capacity", self.ingest.queue_capacity as u64),
            ("ingest.dedup_retention_secs", self.ingest.dedup_retention_secs),
            ("ingest.enrich_concurrency", self.ingest.enrich_concurrency as u64),
            ("rooms.reaper_interval_secs", self.rooms.reaper_interval_secs),
            ("provider.retry_base_ms", self.provider.retry_base_ms),
        ];

        for (key, value) in checks {
            if value == 0 {
                return Err(RoomError::Validation(format!(
                    "{}는 0보다 커야 합니다",
                    key
                )));
            }
        }

        if self.rooms.default_recycle_hours <= 0 {
            return Err(RoomError::Validation(
                "rooms.default_recycle_hours는 0보다 커야 합니다".to_string(),
            ));
        }

        Ok(())
    }
}
