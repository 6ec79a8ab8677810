//! 트레이드 룸 API 서버.
//!
//! Axum 기반 REST API와 룸 WebSocket 서버를 시작합니다.
//! 프로바이더 로그 구독, 수집 워커, 정리 작업을 함께 실행합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use traderoom_api::ingest::{RpcTransactionFetcher, TransactionFetcher};
use traderoom_api::metrics::setup_metrics_recorder;
use traderoom_api::middleware::{metrics_layer, rate_limit_middleware};
use traderoom_api::routes::{create_api_router, health_router};
use traderoom_api::state::AppState;
use traderoom_api::subscription::{LogsSubscriptionClient, NoopProvider, SubscriptionProvider};
use traderoom_api::tasks::spawn_background_tasks;
use traderoom_api::websocket::websocket_router;
use traderoom_core::{init_logging, AppConfig, LogConfig};

/// CORS 레이어 생성.
///
/// `CORS_ORIGINS` 환경 변수(쉼표 구분)가 있으면 해당 origin만 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            // 개발: 모든 origin 허용
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
        .allow_credentials(std::env::var("CORS_ORIGINS").is_ok())
        .max_age(Duration::from_secs(3600))
}

/// Prometheus 메트릭 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    // 메트릭 라우터 (별도 상태, Rate Limit 제외)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    // 헬스 체크 (Rate Limit 제외)
    let health = Router::new()
        .nest("/health", health_router())
        .with_state(state.clone());

    // API + WebSocket 라우터 (비활성화 여부는 RateLimitState가 판단)
    let api_router = create_api_router()
        .nest("/ws", websocket_router())
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(metrics_router)
        .merge(health)
        .merge(api_router)
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors_layer())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default()?;

    init_logging(LogConfig::from(&config.logging))?;
    info!("Starting TradeRoom API server...");

    let metrics_handle = setup_metrics_recorder();
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "소켓 주소 설정이 유효하지 않습니다. server.host, server.port를 확인하세요."
            );
            e
        })?;

    // 전역 종료 토큰 (graceful shutdown용)
    let shutdown_token = CancellationToken::new();

    // 로그 구독 프로바이더 (ws_url 미설정 시 구독 없이 웹훅만 사용)
    let (provider, connection) = match config.provider.ws_url.clone() {
        Some(ws_url) => {
            let (client, connection) = LogsSubscriptionClient::new(&config.provider, ws_url);
            (client as Arc<dyn SubscriptionProvider>, Some(connection))
        }
        None => {
            warn!("provider.ws_url not set, address watches will not reach a provider");
            (Arc::new(NoopProvider::new()) as Arc<dyn SubscriptionProvider>, None)
        }
    };

    // 로그 알림 보강용 트랜잭션 조회
    let fetcher: Option<Arc<dyn TransactionFetcher>> = match config.provider.rpc_url.clone() {
        Some(rpc_url) => Some(Arc::new(RpcTransactionFetcher::new(&config.provider, rpc_url)?)),
        None => None,
    };

    let (state, worker) = AppState::build(config, provider, fetcher);
    let state = Arc::new(state.with_metrics(metrics_handle.clone()));

    info!(
        version = %state.version,
        has_provider = connection.is_some(),
        smart_money_wallets = state.smart_money.list().len(),
        ingest_capacity = state.ingest.capacity(),
        "Application state initialized"
    );

    if let Some(connection) = connection {
        tokio::spawn(connection.run(
            state.ingest.clone(),
            state.subscriptions.clone(),
            shutdown_token.clone(),
        ));
    }

    let ingest_task = tokio::spawn(worker.pipeline.run(worker.queue, shutdown_token.clone()));
    let background = spawn_background_tasks(state.clone(), shutdown_token.clone());

    let app = create_router(state, metrics_handle);

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws/rooms/{{room_id}}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        background.join().await;
        if let Err(e) = ingest_task.await {
            error!(error = %e, "Ingest worker panicked");
        }
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // 모든 백그라운드 태스크에 종료 시그널 전파
    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
