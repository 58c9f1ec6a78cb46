// region:    --- Imports
use crate::arbiter::PgArbiter;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::database::DatabaseManager;
use crate::handlers::AppState;
use crate::hub::BroadcastHub;
use crate::store::{AuctionLog, PgAuctionLog};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod arbiter;
mod auction;
mod config;
mod coordinator;
mod database;
mod engine;
mod error;
mod gateway;
mod handlers;
mod hub;
mod scheduler;
mod store;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 설정 로드
    let config = Config::from_env();

    // DatabaseManager 생성 및 스키마 초기화
    let db_manager = Arc::new(DatabaseManager::connect(&config.database_url).await?);
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 중재자 연결 및 초기화
    let arbiter = Arc::new(PgArbiter::connect(&config.arbiter_url).await?);
    if let Err(e) = arbiter.initialize().await {
        error!("{:<12} --> 중재자 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 중재자 초기화 성공", "Main");

    // 영속 로그 / 브로드캐스트 허브 / 코디네이터
    let log: Arc<dyn AuctionLog> = Arc::new(PgAuctionLog::new(Arc::clone(&db_manager)));
    let hub = Arc::new(BroadcastHub::new());
    let coordinator = Coordinator::new(arbiter, Arc::clone(&log), Arc::clone(&hub));

    // 비정상 종료 복구 — 활성 경매 재수화
    let recovered = coordinator.recover().await?;
    info!("{:<12} --> 복구된 경매: {}건", "Main", recovered);

    // CORS 설정
    let cors = build_cors(&config.cors_origins);

    // 라우터 설정
    let state = AppState {
        coordinator,
        log,
        hub,
    };
    let routes_all = Router::new()
        .route(
            "/auctions",
            post(handlers::handle_create_auction).get(handlers::handle_list_auctions),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route("/auctions/:id/start", post(handlers::handle_start_auction))
        .route("/auctions/:id/extend", post(handlers::handle_extend_item))
        .route("/ws", get(gateway::handle_ws))
        .layer(cors)
        .with_state(state);

    // 리스너 생성
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}

/// CORS 레이어 구성 — "*" 이면 모든 오리진 허용
fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
// endregion: --- Main
