// region:    --- Imports
use crate::auction::ItemDraft;
use crate::coordinator::Coordinator;
use crate::hub::BroadcastHub;
use crate::store::AuctionLog;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- App State

/// 라우터 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub log: Arc<dyn AuctionLog>,
    pub hub: Arc<BroadcastHub>,
}

// endregion: --- App State

// region:    --- Requests

fn default_max_duration_sec() -> i64 {
    3600
}

/// 경매 생성 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub seller_id: Uuid,
    #[serde(default = "default_max_duration_sec")]
    pub max_duration_sec: i64,
    pub items: Vec<ItemDraft>,
}

/// 품목 연장 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    pub seller_id: Uuid,
}

// endregion: --- Requests

// region:    --- Command Handlers

/// 경매 생성
pub async fn handle_create_auction(
    State(state): State<AppState>,
    Json(req): Json<CreateAuctionRequest>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 경매 생성 요청: seller={} items={}",
        "HandlerCmd",
        req.seller_id,
        req.items.len()
    );
    match state
        .coordinator
        .create_auction(req.seller_id, req.max_duration_sec, req.items)
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 시작
pub async fn handle_start_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 시작 요청: id={}", "HandlerCmd", auction_id);
    match state.coordinator.start_auction(auction_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 품목 연장
pub async fn handle_extend_item(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
    Json(req): Json<ExtendRequest>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 품목 연장 요청: id={} seller={}",
        "HandlerCmd", auction_id, req.seller_id
    );
    match state
        .coordinator
        .extend_item(auction_id, req.seller_id)
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 목록 조회
pub async fn handle_list_auctions(State(state): State<AppState>) -> impl IntoResponse {
    info!("{:<12} --> 경매 목록 조회", "HandlerQuery");
    match state.log.load_summaries().await {
        Ok(listings) => Json(listings).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 경매 상태 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 상태 조회: id={}", "HandlerQuery", auction_id);
    match state.coordinator.get_state(auction_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Query Handlers
