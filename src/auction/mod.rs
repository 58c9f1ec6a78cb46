/// 경매 도메인 모델
/// 1. 상태 열거형 (경매 / 품목)
/// 2. 엔진이 소유하는 상태 값 타입
/// 3. 프로토콜 경계용 뷰와 입찰 결과
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod events;
// endregion: --- Imports

// region:    --- Status

/// 경매 상태 — CREATED → LIVE → ENDED 단조 전이
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Created,
    Live,
    Ended,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Created => "CREATED",
            AuctionStatus::Live => "LIVE",
            AuctionStatus::Ended => "ENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(AuctionStatus::Created),
            "LIVE" => Some(AuctionStatus::Live),
            "ENDED" => Some(AuctionStatus::Ended),
            _ => None,
        }
    }
}

/// 품목 상태 — PENDING → LIVE → SOLD | UNSOLD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Live,
    Sold,
    Unsold,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Live => "LIVE",
            ItemStatus::Sold => "SOLD",
            ItemStatus::Unsold => "UNSOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ItemStatus::Pending),
            "LIVE" => Some(ItemStatus::Live),
            "SOLD" => Some(ItemStatus::Sold),
            "UNSOLD" => Some(ItemStatus::Unsold),
            _ => None,
        }
    }
}

// endregion: --- Status

// region:    --- Drafts & Specs

fn default_duration_sec() -> i64 {
    60
}

fn default_extra_duration_sec() -> i64 {
    30
}

/// 경매 생성 요청에 실려 오는 품목 초안
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub name: String,
    pub starting_price: i64,
    #[serde(default = "default_duration_sec")]
    pub duration_sec: i64,
    #[serde(default = "default_extra_duration_sec")]
    pub extra_duration_sec: i64,
}

/// 식별자가 배정된 품목 명세 — 코디네이터가 초안으로부터 만든다
#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub item_id: Uuid,
    pub item_order: i32,
    pub name: String,
    pub starting_price: i64,
    pub duration_sec: i64,
    pub extra_duration_sec: i64,
}

// endregion: --- Drafts & Specs

// region:    --- Engine State

/// 품목 상태 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub item_id: Uuid,
    pub item_order: i32,
    pub name: String,
    pub starting_price: i64,
    pub duration_sec: i64,
    pub extra_duration_sec: i64,
    pub status: ItemStatus,
    pub highest_bid: i64,
    pub highest_bidder_id: Option<Uuid>,
    pub extended: bool,
    pub sold_at: Option<DateTime<Utc>>,
    /// 절대 만료 시각 — 영속 계층이 기록하고 복구 때만 읽는다
    pub ends_at: Option<DateTime<Utc>>,
}

/// 경매 전체 상태 값 — 엔진의 스냅샷이자 영속 로그의 복원 단위
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionState {
    pub auction_id: Uuid,
    pub seller_id: Uuid,
    pub status: AuctionStatus,
    pub current_item_index: usize,
    pub max_duration_sec: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemState>,
}

// endregion: --- Engine State

// region:    --- Outcomes

/// 품목 종료 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemClose {
    pub item_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub final_price: i64,
    pub had_bids: bool,
}

/// 품목별 최종 결과 — 경매 종료 요약에 실린다
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub final_price: i64,
}

/// 경매 종료 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionSummary {
    pub auction_id: Uuid,
    pub results: Vec<ItemOutcome>,
}

/// 입찰 결과 — 프로토콜 경계를 넘을 때는 항상 값으로 전달된다
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidResult {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BidResult {
    pub fn accept() -> Self {
        BidResult {
            accepted: true,
            reason: None,
        }
    }

    pub fn reject(code: impl Into<String>) -> Self {
        BidResult {
            accepted: false,
            reason: Some(code.into()),
        }
    }
}

// endregion: --- Outcomes

// region:    --- Views

/// 클라이언트로 내려가는 품목 뷰
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item_id: Uuid,
    pub item_order: i32,
    pub name: String,
    pub starting_price: i64,
    pub duration_sec: i64,
    pub extra_duration_sec: i64,
    pub status: ItemStatus,
    pub highest_bid: i64,
    pub highest_bidder_id: Option<Uuid>,
    pub extended: bool,
    pub sold_at: Option<DateTime<Utc>>,
}

/// 클라이언트로 내려가는 경매 전체 뷰
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionView {
    pub auction_id: Uuid,
    pub seller_id: Uuid,
    pub status: AuctionStatus,
    pub current_item_index: usize,
    /// 품목 타이머가 장전된 경우의 절대 만료 시각 (epoch ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_end_time: Option<i64>,
    pub items: Vec<ItemView>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AuctionView {
    pub fn from_state(state: &AuctionState, item_end_time: Option<i64>) -> Self {
        AuctionView {
            auction_id: state.auction_id,
            seller_id: state.seller_id,
            status: state.status,
            current_item_index: state.current_item_index,
            item_end_time,
            items: state
                .items
                .iter()
                .map(|item| ItemView {
                    item_id: item.item_id,
                    item_order: item.item_order,
                    name: item.name.clone(),
                    starting_price: item.starting_price,
                    duration_sec: item.duration_sec,
                    extra_duration_sec: item.extra_duration_sec,
                    status: item.status,
                    highest_bid: item.highest_bid,
                    highest_bidder_id: item.highest_bidder_id,
                    extended: item.extended,
                    sold_at: item.sold_at,
                })
                .collect(),
            created_at: state.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }
}

/// 경매 목록 요약 행
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuctionListing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub status: String,
    pub seller_name: String,
    pub first_item_name: Option<String>,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Views
