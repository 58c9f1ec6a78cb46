// region:    --- Imports
use super::{AuctionView, ItemOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Server Events

/// 브로드캐스트 허브로 전파되는 서버 이벤트
/// 한 경매의 이벤트는 코디네이터의 변이 순서대로 발행된다
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    // 모든 변이 이후의 전체 경매 상태
    AuctionState(AuctionView),
    // 품목 종료 (낙찰 또는 유찰)
    ItemSold(ItemSoldPayload),
    // 경매 종료
    AuctionEnded(AuctionEndedPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSoldPayload {
    pub item_id: Uuid,
    pub winner_id: Option<Uuid>,
    pub final_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEndedPayload {
    pub auction_id: Uuid,
    pub results: Vec<ItemOutcome>,
}

// endregion: --- Server Events
