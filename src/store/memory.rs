/// 인메모리 영속 로그 — 테스트와 로컬 개발용
/// 트레이트 의미는 Postgres 구현과 동일하게 유지한다
// region:    --- Imports
use super::{AuctionLog, AuctionStatusPatch, ItemStatusPatch, LogError};
use crate::auction::{
    AuctionListing, AuctionState, AuctionStatus, ItemOutcome, ItemStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Rows

/// 영속된 입찰 행
#[derive(Debug, Clone)]
pub struct BidRow {
    pub bid_id: Uuid,
    pub auction_id: Uuid,
    pub item_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// 낙찰 결과 행
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub item_id: Uuid,
    pub winner_id: Uuid,
    pub final_price: i64,
    pub sold_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    auctions: HashMap<Uuid, AuctionState>,
    bids: Vec<BidRow>,
    results: HashMap<Uuid, ResultRow>,
    users: HashMap<Uuid, String>,
}

// endregion: --- Rows

// region:    --- Memory Auction Log

#[derive(Default)]
pub struct MemoryAuctionLog {
    inner: RwLock<MemoryState>,
}

impl MemoryAuctionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 품목의 영속된 입찰 행 (시간순)
    pub async fn bids_for(&self, item_id: Uuid) -> Vec<BidRow> {
        self.inner
            .read()
            .await
            .bids
            .iter()
            .filter(|bid| bid.item_id == item_id)
            .cloned()
            .collect()
    }

    /// 낙찰 결과 행 수
    pub async fn result_count(&self) -> usize {
        self.inner.read().await.results.len()
    }

    /// 품목의 낙찰 결과
    pub async fn result_for(&self, item_id: Uuid) -> Option<ResultRow> {
        self.inner.read().await.results.get(&item_id).cloned()
    }

    /// 영속된 경매 상태
    pub async fn auction_state(&self, auction_id: Uuid) -> Option<AuctionState> {
        self.inner.read().await.auctions.get(&auction_id).cloned()
    }
}

#[async_trait]
impl AuctionLog for MemoryAuctionLog {
    async fn append_auction(&self, state: &AuctionState) -> Result<(), LogError> {
        self.inner
            .write()
            .await
            .auctions
            .insert(state.auction_id, state.clone());
        Ok(())
    }

    async fn set_auction_status(
        &self,
        auction_id: Uuid,
        status: AuctionStatus,
        patch: AuctionStatusPatch,
    ) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        if let Some(auction) = inner.auctions.get_mut(&auction_id) {
            auction.status = status;
            if let Some(started_at) = patch.started_at {
                auction.started_at = Some(started_at);
            }
            if let Some(ended_at) = patch.ended_at {
                auction.ended_at = Some(ended_at);
            }
            if let Some(index) = patch.current_item_index {
                auction.current_item_index = index as usize;
            }
        }
        Ok(())
    }

    async fn set_item_status(
        &self,
        item_id: Uuid,
        status: ItemStatus,
        patch: ItemStatusPatch,
    ) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        for auction in inner.auctions.values_mut() {
            if let Some(item) = auction.items.iter_mut().find(|i| i.item_id == item_id) {
                item.status = status;
                if let Some(highest_bid) = patch.highest_bid {
                    item.highest_bid = highest_bid;
                }
                if let Some(bidder) = patch.highest_bidder_id {
                    item.highest_bidder_id = Some(bidder);
                }
                if let Some(extended) = patch.extended {
                    item.extended = extended;
                }
                if let Some(sold_at) = patch.sold_at {
                    item.sold_at = Some(sold_at);
                }
                if let Some(ends_at) = patch.ends_at {
                    item.ends_at = Some(ends_at);
                }
                break;
            }
        }
        Ok(())
    }

    async fn append_bid(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        inner.bids.push(BidRow {
            bid_id: Uuid::new_v4(),
            auction_id,
            item_id,
            bidder_id,
            amount,
            created_at,
        });
        if let Some(auction) = inner.auctions.get_mut(&auction_id) {
            if let Some(item) = auction.items.iter_mut().find(|i| i.item_id == item_id) {
                item.highest_bid = amount;
                item.highest_bidder_id = Some(bidder_id);
            }
        }
        Ok(())
    }

    async fn finalize_item(
        &self,
        item_id: Uuid,
        winner_id: Option<Uuid>,
        final_price: i64,
        sold_at: DateTime<Utc>,
    ) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        for auction in inner.auctions.values_mut() {
            if let Some(item) = auction.items.iter_mut().find(|i| i.item_id == item_id) {
                if winner_id.is_some() {
                    item.status = ItemStatus::Sold;
                    item.sold_at = Some(sold_at);
                } else {
                    item.status = ItemStatus::Unsold;
                }
                break;
            }
        }
        if let Some(winner_id) = winner_id {
            inner.results.entry(item_id).or_insert(ResultRow {
                item_id,
                winner_id,
                final_price,
                sold_at,
            });
        }
        Ok(())
    }

    async fn finalize_auction(
        &self,
        auction_id: Uuid,
        ended_at: DateTime<Utc>,
        results: &[ItemOutcome],
    ) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        if let Some(auction) = inner.auctions.get_mut(&auction_id) {
            auction.status = AuctionStatus::Ended;
            auction.ended_at = Some(ended_at);
        }
        for result in results {
            if let Some(winner_id) = result.winner_id {
                inner.results.entry(result.item_id).or_insert(ResultRow {
                    item_id: result.item_id,
                    winner_id,
                    final_price: result.final_price,
                    sold_at: ended_at,
                });
            }
        }
        Ok(())
    }

    async fn load_active(&self) -> Result<Vec<AuctionState>, LogError> {
        let inner = self.inner.read().await;
        let mut states: Vec<AuctionState> = inner
            .auctions
            .values()
            .filter(|a| a.status != AuctionStatus::Ended)
            .cloned()
            .collect();
        states.sort_by_key(|a| a.created_at);
        Ok(states)
    }

    async fn load_one(&self, auction_id: Uuid) -> Result<Option<AuctionState>, LogError> {
        Ok(self.inner.read().await.auctions.get(&auction_id).cloned())
    }

    async fn load_summaries(&self) -> Result<Vec<AuctionListing>, LogError> {
        let inner = self.inner.read().await;
        let mut listings: Vec<AuctionListing> = inner
            .auctions
            .values()
            .map(|auction| AuctionListing {
                id: auction.auction_id,
                seller_id: auction.seller_id,
                status: auction.status.as_str().to_string(),
                seller_name: inner
                    .users
                    .get(&auction.seller_id)
                    .cloned()
                    .unwrap_or_default(),
                first_item_name: auction.items.first().map(|i| i.name.clone()),
                item_count: auction.items.len() as i64,
                created_at: auction.created_at,
            })
            .collect();
        listings.sort_by_key(|l| std::cmp::Reverse(l.created_at));
        Ok(listings)
    }

    async fn upsert_user(&self, user_id: Uuid, display_name: &str) -> Result<(), LogError> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .users
            .iter()
            .any(|(id, name)| *id != user_id && name == display_name);
        if taken {
            return Err(LogError::DuplicateDisplayName(display_name.to_string()));
        }
        inner.users.insert(user_id, display_name.to_string());
        Ok(())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError> {
        Ok(self.inner.read().await.users.contains_key(&user_id))
    }
}

// endregion: --- Memory Auction Log
