/// 영속 로그 — 경매의 내구성 있는 진실
/// 코디네이터가 중재자 수락 이후 기록하는 쓰기 경로와,
/// 재시작 복구 및 과거 조회용 읽기 경로를 제공한다.
// region:    --- Imports
use crate::auction::{
    AuctionListing, AuctionState, AuctionStatus, ItemOutcome, ItemState, ItemStatus,
};
use crate::database::DatabaseManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
mod queries;
// endregion: --- Imports

// region:    --- Types

#[derive(Debug, Error)]
pub enum LogError {
    #[error("영속 저장소 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("손상된 레코드: {0}")]
    Corrupt(String),

    #[error("중복 표시 이름: {0}")]
    DuplicateDisplayName(String),
}

/// 경매 상태 패치 — None 필드는 건드리지 않는다
#[derive(Debug, Default, Clone, Copy)]
pub struct AuctionStatusPatch {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_item_index: Option<i32>,
}

/// 품목 상태 패치 — None 필드는 건드리지 않는다
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemStatusPatch {
    pub highest_bid: Option<i64>,
    pub highest_bidder_id: Option<Uuid>,
    pub extended: Option<bool>,
    pub sold_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

// endregion: --- Types

// region:    --- Auction Log Trait

#[async_trait]
pub trait AuctionLog: Send + Sync {
    /// 경매와 품목 전체를 초기 상태로 원자적으로 기록
    async fn append_auction(&self, state: &AuctionState) -> Result<(), LogError>;

    /// 경매 상태 갱신
    async fn set_auction_status(
        &self,
        auction_id: Uuid,
        status: AuctionStatus,
        patch: AuctionStatusPatch,
    ) -> Result<(), LogError>;

    /// 품목 상태 갱신
    async fn set_item_status(
        &self,
        item_id: Uuid,
        status: ItemStatus,
        patch: ItemStatusPatch,
    ) -> Result<(), LogError>;

    /// 입찰 행 추가와 품목 최고가 갱신을 한 트랜잭션으로 기록
    async fn append_bid(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), LogError>;

    /// 품목 종결 — 낙찰자가 있으면 SOLD + 결과 행, 없으면 UNSOLD
    async fn finalize_item(
        &self,
        item_id: Uuid,
        winner_id: Option<Uuid>,
        final_price: i64,
        sold_at: DateTime<Utc>,
    ) -> Result<(), LogError>;

    /// 경매 종결 — ENDED 전이와 낙찰 결과 upsert를 한 트랜잭션으로 기록
    async fn finalize_auction(
        &self,
        auction_id: Uuid,
        ended_at: DateTime<Utc>,
        results: &[ItemOutcome],
    ) -> Result<(), LogError>;

    /// 종료되지 않은 경매 전체 (복구용)
    async fn load_active(&self) -> Result<Vec<AuctionState>, LogError>;

    /// 경매 단건 전체 뷰 (과거 조회용)
    async fn load_one(&self, auction_id: Uuid) -> Result<Option<AuctionState>, LogError>;

    /// 경매 목록 요약
    async fn load_summaries(&self) -> Result<Vec<AuctionListing>, LogError>;

    /// 사용자 upsert — 최초 접속 시 생성
    async fn upsert_user(&self, user_id: Uuid, display_name: &str) -> Result<(), LogError>;

    /// 사용자 존재 확인
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError>;
}

// endregion: --- Auction Log Trait

// region:    --- Row Models

#[derive(sqlx::FromRow)]
struct AuctionRow {
    id: Uuid,
    seller_id: Uuid,
    status: String,
    current_item_index: i32,
    max_duration_sec: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    item_order: i32,
    name: String,
    starting_price: i64,
    duration_sec: i64,
    extra_duration_sec: i64,
    status: String,
    highest_bid: i64,
    highest_bidder_id: Option<Uuid>,
    extended: bool,
    sold_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
}

fn to_state(auction: AuctionRow, items: Vec<ItemRow>) -> Result<AuctionState, LogError> {
    let status = AuctionStatus::parse(&auction.status)
        .ok_or_else(|| LogError::Corrupt(format!("경매 상태: {}", auction.status)))?;
    let items = items
        .into_iter()
        .map(|row| {
            let status = ItemStatus::parse(&row.status)
                .ok_or_else(|| LogError::Corrupt(format!("품목 상태: {}", row.status)))?;
            Ok(ItemState {
                item_id: row.id,
                item_order: row.item_order,
                name: row.name,
                starting_price: row.starting_price,
                duration_sec: row.duration_sec,
                extra_duration_sec: row.extra_duration_sec,
                status,
                highest_bid: row.highest_bid,
                highest_bidder_id: row.highest_bidder_id,
                extended: row.extended,
                sold_at: row.sold_at,
                ends_at: row.ends_at,
            })
        })
        .collect::<Result<Vec<_>, LogError>>()?;

    Ok(AuctionState {
        auction_id: auction.id,
        seller_id: auction.seller_id,
        status,
        current_item_index: auction.current_item_index as usize,
        max_duration_sec: auction.max_duration_sec,
        created_at: auction.created_at,
        started_at: auction.started_at,
        ended_at: auction.ended_at,
        items,
    })
}

// endregion: --- Row Models

// region:    --- Postgres Auction Log

pub struct PgAuctionLog {
    db: Arc<DatabaseManager>,
}

impl PgAuctionLog {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    async fn load_items(&self, auction_id: Uuid) -> Result<Vec<ItemRow>, LogError> {
        Ok(sqlx::query_as::<_, ItemRow>(queries::SELECT_ITEMS)
            .bind(auction_id)
            .fetch_all(self.db.pool())
            .await?)
    }
}

#[async_trait]
impl AuctionLog for PgAuctionLog {
    async fn append_auction(&self, state: &AuctionState) -> Result<(), LogError> {
        let state = state.clone();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query(queries::INSERT_AUCTION)
                        .bind(state.auction_id)
                        .bind(state.seller_id)
                        .bind(state.status.as_str())
                        .bind(state.current_item_index as i32)
                        .bind(state.max_duration_sec)
                        .bind(state.created_at)
                        .execute(&mut **tx)
                        .await?;

                    for item in &state.items {
                        sqlx::query(queries::INSERT_ITEM)
                            .bind(item.item_id)
                            .bind(state.auction_id)
                            .bind(item.item_order)
                            .bind(&item.name)
                            .bind(item.starting_price)
                            .bind(item.duration_sec)
                            .bind(item.extra_duration_sec)
                            .bind(item.status.as_str())
                            .bind(item.highest_bid)
                            .bind(item.highest_bidder_id)
                            .bind(item.extended)
                            .execute(&mut **tx)
                            .await?;
                    }
                    Ok::<(), LogError>(())
                })
            })
            .await
    }

    async fn set_auction_status(
        &self,
        auction_id: Uuid,
        status: AuctionStatus,
        patch: AuctionStatusPatch,
    ) -> Result<(), LogError> {
        sqlx::query(queries::SET_AUCTION_STATUS)
            .bind(auction_id)
            .bind(status.as_str())
            .bind(patch.started_at)
            .bind(patch.ended_at)
            .bind(patch.current_item_index)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn set_item_status(
        &self,
        item_id: Uuid,
        status: ItemStatus,
        patch: ItemStatusPatch,
    ) -> Result<(), LogError> {
        sqlx::query(queries::SET_ITEM_STATUS)
            .bind(item_id)
            .bind(status.as_str())
            .bind(patch.highest_bid)
            .bind(patch.highest_bidder_id)
            .bind(patch.extended)
            .bind(patch.sold_at)
            .bind(patch.ends_at)
            .execute(self.db.pool())
            .await?;
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
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query(queries::INSERT_BID)
                        .bind(Uuid::new_v4())
                        .bind(auction_id)
                        .bind(item_id)
                        .bind(bidder_id)
                        .bind(amount)
                        .bind(created_at)
                        .execute(&mut **tx)
                        .await?;

                    sqlx::query(queries::UPDATE_ITEM_HIGHEST)
                        .bind(item_id)
                        .bind(amount)
                        .bind(bidder_id)
                        .execute(&mut **tx)
                        .await?;
                    Ok::<(), LogError>(())
                })
            })
            .await
    }

    async fn finalize_item(
        &self,
        item_id: Uuid,
        winner_id: Option<Uuid>,
        final_price: i64,
        sold_at: DateTime<Utc>,
    ) -> Result<(), LogError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let status = if winner_id.is_some() {
                        ItemStatus::Sold
                    } else {
                        ItemStatus::Unsold
                    };
                    sqlx::query(queries::FINALIZE_ITEM)
                        .bind(item_id)
                        .bind(status.as_str())
                        .bind(winner_id.map(|_| sold_at))
                        .execute(&mut **tx)
                        .await?;

                    if let Some(winner_id) = winner_id {
                        sqlx::query(queries::INSERT_ITEM_RESULT)
                            .bind(item_id)
                            .bind(winner_id)
                            .bind(final_price)
                            .bind(sold_at)
                            .execute(&mut **tx)
                            .await?;
                    }
                    Ok::<(), LogError>(())
                })
            })
            .await
    }

    async fn finalize_auction(
        &self,
        auction_id: Uuid,
        ended_at: DateTime<Utc>,
        results: &[ItemOutcome],
    ) -> Result<(), LogError> {
        let results = results.to_vec();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query(queries::FINALIZE_AUCTION)
                        .bind(auction_id)
                        .bind(ended_at)
                        .execute(&mut **tx)
                        .await?;

                    for result in &results {
                        if let Some(winner_id) = result.winner_id {
                            sqlx::query(queries::INSERT_ITEM_RESULT)
                                .bind(result.item_id)
                                .bind(winner_id)
                                .bind(result.final_price)
                                .bind(ended_at)
                                .execute(&mut **tx)
                                .await?;
                        }
                    }
                    Ok::<(), LogError>(())
                })
            })
            .await
    }

    async fn load_active(&self) -> Result<Vec<AuctionState>, LogError> {
        let auctions = sqlx::query_as::<_, AuctionRow>(queries::SELECT_ACTIVE_AUCTIONS)
            .fetch_all(self.db.pool())
            .await?;

        let mut states = Vec::with_capacity(auctions.len());
        for auction in auctions {
            let items = self.load_items(auction.id).await?;
            states.push(to_state(auction, items)?);
        }
        Ok(states)
    }

    async fn load_one(&self, auction_id: Uuid) -> Result<Option<AuctionState>, LogError> {
        let auction = sqlx::query_as::<_, AuctionRow>(queries::SELECT_AUCTION)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?;

        match auction {
            Some(auction) => {
                let items = self.load_items(auction.id).await?;
                Ok(Some(to_state(auction, items)?))
            }
            None => Ok(None),
        }
    }

    async fn load_summaries(&self) -> Result<Vec<AuctionListing>, LogError> {
        Ok(sqlx::query_as::<_, AuctionListing>(queries::SELECT_LISTINGS)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn upsert_user(&self, user_id: Uuid, display_name: &str) -> Result<(), LogError> {
        sqlx::query(queries::UPSERT_USER)
            .bind(user_id)
            .bind(display_name)
            .execute(self.db.pool())
            .await
            .map_err(|e| match e {
                // 표시 이름 유일성 충돌
                sqlx::Error::Database(ref db) if db.constraint().is_some() => {
                    LogError::DuplicateDisplayName(display_name.to_string())
                }
                other => LogError::Database(other),
            })?;
        Ok(())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, LogError> {
        Ok(sqlx::query_scalar::<_, bool>(queries::USER_EXISTS)
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?)
    }
}

// endregion: --- Postgres Auction Log
