/// 입찰 중재자 — 동시 입찰 경합의 단일 진실
/// 1. 품목별 (최고가, 최고 입찰자)의 원자적 검사-설정
/// 2. 재시도 입찰을 한 번으로 접는 멱등성 저장소
// region:    --- Imports
use crate::auction::BidResult;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Types

/// PENDING 마커 유효 시간
pub const PENDING_TTL: Duration = Duration::from_secs(30);
/// 저장된 결과 보관 시간
pub const RESULT_TTL: Duration = Duration::from_secs(600);
/// 클라이언트 멱등성 키 최대 길이
pub const IDEM_KEY_MAX_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("중재자 저장소 오류: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("중재자 내부 잠금 오류")]
    Poisoned,
}

/// 입찰 경합 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidVerdict {
    Accepted,
    Outpaced { current: i64 },
}

/// 멱등성 키 — (경매, 품목, 입찰자, 클라이언트 키)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdemKey {
    pub auction_id: Uuid,
    pub item_id: Uuid,
    pub bidder_id: Uuid,
    pub key: String,
}

impl IdemKey {
    /// 클라이언트 키는 128자로 잘라 저장한다
    pub fn new(auction_id: Uuid, item_id: Uuid, bidder_id: Uuid, key: &str) -> Self {
        IdemKey {
            auction_id,
            item_id,
            bidder_id,
            key: key.chars().take(IDEM_KEY_MAX_LEN).collect(),
        }
    }
}

// endregion: --- Types

// region:    --- Arbiter Trait

/// 중재자 트레이트
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// 품목이 LIVE로 올라갈 때 최고가 슬롯을 시드한다
    /// 복구 경로에서는 영속된 최고 입찰자까지 함께 되살린다
    async fn seed_item(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        highest_bid: i64,
        highest_bidder: Option<Uuid>,
    ) -> Result<(), ArbiterError>;

    /// 원자적 검사-설정 — 현재 최고가보다 높을 때만 기록된다
    /// 동액은 지고, 동시 도착은 도착 순서로 갈린다
    async fn check_and_set(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        amount: i64,
        bidder_id: Uuid,
    ) -> Result<BidVerdict, ArbiterError>;

    /// 품목 종료 시 해당 품목의 키 전부 삭제
    async fn clear_item(&self, auction_id: Uuid, item_id: Uuid) -> Result<(), ArbiterError>;

    /// 경매 종료 시 해당 경매의 키 전부 삭제
    async fn clear_auction(&self, auction_id: Uuid) -> Result<(), ArbiterError>;

    /// PENDING 마커 선점 — 없을 때만 기록하고 소유 여부를 돌려준다
    async fn claim_pending(&self, key: &IdemKey) -> Result<bool, ArbiterError>;

    /// 저장된 결과 조회 — PENDING이거나 없으면 None
    async fn load_outcome(&self, key: &IdemKey) -> Result<Option<BidResult>, ArbiterError>;

    /// 결과 기록 — PENDING 마커를 원자적으로 대체한다
    async fn store_outcome(&self, key: &IdemKey, outcome: &BidResult) -> Result<(), ArbiterError>;
}

// endregion: --- Arbiter Trait

// region:    --- Postgres Arbiter

/// Postgres 기반 중재자 — 조건부 UPSERT 한 문장이 검사-설정의 원자성을 보장한다
pub struct PgArbiter {
    pool: PgPool,
}

const CREATE_ARBITER_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS arbiter_slots (
        auction_id UUID NOT NULL,
        item_id UUID NOT NULL,
        highest_bid BIGINT NOT NULL,
        highest_bidder UUID,
        PRIMARY KEY (auction_id, item_id)
    );
    CREATE TABLE IF NOT EXISTS arbiter_idempotency (
        auction_id UUID NOT NULL,
        item_id UUID NOT NULL,
        bidder_id UUID NOT NULL,
        idem_key VARCHAR(128) NOT NULL,
        outcome JSONB,
        expires_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (auction_id, item_id, bidder_id, idem_key)
    )
"#;

const SEED_SLOT: &str = r#"
    INSERT INTO arbiter_slots (auction_id, item_id, highest_bid, highest_bidder)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (auction_id, item_id)
    DO UPDATE SET highest_bid = EXCLUDED.highest_bid, highest_bidder = EXCLUDED.highest_bidder
"#;

/// 현재 최고가보다 높을 때만 갱신되고, 갱신된 행만 RETURNING 된다
const CHECK_AND_SET: &str = r#"
    INSERT INTO arbiter_slots (auction_id, item_id, highest_bid, highest_bidder)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (auction_id, item_id)
    DO UPDATE SET highest_bid = EXCLUDED.highest_bid, highest_bidder = EXCLUDED.highest_bidder
    WHERE arbiter_slots.highest_bid < EXCLUDED.highest_bid
    RETURNING highest_bid
"#;

const SELECT_SLOT: &str =
    "SELECT highest_bid FROM arbiter_slots WHERE auction_id = $1 AND item_id = $2";

const CLAIM_PENDING: &str = r#"
    INSERT INTO arbiter_idempotency (auction_id, item_id, bidder_id, idem_key, outcome, expires_at)
    VALUES ($1, $2, $3, $4, NULL, $5)
    ON CONFLICT (auction_id, item_id, bidder_id, idem_key) DO NOTHING
"#;

const LOAD_OUTCOME: &str = r#"
    SELECT outcome FROM arbiter_idempotency
    WHERE auction_id = $1 AND item_id = $2 AND bidder_id = $3 AND idem_key = $4
      AND expires_at > $5
"#;

const STORE_OUTCOME: &str = r#"
    INSERT INTO arbiter_idempotency (auction_id, item_id, bidder_id, idem_key, outcome, expires_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (auction_id, item_id, bidder_id, idem_key)
    DO UPDATE SET outcome = EXCLUDED.outcome, expires_at = EXCLUDED.expires_at
"#;

const REAP_EXPIRED: &str = "DELETE FROM arbiter_idempotency WHERE expires_at <= $1";

impl PgArbiter {
    /// 중재자 저장소 연결
    pub async fn connect(arbiter_url: &str) -> Result<Self, ArbiterError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(arbiter_url)
            .await?;
        Ok(PgArbiter { pool })
    }

    /// 중재자 테이블 초기화 — 멱등
    pub async fn initialize(&self) -> Result<(), ArbiterError> {
        for query in CREATE_ARBITER_TABLES.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&self.pool).await?;
            }
        }
        info!("{:<12} --> 중재자 테이블 초기화 완료", "Arbiter");
        Ok(())
    }
}

#[async_trait]
impl Arbiter for PgArbiter {
    async fn seed_item(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        highest_bid: i64,
        highest_bidder: Option<Uuid>,
    ) -> Result<(), ArbiterError> {
        sqlx::query(SEED_SLOT)
            .bind(auction_id)
            .bind(item_id)
            .bind(highest_bid)
            .bind(highest_bidder)
            .execute(&self.pool)
            .await?;
        debug!(
            "{:<12} --> 슬롯 시드: item={} highest={}",
            "Arbiter", item_id, highest_bid
        );
        Ok(())
    }

    async fn check_and_set(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        amount: i64,
        bidder_id: Uuid,
    ) -> Result<BidVerdict, ArbiterError> {
        let updated = sqlx::query_scalar::<_, i64>(CHECK_AND_SET)
            .bind(auction_id)
            .bind(item_id)
            .bind(amount)
            .bind(bidder_id)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(_) => Ok(BidVerdict::Accepted),
            None => {
                let current = sqlx::query_scalar::<_, i64>(SELECT_SLOT)
                    .bind(auction_id)
                    .bind(item_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .unwrap_or(amount);
                Ok(BidVerdict::Outpaced { current })
            }
        }
    }

    async fn clear_item(&self, auction_id: Uuid, item_id: Uuid) -> Result<(), ArbiterError> {
        sqlx::query("DELETE FROM arbiter_slots WHERE auction_id = $1 AND item_id = $2")
            .bind(auction_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM arbiter_idempotency WHERE auction_id = $1 AND item_id = $2")
            .bind(auction_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_auction(&self, auction_id: Uuid) -> Result<(), ArbiterError> {
        sqlx::query("DELETE FROM arbiter_slots WHERE auction_id = $1")
            .bind(auction_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM arbiter_idempotency WHERE auction_id = $1")
            .bind(auction_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_pending(&self, key: &IdemKey) -> Result<bool, ArbiterError> {
        let now = Utc::now();

        // 만료된 마커 정리
        sqlx::query(REAP_EXPIRED).bind(now).execute(&self.pool).await?;

        let result = sqlx::query(CLAIM_PENDING)
            .bind(key.auction_id)
            .bind(key.item_id)
            .bind(key.bidder_id)
            .bind(&key.key)
            .bind(now + ChronoDuration::seconds(PENDING_TTL.as_secs() as i64))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn load_outcome(&self, key: &IdemKey) -> Result<Option<BidResult>, ArbiterError> {
        let outcome = sqlx::query_scalar::<_, Option<serde_json::Value>>(LOAD_OUTCOME)
            .bind(key.auction_id)
            .bind(key.item_id)
            .bind(key.bidder_id)
            .bind(&key.key)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(outcome
            .flatten()
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    async fn store_outcome(&self, key: &IdemKey, outcome: &BidResult) -> Result<(), ArbiterError> {
        let value = serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null);
        sqlx::query(STORE_OUTCOME)
            .bind(key.auction_id)
            .bind(key.item_id)
            .bind(key.bidder_id)
            .bind(&key.key)
            .bind(value)
            .bind(Utc::now() + ChronoDuration::seconds(RESULT_TTL.as_secs() as i64))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// endregion: --- Postgres Arbiter

// region:    --- Memory Arbiter

struct Slot {
    highest_bid: i64,
    highest_bidder: Option<Uuid>,
}

struct IdemEntry {
    outcome: Option<BidResult>,
    expires_at: Instant,
}

/// 인메모리 중재자 — 테스트와 로컬 개발용
#[derive(Default)]
pub struct MemoryArbiter {
    slots: Mutex<HashMap<(Uuid, Uuid), Slot>>,
    idem: Mutex<HashMap<IdemKey, IdemEntry>>,
}

#[async_trait]
impl Arbiter for MemoryArbiter {
    async fn seed_item(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        highest_bid: i64,
        highest_bidder: Option<Uuid>,
    ) -> Result<(), ArbiterError> {
        let mut slots = self.slots.lock().map_err(|_| ArbiterError::Poisoned)?;
        slots.insert(
            (auction_id, item_id),
            Slot {
                highest_bid,
                highest_bidder,
            },
        );
        Ok(())
    }

    async fn check_and_set(
        &self,
        auction_id: Uuid,
        item_id: Uuid,
        amount: i64,
        bidder_id: Uuid,
    ) -> Result<BidVerdict, ArbiterError> {
        let mut slots = self.slots.lock().map_err(|_| ArbiterError::Poisoned)?;
        match slots.get_mut(&(auction_id, item_id)) {
            None => {
                // 슬롯이 없으면 수락하고 기록한다
                slots.insert(
                    (auction_id, item_id),
                    Slot {
                        highest_bid: amount,
                        highest_bidder: Some(bidder_id),
                    },
                );
                Ok(BidVerdict::Accepted)
            }
            Some(slot) if amount > slot.highest_bid => {
                slot.highest_bid = amount;
                slot.highest_bidder = Some(bidder_id);
                Ok(BidVerdict::Accepted)
            }
            Some(slot) => Ok(BidVerdict::Outpaced {
                current: slot.highest_bid,
            }),
        }
    }

    async fn clear_item(&self, auction_id: Uuid, item_id: Uuid) -> Result<(), ArbiterError> {
        self.slots
            .lock()
            .map_err(|_| ArbiterError::Poisoned)?
            .remove(&(auction_id, item_id));
        self.idem
            .lock()
            .map_err(|_| ArbiterError::Poisoned)?
            .retain(|key, _| !(key.auction_id == auction_id && key.item_id == item_id));
        Ok(())
    }

    async fn clear_auction(&self, auction_id: Uuid) -> Result<(), ArbiterError> {
        self.slots
            .lock()
            .map_err(|_| ArbiterError::Poisoned)?
            .retain(|(aid, _), _| *aid != auction_id);
        self.idem
            .lock()
            .map_err(|_| ArbiterError::Poisoned)?
            .retain(|key, _| key.auction_id != auction_id);
        Ok(())
    }

    async fn claim_pending(&self, key: &IdemKey) -> Result<bool, ArbiterError> {
        let mut idem = self.idem.lock().map_err(|_| ArbiterError::Poisoned)?;
        let now = Instant::now();
        idem.retain(|_, entry| entry.expires_at > now);

        if idem.contains_key(key) {
            return Ok(false);
        }
        idem.insert(
            key.clone(),
            IdemEntry {
                outcome: None,
                expires_at: now + PENDING_TTL,
            },
        );
        Ok(true)
    }

    async fn load_outcome(&self, key: &IdemKey) -> Result<Option<BidResult>, ArbiterError> {
        let idem = self.idem.lock().map_err(|_| ArbiterError::Poisoned)?;
        Ok(idem
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .and_then(|entry| entry.outcome.clone()))
    }

    async fn store_outcome(&self, key: &IdemKey, outcome: &BidResult) -> Result<(), ArbiterError> {
        let mut idem = self.idem.lock().map_err(|_| ArbiterError::Poisoned)?;
        idem.insert(
            key.clone(),
            IdemEntry {
                outcome: Some(outcome.clone()),
                expires_at: Instant::now() + RESULT_TTL,
            },
        );
        Ok(())
    }
}

// endregion: --- Memory Arbiter

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_and_set_accepts_higher_only() {
        let arbiter = MemoryArbiter::default();
        let (aid, iid) = (Uuid::new_v4(), Uuid::new_v4());
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());

        arbiter.seed_item(aid, iid, 100, None).await.unwrap();

        assert_eq!(
            arbiter.check_and_set(aid, iid, 150, x).await.unwrap(),
            BidVerdict::Accepted
        );
        // 동액은 진다
        assert_eq!(
            arbiter.check_and_set(aid, iid, 150, y).await.unwrap(),
            BidVerdict::Outpaced { current: 150 }
        );
        assert_eq!(
            arbiter.check_and_set(aid, iid, 149, y).await.unwrap(),
            BidVerdict::Outpaced { current: 150 }
        );
        // 수락 후 슬롯은 항상 수락가 이상
        assert_eq!(
            arbiter.check_and_set(aid, iid, 151, y).await.unwrap(),
            BidVerdict::Accepted
        );
    }

    #[tokio::test]
    async fn test_check_and_set_absent_slot_accepts() {
        let arbiter = MemoryArbiter::default();
        let verdict = arbiter
            .check_and_set(Uuid::new_v4(), Uuid::new_v4(), 10, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(verdict, BidVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_idempotency_claim_and_store() {
        let arbiter = MemoryArbiter::default();
        let key = IdemKey::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "k1");

        assert!(arbiter.load_outcome(&key).await.unwrap().is_none());
        assert!(arbiter.claim_pending(&key).await.unwrap());
        // 선점 중복은 거절
        assert!(!arbiter.claim_pending(&key).await.unwrap());
        // PENDING 동안 결과는 없다
        assert!(arbiter.load_outcome(&key).await.unwrap().is_none());

        let outcome = BidResult::accept();
        arbiter.store_outcome(&key, &outcome).await.unwrap();
        assert_eq!(arbiter.load_outcome(&key).await.unwrap(), Some(outcome));
    }

    #[tokio::test]
    async fn test_idem_key_truncated() {
        let long_key = "x".repeat(500);
        let key = IdemKey::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), &long_key);
        assert_eq!(key.key.len(), IDEM_KEY_MAX_LEN);
    }

    #[tokio::test]
    async fn test_clear_auction_removes_all_keys() {
        let arbiter = MemoryArbiter::default();
        let aid = Uuid::new_v4();
        let iid = Uuid::new_v4();
        let bidder = Uuid::new_v4();
        let key = IdemKey::new(aid, iid, bidder, "k1");

        arbiter.seed_item(aid, iid, 100, None).await.unwrap();
        arbiter.claim_pending(&key).await.unwrap();
        arbiter
            .store_outcome(&key, &BidResult::accept())
            .await
            .unwrap();

        arbiter.clear_auction(aid).await.unwrap();

        // 키가 비워졌으니 같은 금액도 새로 수락된다
        assert_eq!(
            arbiter.check_and_set(aid, iid, 100, bidder).await.unwrap(),
            BidVerdict::Accepted
        );
        assert!(arbiter.load_outcome(&key).await.unwrap().is_none());
    }
}

// endregion: --- Tests
