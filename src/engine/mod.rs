/// 경매 엔진 — 경매 한 건의 순수 상태 기계
/// 시계도 I/O도 로깅도 없다. 같은 초기 상태에 같은 호출 순서를 주면
/// 언제나 같은 상태가 나온다. 타임스탬프는 호출자가 인자로 넘긴다.
/// 엔진의 거절은 조언일 뿐이며, 경합의 최종 판정은 중재자가 내린다.
// region:    --- Imports
use crate::auction::{
    AuctionState, AuctionStatus, AuctionSummary, ItemClose, ItemOutcome, ItemSpec, ItemState,
    ItemStatus,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Engine Error

/// 엔진 수준 오류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("허용되지 않는 상태 전이입니다: {0}")]
    IllegalTransition(&'static str),

    #[error("경매가 진행 중이 아닙니다")]
    NotLive,

    #[error("진행 중인 품목이 없습니다")]
    NoLiveItem,

    #[error("입찰 금액이 현재 최고가({highest}) 이하입니다")]
    BidTooLow { highest: i64 },
}

// endregion: --- Engine Error

// region:    --- Engine

pub struct Engine {
    state: AuctionState,
}

impl Engine {
    /// 초기 상태 생성 — 모든 품목은 PENDING, 최고가는 시작가
    pub fn create(
        auction_id: Uuid,
        seller_id: Uuid,
        max_duration_sec: i64,
        items: Vec<ItemSpec>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|spec| ItemState {
                item_id: spec.item_id,
                item_order: spec.item_order,
                name: spec.name,
                starting_price: spec.starting_price,
                duration_sec: spec.duration_sec,
                extra_duration_sec: spec.extra_duration_sec,
                status: ItemStatus::Pending,
                highest_bid: spec.starting_price,
                highest_bidder_id: None,
                extended: false,
                sold_at: None,
                ends_at: None,
            })
            .collect();

        Engine {
            state: AuctionState {
                auction_id,
                seller_id,
                status: AuctionStatus::Created,
                current_item_index: 0,
                max_duration_sec,
                created_at,
                started_at: None,
                ended_at: None,
                items,
            },
        }
    }

    /// 영속 스냅샷으로부터 복원
    pub fn restore(state: AuctionState) -> Self {
        Engine { state }
    }

    /// 영속화용 깊은 복사
    pub fn snapshot(&self) -> AuctionState {
        self.state.clone()
    }

    pub fn state(&self) -> &AuctionState {
        &self.state
    }

    /// 현재 인덱스의 품목
    pub fn current_item(&self) -> Option<&ItemState> {
        self.state.items.get(self.state.current_item_index)
    }

    /// 경매 시작 — 첫 품목을 LIVE로 올린다
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state.status != AuctionStatus::Created {
            return Err(EngineError::IllegalTransition(
                "CREATED 상태에서만 시작할 수 있습니다",
            ));
        }
        if self.state.items.is_empty() {
            return Err(EngineError::IllegalTransition(
                "품목이 없는 경매는 시작할 수 없습니다",
            ));
        }

        self.state.status = AuctionStatus::Live;
        self.state.started_at = Some(now);
        self.state.current_item_index = 0;
        self.state.items[0].status = ItemStatus::Live;
        Ok(())
    }

    /// 입찰 허용성 검사 — 상태를 바꾸지 않는다
    pub fn check_bid(&self, amount: i64) -> Result<(), EngineError> {
        if self.state.status != AuctionStatus::Live {
            return Err(EngineError::NotLive);
        }
        let item = self.current_item().ok_or(EngineError::NoLiveItem)?;
        if item.status != ItemStatus::Live {
            return Err(EngineError::NoLiveItem);
        }
        // 동액은 진다
        if amount <= item.highest_bid {
            return Err(EngineError::BidTooLow {
                highest: item.highest_bid,
            });
        }
        Ok(())
    }

    /// 입찰 반영 — 허용성 검사 후 현재 품목의 최고가를 갱신한다
    pub fn place_bid(&mut self, bidder_id: Uuid, amount: i64) -> Result<(), EngineError> {
        self.check_bid(amount)?;
        let index = self.state.current_item_index;
        let item = &mut self.state.items[index];
        item.highest_bid = amount;
        item.highest_bidder_id = Some(bidder_id);
        Ok(())
    }

    /// 현재 품목 종료 — 시작가를 넘긴 입찰자가 있으면 낙찰, 없으면 유찰
    pub fn end_current_item(&mut self, now: DateTime<Utc>) -> Result<ItemClose, EngineError> {
        if self.state.status != AuctionStatus::Live {
            return Err(EngineError::NotLive);
        }
        let index = self.state.current_item_index;
        let item = self
            .state
            .items
            .get_mut(index)
            .ok_or(EngineError::NoLiveItem)?;
        if item.status != ItemStatus::Live {
            return Err(EngineError::NoLiveItem);
        }

        let had_bids =
            item.highest_bidder_id.is_some() && item.highest_bid > item.starting_price;
        if had_bids {
            item.status = ItemStatus::Sold;
            item.sold_at = Some(now);
        } else {
            item.status = ItemStatus::Unsold;
        }

        Ok(ItemClose {
            item_id: item.item_id,
            winner_id: if had_bids { item.highest_bidder_id } else { None },
            final_price: item.highest_bid,
            had_bids,
        })
    }

    /// 다음 품목으로 진행 — 다음 품목이 없으면 경매를 종료한다
    /// 반환값은 다음 품목이 LIVE로 올라갔는지 여부
    pub fn advance_to_next_item(&mut self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        if self.state.status != AuctionStatus::Live {
            return Err(EngineError::NotLive);
        }
        let current = self
            .current_item()
            .ok_or(EngineError::NoLiveItem)?;
        if current.status == ItemStatus::Live || current.status == ItemStatus::Pending {
            return Err(EngineError::IllegalTransition(
                "종료되지 않은 품목에서는 진행할 수 없습니다",
            ));
        }

        let next = self.state.current_item_index + 1;
        if next < self.state.items.len() {
            self.state.current_item_index = next;
            let item = &mut self.state.items[next];
            item.status = ItemStatus::Live;
            item.highest_bid = item.starting_price;
            Ok(true)
        } else {
            self.state.status = AuctionStatus::Ended;
            self.state.ended_at = Some(now);
            Ok(false)
        }
    }

    /// 현재 품목 연장 — 품목당 한 번만 허용된다
    /// 반환값은 추가 시간(초)
    pub fn extend_current_item(&mut self) -> Result<i64, EngineError> {
        if self.state.status != AuctionStatus::Live {
            return Err(EngineError::NotLive);
        }
        let index = self.state.current_item_index;
        let item = self
            .state
            .items
            .get_mut(index)
            .ok_or(EngineError::NoLiveItem)?;
        if item.status != ItemStatus::Live {
            return Err(EngineError::NoLiveItem);
        }
        if item.extended {
            return Err(EngineError::IllegalTransition("이미 연장된 품목입니다"));
        }
        item.extended = true;
        Ok(item.extra_duration_sec)
    }

    /// 경매 종료 — 멱등. 아직 종료 전이면 강제 종료하고
    /// 남은 품목은 유찰 처리한 뒤 품목별 요약을 돌려준다
    pub fn end_auction(&mut self, now: DateTime<Utc>) -> AuctionSummary {
        if self.state.status != AuctionStatus::Ended {
            for item in &mut self.state.items {
                if item.status == ItemStatus::Live || item.status == ItemStatus::Pending {
                    item.status = ItemStatus::Unsold;
                }
            }
            self.state.status = AuctionStatus::Ended;
            self.state.ended_at = Some(now);
        }

        AuctionSummary {
            auction_id: self.state.auction_id,
            results: self
                .state
                .items
                .iter()
                .map(|item| ItemOutcome {
                    item_id: item.item_id,
                    winner_id: if item.status == ItemStatus::Sold {
                        item.highest_bidder_id
                    } else {
                        None
                    },
                    final_price: item.highest_bid,
                })
                .collect(),
        }
    }
}

// endregion: --- Engine

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(order: i32, name: &str, starting_price: i64, duration_sec: i64) -> ItemSpec {
        ItemSpec {
            item_id: Uuid::new_v4(),
            item_order: order,
            name: name.to_string(),
            starting_price,
            duration_sec,
            extra_duration_sec: 15,
        }
    }

    fn two_item_engine() -> Engine {
        Engine::create(
            Uuid::new_v4(),
            Uuid::new_v4(),
            3600,
            vec![spec(0, "A", 100, 60), spec(1, "B", 50, 60)],
            Utc::now(),
        )
    }

    #[test]
    fn test_create_initial_state() {
        let engine = two_item_engine();
        let state = engine.state();

        assert_eq!(state.status, AuctionStatus::Created);
        assert_eq!(state.current_item_index, 0);
        for item in &state.items {
            assert_eq!(item.status, ItemStatus::Pending);
            assert_eq!(item.highest_bid, item.starting_price);
            assert!(item.highest_bidder_id.is_none());
            assert!(!item.extended);
        }
    }

    #[test]
    fn test_start_transitions_first_item_live() {
        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();

        assert_eq!(engine.state().status, AuctionStatus::Live);
        assert!(engine.state().started_at.is_some());
        assert_eq!(engine.state().items[0].status, ItemStatus::Live);
        assert_eq!(engine.state().items[1].status, ItemStatus::Pending);
    }

    #[test]
    fn test_start_rejects_empty_and_double_start() {
        let mut empty = Engine::create(Uuid::new_v4(), Uuid::new_v4(), 3600, vec![], Utc::now());
        assert!(matches!(
            empty.start(Utc::now()),
            Err(EngineError::IllegalTransition(_))
        ));

        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();
        assert!(matches!(
            engine.start(Utc::now()),
            Err(EngineError::IllegalTransition(_))
        ));
    }

    #[test]
    fn test_place_bid_rules() {
        let mut engine = two_item_engine();
        let bidder = Uuid::new_v4();

        // 시작 전에는 거절
        assert_eq!(engine.place_bid(bidder, 150), Err(EngineError::NotLive));

        engine.start(Utc::now()).unwrap();

        // 동액은 진다
        assert_eq!(
            engine.place_bid(bidder, 100),
            Err(EngineError::BidTooLow { highest: 100 })
        );

        engine.place_bid(bidder, 150).unwrap();
        assert_eq!(engine.current_item().unwrap().highest_bid, 150);
        assert_eq!(engine.current_item().unwrap().highest_bidder_id, Some(bidder));

        // 최고가 이하 재입찰 거절
        assert_eq!(
            engine.place_bid(Uuid::new_v4(), 150),
            Err(EngineError::BidTooLow { highest: 150 })
        );
    }

    #[test]
    fn test_end_current_item_sold_and_unsold() {
        let mut engine = two_item_engine();
        let bidder = Uuid::new_v4();
        engine.start(Utc::now()).unwrap();
        engine.place_bid(bidder, 150).unwrap();

        let close = engine.end_current_item(Utc::now()).unwrap();
        assert_eq!(close.winner_id, Some(bidder));
        assert_eq!(close.final_price, 150);
        assert!(close.had_bids);
        assert_eq!(engine.state().items[0].status, ItemStatus::Sold);
        assert!(engine.state().items[0].sold_at.is_some());

        // 이중 종료는 거절
        assert_eq!(
            engine.end_current_item(Utc::now()),
            Err(EngineError::NoLiveItem)
        );

        // 입찰 없는 품목은 유찰
        assert!(engine.advance_to_next_item(Utc::now()).unwrap());
        let close = engine.end_current_item(Utc::now()).unwrap();
        assert_eq!(close.winner_id, None);
        assert_eq!(close.final_price, 50);
        assert!(!close.had_bids);
        assert_eq!(engine.state().items[1].status, ItemStatus::Unsold);
        assert!(engine.state().items[1].sold_at.is_none());
    }

    #[test]
    fn test_advance_ends_auction_after_last_item() {
        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();

        engine.end_current_item(Utc::now()).unwrap();
        assert!(engine.advance_to_next_item(Utc::now()).unwrap());
        assert_eq!(engine.state().current_item_index, 1);
        assert_eq!(engine.state().items[1].status, ItemStatus::Live);

        engine.end_current_item(Utc::now()).unwrap();
        assert!(!engine.advance_to_next_item(Utc::now()).unwrap());
        assert_eq!(engine.state().status, AuctionStatus::Ended);
        assert!(engine.state().ended_at.is_some());
    }

    #[test]
    fn test_advance_requires_closed_item() {
        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();
        assert!(matches!(
            engine.advance_to_next_item(Utc::now()),
            Err(EngineError::IllegalTransition(_))
        ));
    }

    #[test]
    fn test_extend_only_once() {
        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();

        assert_eq!(engine.extend_current_item(), Ok(15));
        assert!(engine.state().items[0].extended);
        assert!(matches!(
            engine.extend_current_item(),
            Err(EngineError::IllegalTransition(_))
        ));
    }

    #[test]
    fn test_end_auction_idempotent_summary() {
        let mut engine = two_item_engine();
        let bidder = Uuid::new_v4();
        engine.start(Utc::now()).unwrap();
        engine.place_bid(bidder, 150).unwrap();

        // 강제 종료 — 진행 중/대기 품목은 유찰
        let summary = engine.end_auction(Utc::now());
        assert_eq!(engine.state().status, AuctionStatus::Ended);
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.results[0].winner_id, None);
        assert_eq!(summary.results[1].winner_id, None);
        assert_eq!(engine.state().items[0].status, ItemStatus::Unsold);

        // 멱등 — 두 번째 호출도 같은 요약
        let again = engine.end_auction(Utc::now());
        assert_eq!(summary, again);
    }

    #[test]
    fn test_end_auction_reports_sold_winners() {
        let mut engine = two_item_engine();
        let bidder = Uuid::new_v4();
        engine.start(Utc::now()).unwrap();
        engine.place_bid(bidder, 150).unwrap();
        engine.end_current_item(Utc::now()).unwrap();
        engine.advance_to_next_item(Utc::now()).unwrap();
        engine.end_current_item(Utc::now()).unwrap();
        engine.advance_to_next_item(Utc::now()).unwrap();

        let summary = engine.end_auction(Utc::now());
        assert_eq!(summary.results[0].winner_id, Some(bidder));
        assert_eq!(summary.results[0].final_price, 150);
        assert_eq!(summary.results[1].winner_id, None);
        assert_eq!(summary.results[1].final_price, 50);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut engine = two_item_engine();
        engine.start(Utc::now()).unwrap();
        engine.place_bid(Uuid::new_v4(), 170).unwrap();

        let snapshot = engine.snapshot();
        let restored = Engine::restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.state(), engine.state());
    }
}

// endregion: --- Tests
