/// 경매 코디네이터
/// 진행 중 경매의 수명을 소유하는 액터. 경매 하나의 모든 변이는
/// 경매 단위 잠금 아래 엔진 → 중재자 → 영속 로그 → 이벤트 발행
/// 순서로 직렬 실행되고, 서로 다른 경매는 병렬로 진행된다.
// region:    --- Imports
use crate::arbiter::{Arbiter, ArbiterError, BidVerdict, IdemKey};
use crate::auction::events::{AuctionEndedPayload, ItemSoldPayload, ServerEvent};
use crate::auction::{
    AuctionStatus, AuctionView, BidResult, ItemDraft, ItemSpec, ItemStatus,
};
use crate::engine::{Engine, EngineError};
use crate::error::ServiceError;
use crate::hub::BroadcastHub;
use crate::scheduler::ItemScheduler;
use crate::store::{AuctionLog, AuctionStatusPatch, ItemStatusPatch, LogError};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Constants

/// 멱등성 결과 폴링 — 40회 × 25ms ≈ 1초
const IDEM_POLL_ATTEMPTS: u32 = 40;
const IDEM_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// 종결 변이 재시도
const FINALIZE_RETRIES: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(200);

/// 품목 이름 최대 길이
const ITEM_NAME_MAX_LEN: usize = 128;

// endregion: --- Constants

// region:    --- Coordinator

/// 진행 중 경매 — 경매 단위 직렬화 잠금이 엔진을 감싼다
struct LiveAuction {
    engine: Mutex<Engine>,
}

pub struct Coordinator {
    registry: DashMap<Uuid, Arc<LiveAuction>>,
    arbiter: Arc<dyn Arbiter>,
    log: Arc<dyn AuctionLog>,
    hub: Arc<BroadcastHub>,
    scheduler: ItemScheduler,
}

fn log_unavailable(err: LogError) -> ServiceError {
    ServiceError::Unavailable(err.to_string())
}

fn arbiter_unavailable(err: ArbiterError) -> ServiceError {
    ServiceError::Unavailable(err.to_string())
}

/// 엔진 거절을 입찰 결과 사유 코드로
fn reason_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotLive => "NOT_LIVE",
        EngineError::NoLiveItem => "NO_LIVE_ITEM",
        EngineError::BidTooLow { .. } => "BID_TOO_LOW",
        EngineError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
    }
}

impl Coordinator {
    pub fn new(
        arbiter: Arc<dyn Arbiter>,
        log: Arc<dyn AuctionLog>,
        hub: Arc<BroadcastHub>,
    ) -> Arc<Self> {
        Arc::new(Coordinator {
            registry: DashMap::new(),
            arbiter,
            log,
            hub,
            scheduler: ItemScheduler::new(),
        })
    }

    fn live_auction(&self, auction_id: &Uuid) -> Option<Arc<LiveAuction>> {
        self.registry.get(auction_id).map(|r| Arc::clone(r.value()))
    }

    fn view_locked(&self, engine: &Engine, auction_id: &Uuid) -> AuctionView {
        AuctionView::from_state(engine.state(), self.scheduler.end_time_ms(auction_id))
    }

    fn validate_drafts(drafts: &[ItemDraft]) -> Result<(), ServiceError> {
        if drafts.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "품목이 비어 있습니다".to_string(),
            ));
        }
        for draft in drafts {
            if draft.name.is_empty() || draft.name.chars().count() > ITEM_NAME_MAX_LEN {
                return Err(ServiceError::InvalidRequest(format!(
                    "품목 이름은 1~{}자여야 합니다",
                    ITEM_NAME_MAX_LEN
                )));
            }
            if draft.starting_price < 0 {
                return Err(ServiceError::InvalidRequest(
                    "시작가는 0 이상이어야 합니다".to_string(),
                ));
            }
            if draft.duration_sec <= 0 {
                return Err(ServiceError::InvalidRequest(
                    "진행 시간은 0보다 커야 합니다".to_string(),
                ));
            }
            if draft.extra_duration_sec < 0 {
                return Err(ServiceError::InvalidRequest(
                    "추가 시간은 0 이상이어야 합니다".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// 경매 등록 — 판매자 검증, 식별자 배정, 엔진 생성, 영속화
    pub async fn create_auction(
        &self,
        seller_id: Uuid,
        max_duration_sec: i64,
        drafts: Vec<ItemDraft>,
    ) -> Result<AuctionView, ServiceError> {
        Self::validate_drafts(&drafts)?;
        if !self
            .log
            .user_exists(seller_id)
            .await
            .map_err(log_unavailable)?
        {
            return Err(ServiceError::InvalidRequest(
                "판매자를 찾을 수 없습니다".to_string(),
            ));
        }

        let auction_id = Uuid::new_v4();
        let specs = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| ItemSpec {
                item_id: Uuid::new_v4(),
                item_order: index as i32,
                name: draft.name,
                starting_price: draft.starting_price,
                duration_sec: draft.duration_sec,
                extra_duration_sec: draft.extra_duration_sec,
            })
            .collect();

        let engine = Engine::create(auction_id, seller_id, max_duration_sec, specs, Utc::now());
        self.log
            .append_auction(engine.state())
            .await
            .map_err(log_unavailable)?;

        let view = AuctionView::from_state(engine.state(), None);
        self.registry.insert(
            auction_id,
            Arc::new(LiveAuction {
                engine: Mutex::new(engine),
            }),
        );
        info!(
            "{:<12} --> 경매 생성: id={} seller={} items={}",
            "Coordinator",
            auction_id,
            seller_id,
            view.items.len()
        );
        Ok(view)
    }

    /// 경매 시작 — 첫 품목 LIVE, 중재자 시드, 타이머 장전
    pub async fn start_auction(
        self: &Arc<Self>,
        auction_id: Uuid,
    ) -> Result<AuctionView, ServiceError> {
        let entry = self
            .live_auction(&auction_id)
            .ok_or(ServiceError::NotFound("auction"))?;
        let mut engine = entry.engine.lock().await;

        // 엔진 변이 전에 시작 가능 여부와 중재자 시드부터 확정한다
        {
            let state = engine.state();
            if state.status != AuctionStatus::Created {
                return Err(ServiceError::IllegalTransition(
                    "CREATED 상태에서만 시작할 수 있습니다".to_string(),
                ));
            }
            if state.items.is_empty() {
                return Err(ServiceError::IllegalTransition(
                    "품목이 없는 경매는 시작할 수 없습니다".to_string(),
                ));
            }
        }
        let first = engine.state().items[0].clone();
        self.arbiter
            .seed_item(auction_id, first.item_id, first.starting_price, None)
            .await
            .map_err(arbiter_unavailable)?;

        let now = Utc::now();
        engine
            .start(now)
            .map_err(|e| ServiceError::InvariantViolation(e.to_string()))?;

        let ends_at =
            self.arm_item_timer(auction_id, Duration::from_secs(first.duration_sec as u64));

        // 비종결 영속 실패는 기록만 남긴다 — 메모리 상태가 당분간 진실
        if let Err(e) = self
            .log
            .set_auction_status(
                auction_id,
                AuctionStatus::Live,
                AuctionStatusPatch {
                    started_at: Some(now),
                    current_item_index: Some(0),
                    ..Default::default()
                },
            )
            .await
        {
            error!("{:<12} --> 경매 시작 영속화 실패: {:?}", "Store", e);
        }
        if let Err(e) = self
            .log
            .set_item_status(
                first.item_id,
                ItemStatus::Live,
                ItemStatusPatch {
                    ends_at: Some(ends_at),
                    ..Default::default()
                },
            )
            .await
        {
            error!("{:<12} --> 품목 시작 영속화 실패: {:?}", "Store", e);
        }

        let view = self.view_locked(&engine, &auction_id);
        self.hub
            .publish(&auction_id, ServerEvent::AuctionState(view.clone()));
        info!(
            "{:<12} --> 경매 시작: id={} 첫 품목={}",
            "Coordinator", auction_id, first.item_id
        );
        Ok(view)
    }

    /// 입찰 — 저장된 멱등성 결과 → 허용성 → 선점 → 중재자 → 엔진 커밋 → 영속화 → 발행
    /// 결과는 예외가 아니라 항상 값으로 돌아간다
    pub async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: i64,
        idempotency_key: Option<String>,
    ) -> BidResult {
        let Some(entry) = self.live_auction(&auction_id) else {
            return BidResult::reject("NOT_FOUND");
        };
        let mut engine = entry.engine.lock().await;

        // 1. 저장된 멱등성 결과가 있으면 그대로 반환 — 수락된 입찰의 재시도가
        //    허용성 검사에 걸려 다른 답을 받는 일이 없어야 한다
        let idem = match (
            idempotency_key.as_deref().filter(|key| !key.is_empty()),
            engine.current_item().map(|item| item.item_id),
        ) {
            (Some(key), Some(item_id)) => {
                Some(IdemKey::new(auction_id, item_id, bidder_id, key))
            }
            _ => None,
        };
        if let Some(key) = &idem {
            match self.arbiter.load_outcome(key).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(e) => {
                    warn!("{:<12} --> 멱등성 조회 실패: {:?}", "Arbiter", e);
                    return BidResult::reject("UNAVAILABLE");
                }
            }
        }

        // 2. 엔진 허용성 검사 — 결정적 거절은 중재자를 거치지 않는다
        if let Err(e) = engine.check_bid(amount) {
            return BidResult::reject(reason_code(&e));
        }
        let Some(item_id) = engine.current_item().map(|item| item.item_id) else {
            return BidResult::reject("NO_LIVE_ITEM");
        };

        // 3. PENDING 선점 — 실패하면 먼저 온 동일 입찰의 결과를 기다린다
        if let Some(key) = &idem {
            match self.arbiter.claim_pending(key).await {
                Ok(true) => {}
                Ok(false) => return self.await_duplicate(key).await,
                Err(e) => {
                    warn!("{:<12} --> 멱등성 선점 실패: {:?}", "Arbiter", e);
                    return BidResult::reject("UNAVAILABLE");
                }
            }
        }

        // 4. 중재자 원자적 검사-설정 — 경합의 단일 진실
        let verdict = match self
            .arbiter
            .check_and_set(auction_id, item_id, amount, bidder_id)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("{:<12} --> 중재자 호출 실패: {:?}", "Arbiter", e);
                return BidResult::reject("UNAVAILABLE");
            }
        };

        let outcome = match verdict {
            BidVerdict::Outpaced { current } => {
                info!(
                    "{:<12} --> 입찰 경합 패배: auction={} amount={} current={}",
                    "Coordinator", auction_id, amount, current
                );
                BidResult::reject("OUTPACED_BY_ANOTHER")
            }
            BidVerdict::Accepted => {
                // 5. 엔진 커밋 — 경매 단위 직렬화 덕분에 항상 성공해야 한다
                match engine.place_bid(bidder_id, amount) {
                    Ok(()) => {
                        // 6. 영속화 — 실패는 입찰자에게 전파하지 않는다
                        if let Err(e) = self
                            .log
                            .append_bid(auction_id, item_id, bidder_id, amount, Utc::now())
                            .await
                        {
                            error!(
                                "{:<12} --> 입찰 영속화 실패(수락 유지): item={} {:?}",
                                "Store", item_id, e
                            );
                        }
                        BidResult::accept()
                    }
                    Err(e) => {
                        error!(
                            "{:<12} --> 불변식 위반: 수락된 입찰의 엔진 커밋 실패: {:?}",
                            "Coordinator", e
                        );
                        BidResult::reject("INVARIANT_VIOLATION")
                    }
                }
            }
        };

        // 7. 멱등성 결과 저장 — 같은 키의 재시도는 이 값을 그대로 받는다
        if let Some(key) = &idem {
            if let Err(e) = self.arbiter.store_outcome(key, &outcome).await {
                warn!("{:<12} --> 멱등성 결과 저장 실패: {:?}", "Arbiter", e);
            }
        }

        // 8. 상태 브로드캐스트
        if outcome.accepted {
            let view = self.view_locked(&engine, &auction_id);
            self.hub.publish(&auction_id, ServerEvent::AuctionState(view));
        }
        outcome
    }

    /// 선점 실패한 중복 입찰 — 제한 시간 동안 결과를 폴링한다
    async fn await_duplicate(&self, key: &IdemKey) -> BidResult {
        for _ in 0..IDEM_POLL_ATTEMPTS {
            tokio::time::sleep(IDEM_POLL_INTERVAL).await;
            match self.arbiter.load_outcome(key).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(_) => break,
            }
        }
        BidResult::reject("DUPLICATE_IN_FLIGHT")
    }

    /// 품목 연장 — 판매자만, 품목당 한 번
    /// 남은 시간에 추가 시간을 더할 뿐 전체 시간으로 되돌리지 않는다
    pub async fn extend_item(
        self: &Arc<Self>,
        auction_id: Uuid,
        seller_id: Uuid,
    ) -> Result<AuctionView, ServiceError> {
        let entry = self
            .live_auction(&auction_id)
            .ok_or(ServiceError::NotFound("auction"))?;
        let mut engine = entry.engine.lock().await;

        if engine.state().seller_id != seller_id {
            return Err(ServiceError::PermissionDenied);
        }
        let extra_sec = engine.extend_current_item().map_err(ServiceError::from)?;
        let Some(item_id) = engine.current_item().map(|item| item.item_id) else {
            return Err(ServiceError::InvariantViolation(
                "연장된 품목이 없습니다".to_string(),
            ));
        };

        let remaining = self.scheduler.remaining(&auction_id).unwrap_or_default();
        let ends_at =
            self.arm_item_timer(auction_id, remaining + Duration::from_secs(extra_sec as u64));

        if let Err(e) = self
            .log
            .set_item_status(
                item_id,
                ItemStatus::Live,
                ItemStatusPatch {
                    extended: Some(true),
                    ends_at: Some(ends_at),
                    ..Default::default()
                },
            )
            .await
        {
            error!("{:<12} --> 품목 연장 영속화 실패: {:?}", "Store", e);
        }

        let view = self.view_locked(&engine, &auction_id);
        self.hub
            .publish(&auction_id, ServerEvent::AuctionState(view.clone()));
        info!(
            "{:<12} --> 품목 연장: auction={} item={} extra={}s",
            "Coordinator", auction_id, item_id, extra_sec
        );
        Ok(view)
    }

    /// 타이머 만료 — 품목 종료, 결과 기록, 다음 품목 진행 또는 경매 종료
    pub async fn handle_item_expiry(self: Arc<Self>, auction_id: Uuid) {
        let Some(entry) = self.live_auction(&auction_id) else {
            return;
        };
        let mut engine = entry.engine.lock().await;
        let now = Utc::now();

        // 이중 종료는 엔진 상태 기계가 걸러낸다
        let close = match engine.end_current_item(now) {
            Ok(close) => close,
            Err(e) => {
                warn!(
                    "{:<12} --> 품목 종료 건너뜀: auction={} {:?}",
                    "Coordinator", auction_id, e
                );
                return;
            }
        };

        self.finalize_item_with_retry(close.item_id, close.winner_id, close.final_price, now)
            .await;
        if let Err(e) = self.arbiter.clear_item(auction_id, close.item_id).await {
            warn!("{:<12} --> 품목 키 정리 실패: {:?}", "Arbiter", e);
        }

        info!(
            "{:<12} --> 품목 종료: auction={} item={} winner={:?} price={}",
            "Coordinator", auction_id, close.item_id, close.winner_id, close.final_price
        );
        self.hub.publish(
            &auction_id,
            ServerEvent::ItemSold(ItemSoldPayload {
                item_id: close.item_id,
                winner_id: close.winner_id,
                final_price: close.final_price,
            }),
        );
        self.hub.publish(
            &auction_id,
            ServerEvent::AuctionState(self.view_locked(&engine, &auction_id)),
        );

        match engine.advance_to_next_item(now) {
            Ok(true) => {
                let Some(item) = engine.current_item().cloned() else {
                    error!(
                        "{:<12} --> 불변식 위반: 진행된 품목이 없습니다: auction={}",
                        "Coordinator", auction_id
                    );
                    return;
                };
                if let Err(e) = self
                    .arbiter
                    .seed_item(auction_id, item.item_id, item.starting_price, None)
                    .await
                {
                    error!("{:<12} --> 다음 품목 시드 실패: {:?}", "Arbiter", e);
                }

                let ends_at =
                    self.arm_item_timer(auction_id, Duration::from_secs(item.duration_sec as u64));
                if let Err(e) = self
                    .log
                    .set_item_status(
                        item.item_id,
                        ItemStatus::Live,
                        ItemStatusPatch {
                            ends_at: Some(ends_at),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    error!("{:<12} --> 다음 품목 영속화 실패: {:?}", "Store", e);
                }
                if let Err(e) = self
                    .log
                    .set_auction_status(
                        auction_id,
                        AuctionStatus::Live,
                        AuctionStatusPatch {
                            current_item_index: Some(engine.state().current_item_index as i32),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    error!("{:<12} --> 품목 인덱스 영속화 실패: {:?}", "Store", e);
                }

                self.hub.publish(
                    &auction_id,
                    ServerEvent::AuctionState(self.view_locked(&engine, &auction_id)),
                );
                info!(
                    "{:<12} --> 다음 품목 진행: auction={} index={}",
                    "Coordinator",
                    auction_id,
                    engine.state().current_item_index
                );
            }
            Ok(false) => {
                // 마지막 품목까지 끝났다 — 경매 종결
                let summary = engine.end_auction(now);
                self.finalize_auction_with_retry(auction_id, now, &summary.results)
                    .await;
                if let Err(e) = self.arbiter.clear_auction(auction_id).await {
                    warn!("{:<12} --> 경매 키 정리 실패: {:?}", "Arbiter", e);
                }
                self.scheduler.cancel(&auction_id);

                self.hub.publish(
                    &auction_id,
                    ServerEvent::AuctionEnded(AuctionEndedPayload {
                        auction_id,
                        results: summary.results.clone(),
                    }),
                );
                self.hub.publish(
                    &auction_id,
                    ServerEvent::AuctionState(self.view_locked(&engine, &auction_id)),
                );

                drop(engine);
                self.registry.remove(&auction_id);
                self.hub.drop_room(&auction_id);
                info!("{:<12} --> 경매 종료: id={}", "Coordinator", auction_id);
            }
            Err(e) => {
                error!(
                    "{:<12} --> 불변식 위반: 품목 진행 실패: auction={} {:?}",
                    "Coordinator", auction_id, e
                );
            }
        }
    }

    /// 경매 상태 조회 — 진행 중이면 레지스트리, 아니면 영속 로그
    pub async fn get_state(&self, auction_id: Uuid) -> Result<AuctionView, ServiceError> {
        if let Some(entry) = self.live_auction(&auction_id) {
            let engine = entry.engine.lock().await;
            return Ok(self.view_locked(&engine, &auction_id));
        }
        match self
            .log
            .load_one(auction_id)
            .await
            .map_err(log_unavailable)?
        {
            Some(state) => Ok(AuctionView::from_state(&state, None)),
            None => Err(ServiceError::NotFound("auction")),
        }
    }

    /// 재시작 복구 — 영속 로그에서 활성 경매를 재수화한다
    /// LIVE 경매는 중재자를 다시 시드하고 남은 시간으로 타이머를 재장전한다
    pub async fn recover(self: &Arc<Self>) -> Result<usize, ServiceError> {
        let states = self.log.load_active().await.map_err(log_unavailable)?;
        let count = states.len();

        for state in states {
            let auction_id = state.auction_id;
            let live = state.status == AuctionStatus::Live;
            let current = state.items.get(state.current_item_index).cloned();

            let engine = Engine::restore(state);
            self.registry.insert(
                auction_id,
                Arc::new(LiveAuction {
                    engine: Mutex::new(engine),
                }),
            );

            if !live {
                continue;
            }
            let Some(item) = current else {
                error!(
                    "{:<12} --> 손상된 경매: 현재 품목 없음: id={}",
                    "Recovery", auction_id
                );
                continue;
            };

            if let Err(e) = self
                .arbiter
                .seed_item(auction_id, item.item_id, item.highest_bid, item.highest_bidder_id)
                .await
            {
                error!("{:<12} --> 중재자 재시드 실패: {:?}", "Recovery", e);
            }

            // 영속된 절대 만료 시각에서 남은 시간을 계산한다
            // 기록이 없으면 전체 시간(연장됐으면 추가 시간 포함)으로 되돌아간다
            let now = Utc::now();
            let duration = match item.ends_at {
                Some(ends_at) if ends_at > now => {
                    (ends_at - now).to_std().unwrap_or(Duration::ZERO)
                }
                Some(_) => Duration::ZERO,
                None => {
                    let mut total = item.duration_sec;
                    if item.extended {
                        total += item.extra_duration_sec;
                    }
                    Duration::from_secs(total.max(0) as u64)
                }
            };
            self.arm_item_timer(auction_id, duration);
            info!(
                "{:<12} --> 경매 복구: id={} item={} 남은 시간={:?}",
                "Recovery", auction_id, item.item_id, duration
            );
        }

        info!("{:<12} --> 활성 경매 {}건 복구 완료", "Recovery", count);
        Ok(count)
    }

    /// 타이머 장전 — 만료 시 코디네이터로 재진입한다
    /// 코디네이터가 이미 내려갔으면 콜백은 아무 일도 하지 않는다
    fn arm_item_timer(
        self: &Arc<Self>,
        auction_id: Uuid,
        duration: Duration,
    ) -> chrono::DateTime<Utc> {
        let weak = Arc::downgrade(self);
        self.scheduler.arm(auction_id, duration, async move {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.handle_item_expiry(auction_id).await;
            }
        })
    }

    async fn finalize_item_with_retry(
        &self,
        item_id: Uuid,
        winner_id: Option<Uuid>,
        final_price: i64,
        sold_at: chrono::DateTime<Utc>,
    ) {
        for attempt in 1..=FINALIZE_RETRIES {
            match self
                .log
                .finalize_item(item_id, winner_id, final_price, sold_at)
                .await
            {
                Ok(()) => return,
                Err(e) if attempt < FINALIZE_RETRIES => {
                    warn!(
                        "{:<12} --> 품목 종결 기록 재시도({}/{}): {:?}",
                        "Store", attempt, FINALIZE_RETRIES, e
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF).await;
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 품목 종결 기록 실패: item={} {:?}",
                        "Store", item_id, e
                    );
                }
            }
        }
    }

    async fn finalize_auction_with_retry(
        &self,
        auction_id: Uuid,
        ended_at: chrono::DateTime<Utc>,
        results: &[crate::auction::ItemOutcome],
    ) {
        for attempt in 1..=FINALIZE_RETRIES {
            match self.log.finalize_auction(auction_id, ended_at, results).await {
                Ok(()) => return,
                Err(e) if attempt < FINALIZE_RETRIES => {
                    warn!(
                        "{:<12} --> 경매 종결 기록 재시도({}/{}): {:?}",
                        "Store", attempt, FINALIZE_RETRIES, e
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF).await;
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 경매 종결 기록 실패: id={} {:?}",
                        "Store", auction_id, e
                    );
                }
            }
        }
    }
}

// endregion: --- Coordinator
