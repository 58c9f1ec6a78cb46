/// 품목 만료 스케줄러
/// 경매당 단발성 타이머 하나를 유지한다. 연장 시에는 남은 시간에
/// 추가 시간을 더해 다시 장전할 뿐, 전체 시간으로 되돌리지 않는다.
// region:    --- Imports
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Item Scheduler

struct ItemTimer {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// 경매별 단발성 품목 만료 타이머
#[derive(Default)]
pub struct ItemScheduler {
    timers: DashMap<Uuid, ItemTimer>,
}

impl ItemScheduler {
    pub fn new() -> Self {
        ItemScheduler {
            timers: DashMap::new(),
        }
    }

    /// 타이머 장전 — 기존 타이머는 취소되고 교체된다
    /// 반환값은 절대 만료 시각 (영속 계층이 기록한다)
    pub fn arm<F>(&self, auction_id: Uuid, duration: Duration, task: F) -> DateTime<Utc>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + duration;
        let ends_at = Utc::now()
            + ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });

        if let Some(previous) = self.timers.insert(auction_id, ItemTimer { handle, deadline }) {
            previous.handle.abort();
        }
        debug!(
            "{:<12} --> 타이머 장전: auction={} duration={:?}",
            "Scheduler", auction_id, duration
        );
        ends_at
    }

    /// 남은 시간 — 이미 만료되었으면 0
    pub fn remaining(&self, auction_id: &Uuid) -> Option<Duration> {
        self.timers
            .get(auction_id)
            .map(|timer| timer.deadline.saturating_duration_since(Instant::now()))
    }

    /// 카운트다운 렌더링용 절대 만료 시각 (epoch ms)
    pub fn end_time_ms(&self, auction_id: &Uuid) -> Option<i64> {
        self.remaining(auction_id).map(|remaining| {
            let remaining =
                ChronoDuration::from_std(remaining).unwrap_or_else(|_| ChronoDuration::zero());
            (Utc::now() + remaining).timestamp_millis()
        })
    }

    /// 타이머 취소
    pub fn cancel(&self, auction_id: &Uuid) {
        if let Some((_, timer)) = self.timers.remove(auction_id) {
            timer.handle.abort();
            debug!("{:<12} --> 타이머 취소: auction={}", "Scheduler", auction_id);
        }
    }
}

// endregion: --- Item Scheduler

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_duration() {
        let scheduler = ItemScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler.arm(Uuid::new_v4(), Duration::from_secs(60), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_adds_to_remaining() {
        let scheduler = ItemScheduler::new();
        let auction_id = Uuid::new_v4();
        let fired = Arc::new(AtomicBool::new(false));

        scheduler.arm(auction_id, Duration::from_secs(60), async {});

        // 45초 경과 — 남은 시간 15초에 15초를 더해 재장전
        tokio::time::sleep(Duration::from_secs(45)).await;
        let remaining = scheduler.remaining(&auction_id).unwrap();
        assert_eq!(remaining.as_secs(), 15);

        let flag = Arc::clone(&fired);
        scheduler.arm(auction_id, remaining + Duration::from_secs(15), async move {
            flag.store(true, Ordering::SeqCst);
        });

        // 전체 시간으로 돌아갔다면 아직 멀었고, 남은+추가라면 30초 뒤 만료
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let scheduler = ItemScheduler::new();
        let auction_id = Uuid::new_v4();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler.arm(auction_id, Duration::from_secs(10), async move {
            flag.store(true, Ordering::SeqCst);
        });
        scheduler.cancel(&auction_id);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(scheduler.remaining(&auction_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = ItemScheduler::new();
        let auction_id = Uuid::new_v4();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        scheduler.arm(auction_id, Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });
        // 교체 — 이전 타이머는 절대 발화하지 않는다
        scheduler.arm(auction_id, Duration::from_secs(60), async {});

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}

// endregion: --- Tests
