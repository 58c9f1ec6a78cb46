/// 브로드캐스트 허브
/// "auction:<id>" 룸 단위로 서버 이벤트를 구독자에게 팬아웃한다.
/// 전송 계층에 독립적이며, 한 경매의 이벤트는 발행 순서 그대로 전달된다.
// region:    --- Imports
use crate::auction::events::ServerEvent;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Broadcast Hub

/// 룸당 브로드캐스트 채널 버퍼 크기
pub const DEFAULT_ROOM_CAPACITY: usize = 256;

pub struct BroadcastHub {
    rooms: DashMap<String, broadcast::Sender<ServerEvent>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BroadcastHub {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// 경매의 룸 이름
    pub fn room(auction_id: &Uuid) -> String {
        format!("auction:{}", auction_id)
    }

    /// 룸 구독 — 필요하면 룸을 만든다
    pub fn subscribe(&self, auction_id: &Uuid) -> broadcast::Receiver<ServerEvent> {
        self.rooms
            .entry(Self::room(auction_id))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 이벤트 발행 — 수신자 수를 돌려주고, 수신자가 없으면 조용히 버린다
    pub fn publish(&self, auction_id: &Uuid, event: ServerEvent) -> usize {
        let room = Self::room(auction_id);
        match self.rooms.get(&room) {
            Some(sender) if sender.receiver_count() > 0 => sender.send(event).unwrap_or(0),
            _ => {
                debug!("{:<12} --> 수신자 없는 이벤트 폐기: room={}", "Hub", room);
                0
            }
        }
    }

    /// 경매 종료 후 룸 제거 — 버퍼에 남은 이벤트는 구독자가 마저 읽는다
    pub fn drop_room(&self, auction_id: &Uuid) {
        self.rooms.remove(&Self::room(auction_id));
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

// endregion: --- Broadcast Hub

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::events::ItemSoldPayload;

    fn item_sold(price: i64) -> ServerEvent {
        ServerEvent::ItemSold(ItemSoldPayload {
            item_id: Uuid::new_v4(),
            winner_id: None,
            final_price: price,
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_room_subscribers_in_order() {
        let hub = BroadcastHub::new();
        let auction_id = Uuid::new_v4();
        let mut rx = hub.subscribe(&auction_id);

        assert_eq!(hub.publish(&auction_id, item_sold(1)), 1);
        assert_eq!(hub.publish(&auction_id, item_sold(2)), 1);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ServerEvent::ItemSold(p) if p.final_price == 1));
        assert!(matches!(second, ServerEvent::ItemSold(p) if p.final_price == 2));
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = BroadcastHub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rx_a = hub.subscribe(&a);
        let _rx_b = hub.subscribe(&b);

        hub.publish(&b, item_sold(7));
        assert!(matches!(
            rx_a.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_drops() {
        let hub = BroadcastHub::new();
        let auction_id = Uuid::new_v4();
        assert_eq!(hub.publish(&auction_id, item_sold(3)), 0);
    }

    #[tokio::test]
    async fn test_drop_room_still_delivers_buffered_events() {
        let hub = BroadcastHub::new();
        let auction_id = Uuid::new_v4();
        let mut rx = hub.subscribe(&auction_id);

        hub.publish(&auction_id, item_sold(9));
        hub.drop_room(&auction_id);
        assert_eq!(hub.room_count(), 0);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::ItemSold(p) if p.final_price == 9));
    }
}

// endregion: --- Tests
