/// 실시간 게이트웨이
/// 접속 한 건마다 세션에 묶인 사용자 신원으로 룸 구독과 입찰을 처리한다.
/// 핸드셰이크 앞의 베어러 토큰 검증은 외부 신원 제공자 몫이다.
// region:    --- Imports
use crate::auction::events::ServerEvent;
use crate::auction::BidResult;
use crate::handlers::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Messages

/// 접속 파라미터 — 세션에 묶이는 사용자 신원
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub user_id: Uuid,
    pub display_name: Option<String>,
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinAuction {
        auction_id: Uuid,
    },
    LeaveAuction {
        auction_id: Uuid,
    },
    PlaceBid {
        auction_id: Uuid,
        amount: i64,
        idempotency_key: Option<String>,
    },
}

fn bid_result_message(result: &BidResult) -> String {
    json!({ "type": "bid_result", "data": result }).to_string()
}

fn error_message(message: &str) -> String {
    json!({ "type": "error", "data": { "message": message } }).to_string()
}

// endregion: --- Messages

// region:    --- WebSocket Handler

/// 실시간 채널 업그레이드
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, params, socket))
}

async fn handle_connection(state: AppState, params: ConnectParams, socket: WebSocket) {
    let user_id = params.user_id;
    let display_name = params
        .display_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("user-{}", &user_id.to_string()[..8]));

    let (mut ws_tx, ws_rx) = socket.split();

    // 최초 접속 시 사용자 upsert — 표시 이름 충돌이면 접속을 닫는다
    if let Err(e) = state.log.upsert_user(user_id, &display_name).await {
        warn!("{:<12} --> 사용자 upsert 실패: user={} {:?}", "Gateway", user_id, e);
        let _ = ws_tx
            .send(Message::Text(error_message("사용자 등록에 실패했습니다")))
            .await;
        return;
    }
    info!(
        "{:<12} --> 실시간 채널 접속: user={} name={}",
        "Gateway", user_id, display_name
    );

    // 발신은 단일 태스크로 직렬화한다
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let send_task: JoinHandle<()> = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut rooms: HashMap<Uuid, JoinHandle<()>> = HashMap::new();
    read_loop(&state, user_id, ws_rx, &out_tx, &mut rooms).await;

    // 접속 종료 정리
    for (_, forward) in rooms.drain() {
        forward.abort();
    }
    send_task.abort();
    info!("{:<12} --> 실시간 채널 종료: user={}", "Gateway", user_id);
}

async fn read_loop(
    state: &AppState,
    user_id: Uuid,
    mut ws_rx: SplitStream<WebSocket>,
    out_tx: &mpsc::Sender<String>,
    rooms: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    handle_client_message(state, user_id, message, out_tx, rooms).await;
                }
                Err(e) => {
                    let _ = out_tx
                        .send(error_message(&format!("잘못된 메시지 형식입니다: {}", e)))
                        .await;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("{:<12} --> 클라이언트 종료: user={}", "Gateway", user_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("{:<12} --> 소켓 오류: user={} {}", "Gateway", user_id, e);
                break;
            }
        }
    }
}

async fn handle_client_message(
    state: &AppState,
    user_id: Uuid,
    message: ClientMessage,
    out_tx: &mpsc::Sender<String>,
    rooms: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    match message {
        ClientMessage::JoinAuction { auction_id } => {
            if rooms.contains_key(&auction_id) {
                return;
            }
            let receiver = state.hub.subscribe(&auction_id);
            let forward = spawn_room_forward(receiver, out_tx.clone());
            rooms.insert(auction_id, forward);
            debug!(
                "{:<12} --> 룸 입장: user={} auction={}",
                "Gateway", user_id, auction_id
            );

            // 입장 직후 현재 상태를 내려준다
            match state.coordinator.get_state(auction_id).await {
                Ok(view) => {
                    if let Ok(text) = serde_json::to_string(&ServerEvent::AuctionState(view)) {
                        let _ = out_tx.send(text).await;
                    }
                }
                Err(e) => {
                    let _ = out_tx.send(error_message(&e.to_string())).await;
                }
            }
        }
        ClientMessage::LeaveAuction { auction_id } => {
            if let Some(forward) = rooms.remove(&auction_id) {
                forward.abort();
                debug!(
                    "{:<12} --> 룸 퇴장: user={} auction={}",
                    "Gateway", user_id, auction_id
                );
            }
        }
        ClientMessage::PlaceBid {
            auction_id,
            amount,
            idempotency_key,
        } => {
            let result = state
                .coordinator
                .place_bid(auction_id, user_id, amount, idempotency_key)
                .await;
            let _ = out_tx.send(bid_result_message(&result)).await;
        }
    }
}

/// 룸 이벤트를 접속의 발신 큐로 중계한다
fn spawn_room_forward(
    mut receiver: broadcast::Receiver<ServerEvent>,
    out_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if out_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{:<12} --> 느린 구독자: {}건 유실", "Gateway", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// endregion: --- WebSocket Handler

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let auction_id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"place_bid","auctionId":"{}","amount":150,"idempotencyKey":"k1"}}"#,
            auction_id
        );
        let message: ClientMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(
            message,
            ClientMessage::PlaceBid { auction_id: aid, amount: 150, idempotency_key: Some(ref k) }
                if aid == auction_id && k == "k1"
        ));

        let text = format!(r#"{{"type":"join_auction","auctionId":"{}"}}"#, auction_id);
        let message: ClientMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(message, ClientMessage::JoinAuction { .. }));
    }

    #[test]
    fn test_bid_result_message_shape() {
        let text = bid_result_message(&BidResult::reject("BID_TOO_LOW"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "bid_result");
        assert_eq!(value["data"]["accepted"], false);
        assert_eq!(value["data"]["reason"], "BID_TOO_LOW");
    }
}

// endregion: --- Tests
