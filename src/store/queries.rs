/// 경매 생성
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (id, seller_id, status, current_item_index, max_duration_sec, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

/// 품목 생성
pub const INSERT_ITEM: &str = r#"
    INSERT INTO auction_items
        (id, auction_id, item_order, name, starting_price, duration_sec,
         extra_duration_sec, status, highest_bid, highest_bidder_id, extended)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
"#;

/// 경매 상태 갱신 — 패치에 없는 필드는 기존 값 유지
pub const SET_AUCTION_STATUS: &str = r#"
    UPDATE auctions
    SET status = $2,
        started_at = COALESCE($3, started_at),
        ended_at = COALESCE($4, ended_at),
        current_item_index = COALESCE($5, current_item_index)
    WHERE id = $1
"#;

/// 품목 상태 갱신 — 패치에 없는 필드는 기존 값 유지
pub const SET_ITEM_STATUS: &str = r#"
    UPDATE auction_items
    SET status = $2,
        highest_bid = COALESCE($3, highest_bid),
        highest_bidder_id = COALESCE($4, highest_bidder_id),
        extended = COALESCE($5, extended),
        sold_at = COALESCE($6, sold_at),
        ends_at = COALESCE($7, ends_at)
    WHERE id = $1
"#;

/// 입찰 기록 추가
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (id, auction_id, item_id, bidder_id, amount, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

/// 입찰 반영 — 품목 최고가 갱신
pub const UPDATE_ITEM_HIGHEST: &str =
    "UPDATE auction_items SET highest_bid = $2, highest_bidder_id = $3 WHERE id = $1";

/// 품목 종결
pub const FINALIZE_ITEM: &str =
    "UPDATE auction_items SET status = $2, sold_at = COALESCE($3, sold_at) WHERE id = $1";

/// 낙찰 결과 기록 — 이미 기록된 행은 보존한다
pub const INSERT_ITEM_RESULT: &str = r#"
    INSERT INTO item_results (item_id, winner_id, final_price, sold_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (item_id) DO NOTHING
"#;

/// 경매 종결
pub const FINALIZE_AUCTION: &str =
    "UPDATE auctions SET status = 'ENDED', ended_at = $2 WHERE id = $1";

/// 종료되지 않은 경매 조회 (복구용)
pub const SELECT_ACTIVE_AUCTIONS: &str = r#"
    SELECT id, seller_id, status, current_item_index, max_duration_sec,
           created_at, started_at, ended_at
    FROM auctions
    WHERE status != 'ENDED'
    ORDER BY created_at
"#;

/// 경매 단건 조회
pub const SELECT_AUCTION: &str = r#"
    SELECT id, seller_id, status, current_item_index, max_duration_sec,
           created_at, started_at, ended_at
    FROM auctions
    WHERE id = $1
"#;

/// 경매의 품목 조회 (순서대로)
pub const SELECT_ITEMS: &str = r#"
    SELECT id, auction_id, item_order, name, starting_price, duration_sec,
           extra_duration_sec, status, highest_bid, highest_bidder_id,
           extended, sold_at, ends_at
    FROM auction_items
    WHERE auction_id = $1
    ORDER BY item_order
"#;

/// 경매 목록 요약 조회
pub const SELECT_LISTINGS: &str = r#"
    SELECT a.id, a.seller_id, a.status, a.created_at,
           u.display_name AS seller_name,
           (SELECT i.name FROM auction_items i
            WHERE i.auction_id = a.id ORDER BY i.item_order LIMIT 1) AS first_item_name,
           (SELECT COUNT(*) FROM auction_items i
            WHERE i.auction_id = a.id) AS item_count
    FROM auctions a
    JOIN users u ON u.id = a.seller_id
    ORDER BY a.created_at DESC
"#;

/// 사용자 upsert — 최초 접속 시 생성, 표시 이름 변경 반영
pub const UPSERT_USER: &str = r#"
    INSERT INTO users (id, display_name)
    VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name, updated_at = now()
"#;

/// 사용자 존재 확인
pub const USER_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)";
