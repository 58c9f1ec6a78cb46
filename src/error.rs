// region:    --- Imports
use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
// endregion: --- Imports

// region:    --- Service Error

/// 서비스 전역 오류 종류
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("대상을 찾을 수 없습니다: {0}")]
    NotFound(&'static str),

    #[error("권한이 없습니다")]
    PermissionDenied,

    #[error("허용되지 않는 상태 전이입니다: {0}")]
    IllegalTransition(String),

    #[error("입찰 금액이 현재 최고가({0}) 이하입니다")]
    BidTooLow(i64),

    #[error("다른 입찰자에게 선점되었습니다")]
    OutpacedByAnother,

    #[error("동일한 입찰이 이미 처리 중입니다")]
    DuplicateInFlight,

    #[error("불변식 위반: {0}")]
    InvariantViolation(String),

    #[error("영속화 실패: {0}")]
    PersistFailed(String),

    #[error("저장소를 사용할 수 없습니다: {0}")]
    Unavailable(String),

    #[error("잘못된 요청입니다: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// 머신 판독용 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::PermissionDenied => "PERMISSION_DENIED",
            ServiceError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            ServiceError::BidTooLow(_) => "BID_TOO_LOW",
            ServiceError::OutpacedByAnother => "OUTPACED_BY_ANOTHER",
            ServiceError::DuplicateInFlight => "DUPLICATE_IN_FLIGHT",
            ServiceError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            ServiceError::PersistFailed(_) => "PERSIST_FAILED",
            ServiceError::Unavailable(_) => "UNAVAILABLE",
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            // 판매자 아님 거절도 연장 엔드포인트 규약상 400으로 내려간다
            ServiceError::PermissionDenied
            | ServiceError::IllegalTransition(_)
            | ServiceError::BidTooLow(_)
            | ServiceError::OutpacedByAnother
            | ServiceError::DuplicateInFlight
            | ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvariantViolation(_) | ServiceError::PersistFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::IllegalTransition(msg) => ServiceError::IllegalTransition(msg.to_string()),
            EngineError::NotLive => {
                ServiceError::IllegalTransition("경매가 진행 중이 아닙니다".to_string())
            }
            EngineError::NoLiveItem => {
                ServiceError::IllegalTransition("진행 중인 품목이 없습니다".to_string())
            }
            EngineError::BidTooLow { highest } => ServiceError::BidTooLow(highest),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({ "error": self.to_string(), "code": self.code() })),
        )
            .into_response()
    }
}

// endregion: --- Service Error
