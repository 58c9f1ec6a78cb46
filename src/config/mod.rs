// region:    --- Imports
use tracing::info;
// endregion: --- Imports

// region:    --- Config

/// 환경 변수 기반 서비스 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub arbiter_url: String,
    pub cors_origins: Vec<String>,
    pub identity_secret: String,
    pub video_app_id: String,
    pub video_app_cert: String,
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        // 중재자 저장소는 기본적으로 메인 데이터베이스 인스턴스를 공유한다
        let arbiter_url = std::env::var("ARBITER_URL").unwrap_or_else(|_| database_url.clone());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Config {
            port,
            database_url,
            arbiter_url,
            cors_origins,
            // 외부 협력자(신원 검증, 영상 토큰 발급)용 설정
            identity_secret: std::env::var("IDENTITY_SECRET").unwrap_or_default(),
            video_app_id: std::env::var("VIDEO_APP_ID").unwrap_or_default(),
            video_app_cert: std::env::var("VIDEO_APP_CERT").unwrap_or_default(),
        };

        info!("{:<12} --> 설정 로드 완료: port={}", "Config", config.port);
        config
    }
}

// endregion: --- Config
