use super::{required_var, ConfigError};
use std::env;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// 認証プロバイダがトークン署名に使う共有シークレット
    pub jwt_secret: String,
    pub jwt_audience: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub body_limit: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub database_url: String,
    /// チェックアウト・ポータルの戻り先URLの基点
    pub site_url: String,
    pub auth: AuthConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                reason: "must be a valid port number".to_string(),
            })?;

        Ok(Self {
            environment,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            cors_allowed_origins: parse_origins(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            database_url: required_var("DATABASE_URL")?,
            site_url: trim_site_url(
                &env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            auth: AuthConfig {
                jwt_secret: required_var("AUTH_JWT_SECRET")?,
                jwt_audience: env::var("AUTH_JWT_AUDIENCE")
                    .unwrap_or_else(|_| "authenticated".to_string()),
            },
            server: ServerConfig {
                body_limit: 1024 * 1024, // 1MB（Webhookペイロードには十分）
            },
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// テスト用の設定を作成
    pub fn for_testing() -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            database_url: "sqlite::memory:".to_string(),
            site_url: "http://localhost:3000".to_string(),
            auth: AuthConfig {
                jwt_secret: "test-auth-secret-that-is-at-least-32-characters".to_string(),
                jwt_audience: "authenticated".to_string(),
            },
            server: ServerConfig {
                body_limit: 1024 * 1024,
            },
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// 末尾のスラッシュを除去して "{site_url}/dashboard" の形で連結できるようにする
fn trim_site_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
