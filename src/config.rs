use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub media_bucket: String,
    pub media_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let media_bucket =
            env::var("MEDIA_BUCKET").unwrap_or_else(|_| "marketplace-chat-media".into());
        let media_base_url = env::var("MEDIA_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("https://{media_bucket}.s3.amazonaws.com"));

        Ok(Self {
            database_url,
            port,
            media_bucket,
            media_base_url,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/chat_test".into(),
            port: 3000,
            media_bucket: "chat-test".into(),
            media_base_url: "https://chat-test.s3.amazonaws.com".into(),
        }
    }
}
