use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub data_path: PathBuf,
    pub admin_secret: String,
    pub vapid_subject: String,
    /// Seconds the push service keeps an undelivered message.
    pub vapid_ttl: u32,
    pub push_timeout: Duration,
    pub fanout_concurrency: usize,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_path: "herald.json".into(),
            admin_secret: "test-secret".to_string(),
            vapid_subject: "mailto:admin@example.com".to_string(),
            vapid_ttl: 259_200,
            push_timeout: Duration::from_secs(10),
            fanout_concurrency: 8,
        }
    }
}
