use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Where signed files are written
    pub upload_dir: PathBuf,
    /// JSON array of directory users
    pub users_file: PathBuf,
    /// Base URL of the web app, used for links in notifications
    pub frontend_url: String,
    pub persist_interval: Duration,
    /// Bound on every directory and blob store call
    pub io_timeout: Duration,
    pub max_upload_bytes: usize,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("uploads")),
            users_file: env::var("USERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("users.json")),
            data_dir,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            persist_interval: Duration::from_secs(
                env::var("PERSIST_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            io_timeout: Duration::from_secs(
                env::var("IO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20 * 1024 * 1024),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
