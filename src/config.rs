//! Configuration management for keepsake.
//!
//! Loads configuration from environment variables (and a `.env` file if
//! present). The cloud section ships with placeholder values; as long as
//! they are not replaced the gallery runs against the local store only.

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

/// Placeholder endpoint shipped in the sample configuration.
pub const PLACEHOLDER_ENDPOINT: &str = "https://your-project.supabase.co";

/// Placeholder credential shipped in the sample configuration.
pub const PLACEHOLDER_CREDENTIAL: &str = "your-anon-key";

/// MIME types accepted for upload unless overridden.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/mov",
    "video/avi",
    "video/mkv",
    "application/pdf",
    "text/plain",
    "application/zip",
    "application/x-rar-compressed",
];

/// 50 MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub cloud: CloudConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoint: String,
    pub credential: String,
    pub bucket_name: String,
    pub tables: TableNames,
}

#[derive(Debug, Clone)]
pub struct TableNames {
    pub memories: String,
    pub folders: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            memories: "memories".to_string(),
            folders: "folders".to_string(),
        }
    }
}

impl CloudConfig {
    /// Cloud settings pointing at `endpoint` with default bucket and tables.
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            bucket_name: "memories".to_string(),
            tables: TableNames::default(),
        }
    }

    /// Whether endpoint and credential look like real values.
    ///
    /// Empty strings, non-http endpoints and the sample placeholders all
    /// count as "not configured".
    pub fn is_configured(&self) -> bool {
        let endpoint = self.endpoint.trim();
        let credential = self.credential.trim();

        if endpoint.is_empty() || credential.is_empty() {
            return false;
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return false;
        }
        if endpoint == PLACEHOLDER_ENDPOINT || credential == PLACEHOLDER_CREDENTIAL {
            return false;
        }
        !(endpoint.contains("your-project") || credential.starts_with("your-"))
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the local collections.
    pub data_dir: String,
    /// Optional byte quota for local persistence.
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_SYNC_INTERVAL_MS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "8780").parse().unwrap_or(8780),
            },
            cloud: CloudConfig {
                endpoint: env_or("CLOUD_ENDPOINT", PLACEHOLDER_ENDPOINT),
                credential: env_or("CLOUD_CREDENTIAL", PLACEHOLDER_CREDENTIAL),
                bucket_name: env_or("CLOUD_BUCKET", "memories"),
                tables: TableNames {
                    memories: env_or("CLOUD_MEMORIES_TABLE", "memories"),
                    folders: env_or("CLOUD_FOLDERS_TABLE", "folders"),
                },
            },
            storage: StorageConfig {
                data_dir: env_or("DATA_DIR", "./data"),
                quota_bytes: env::var("LOCAL_QUOTA_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
            upload: UploadConfig {
                max_file_size: env_or("MAX_FILE_SIZE", &DEFAULT_MAX_FILE_SIZE.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_MAX_FILE_SIZE),
                allowed_mime_types: env::var("ALLOWED_MIME_TYPES")
                    .map(|v| parse_list(&v))
                    .unwrap_or_else(|_| UploadConfig::default().allowed_mime_types),
            },
            sync: SyncConfig {
                enabled: env_or("SYNC_ENABLED", "true").to_lowercase() != "false",
                interval_ms: env_or("SYNC_INTERVAL_MS", &DEFAULT_SYNC_INTERVAL_MS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_SYNC_INTERVAL_MS),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Split a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PLACEHOLDER_ENDPOINT, PLACEHOLDER_CREDENTIAL, false)]
    #[case("https://abc.supabase.co", PLACEHOLDER_CREDENTIAL, false)]
    #[case("https://your-project-id.supabase.co", "real-key", false)]
    #[case("", "real-key", false)]
    #[case("https://abc.supabase.co", "  ", false)]
    #[case("abc.supabase.co", "real-key", false)]
    #[case("https://abc.supabase.co", "eyJhbGciOi", true)]
    #[case("http://127.0.0.1:54321", "local-dev-key", true)]
    fn test_cloud_is_configured(
        #[case] endpoint: &str,
        #[case] credential: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(CloudConfig::new(endpoint, credential).is_configured(), expected);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("image/png, video/mp4,,"),
            vec!["image/png".to_string(), "video/mp4".to_string()]
        );
    }

    #[test]
    fn test_default_upload_config() {
        let upload = UploadConfig::default();
        assert_eq!(upload.max_file_size, 50 * 1024 * 1024);
        assert!(upload.allowed_mime_types.iter().any(|m| m == "image/png"));
    }
}
