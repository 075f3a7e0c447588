use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::services::rate_limiter::RateLimitConfig;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub content_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Plain text, or a bcrypt hash (`$2...`).
    pub admin_password: String,
    pub max_recent_images: usize,
    pub image_cache_expiry_ms: u64,
    pub image_quality: u8,
    pub upload_folder: String,
    pub default_folders: Vec<String>,
    pub max_upload_bytes: u64,
    /// Key rate limiting on the last `X-Forwarded-For` hop instead of the
    /// socket peer. Only for deployments behind one reverse proxy.
    pub trust_proxy: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Photo frame and event photo sharing server")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_FRAME_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_FRAME_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding the photo library (overrides PHOTO_FRAME_CONTENT_DIR)
    #[arg(long)]
    pub content_dir: Option<PathBuf>,

    /// Directory for persisted state such as access accounts
    /// (overrides PHOTO_FRAME_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Folder that receives uploads (overrides PHOTO_FRAME_UPLOAD_FOLDER)
    #[arg(long)]
    pub upload_folder: Option<String>,

    /// Images excluded from repeat selection (overrides PHOTO_FRAME_MAX_RECENT_IMAGES)
    #[arg(long)]
    pub max_recent_images: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            content_dir: PathBuf::from("./uploads"),
            data_dir: PathBuf::from("./data"),
            admin_password: DEFAULT_ADMIN_PASSWORD.into(),
            max_recent_images: 10,
            image_cache_expiry_ms: 60_000,
            image_quality: 85,
            upload_folder: "evento".into(),
            default_folders: ["family", "vacation", "holidays", "misc"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_upload_bytes: 10 * 1024 * 1024,
            trust_proxy: false,
        }
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    fn merge(args: Args) -> Result<Self> {
        let defaults = Self::default();

        // --- Environment fallback ---
        let env_host = env::var("PHOTO_FRAME_HOST").unwrap_or(defaults.host);
        let env_port = env_parse("PHOTO_FRAME_PORT")?.unwrap_or(defaults.port);
        let env_content = env::var("PHOTO_FRAME_CONTENT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.content_dir);
        let env_data = env::var("PHOTO_FRAME_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let env_upload = env::var("PHOTO_FRAME_UPLOAD_FOLDER").unwrap_or(defaults.upload_folder);
        let env_recent =
            env_parse("PHOTO_FRAME_MAX_RECENT_IMAGES")?.unwrap_or(defaults.max_recent_images);

        let admin_password = match env::var("PHOTO_FRAME_ADMIN_PASSWORD") {
            Ok(value) if !value.is_empty() => value,
            _ => {
                tracing::warn!(
                    "PHOTO_FRAME_ADMIN_PASSWORD not set, using the built-in default password"
                );
                defaults.admin_password
            }
        };

        let default_folders = match env::var("PHOTO_FRAME_DEFAULT_FOLDERS") {
            Ok(value) => parse_folder_list(&value),
            Err(_) => defaults.default_folders,
        };

        let image_quality: u8 =
            env_parse("PHOTO_FRAME_IMAGE_QUALITY")?.unwrap_or(defaults.image_quality);
        if !(1..=100).contains(&image_quality) {
            anyhow::bail!("PHOTO_FRAME_IMAGE_QUALITY must be between 1 and 100");
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            content_dir: args.content_dir.unwrap_or(env_content),
            data_dir: args.data_dir.unwrap_or(env_data),
            admin_password,
            max_recent_images: args.max_recent_images.unwrap_or(env_recent),
            image_cache_expiry_ms: env_parse("PHOTO_FRAME_IMAGE_CACHE_EXPIRY_MS")?
                .unwrap_or(defaults.image_cache_expiry_ms),
            image_quality,
            upload_folder: args
                .upload_folder
                .unwrap_or(env_upload)
                .trim_matches('/')
                .to_string(),
            default_folders,
            max_upload_bytes: env_parse("PHOTO_FRAME_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            trust_proxy: env_parse("PHOTO_FRAME_TRUST_PROXY")?.unwrap_or(defaults.trust_proxy),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.data_dir.join("access-accounts.json")
    }

    pub fn image_cache_expiry(&self) -> Duration {
        Duration::from_millis(self.image_cache_expiry_ms)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }

    /// Folders created at startup: the defaults plus the upload folder.
    pub fn startup_folders(&self) -> Vec<String> {
        let mut folders = self.default_folders.clone();
        if !self.upload_folder.is_empty() && !folders.contains(&self.upload_folder) {
            folders.push(self.upload_folder.clone());
        }
        folders
    }
}

/// Read and parse `key`. Unset is `None`; a value that does not parse is an
/// error naming the variable.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn parse_folder_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|f| f.trim().trim_matches('/'))
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}
