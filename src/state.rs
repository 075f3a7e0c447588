//! Shared application state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        account_store::AccountStore,
        folder_service::FolderService,
        image_index::ImageIndex,
        image_service::{ImageService, ImageSettings},
        pin_auth::PinAuthenticator,
        rate_limiter::RateLimiter,
        selector::RandomSelector,
        session_store::SessionStore,
    },
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: Arc<ImageIndex>,
    pub selector: Arc<RandomSelector>,
    pub accounts: Arc<AccountStore>,
    pub pin_auth: PinAuthenticator,
    pub sessions: Arc<SessionStore>,
    pub images: ImageService,
    pub folders: FolderService,
}

impl AppState {
    /// Wire up every service from `config`. Does no I/O; see
    /// [`AppState::prepare_storage`].
    pub fn new(config: AppConfig) -> Self {
        let index = Arc::new(ImageIndex::new(
            config.content_dir.clone(),
            config.image_cache_expiry(),
        ));
        let accounts = Arc::new(AccountStore::new(config.accounts_file()));
        let images = ImageService::new(
            ImageSettings {
                root: config.content_dir.clone(),
                upload_folder: config.upload_folder.clone(),
                jpeg_quality: config.image_quality,
                max_upload_bytes: config.max_upload_bytes,
            },
            index.clone(),
        );

        Self {
            selector: Arc::new(RandomSelector::new(config.max_recent_images)),
            pin_auth: PinAuthenticator::new(
                accounts.clone(),
                Arc::new(RateLimiter::new(config.rate_limit())),
            ),
            folders: FolderService::new(config.content_dir.clone(), index.clone()),
            sessions: Arc::new(SessionStore::default()),
            images,
            index,
            accounts,
            config: Arc::new(config),
        }
    }

    /// Create the content root, startup folders and the accounts file.
    pub async fn prepare_storage(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        self.folders
            .ensure_folders(&self.config.startup_folders())
            .await
            .with_context(|| {
                format!(
                    "creating content directory {}",
                    self.config.content_dir.display()
                )
            })?;
        self.accounts
            .init()
            .await
            .with_context(|| format!("initializing {}", self.accounts.path().display()))?;
        Ok(())
    }
}
