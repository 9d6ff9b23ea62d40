use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdfilter_api::mangadex::http_client;
use mdfilter_api::{AuthClient, MangaDexClient};
use mdfilter_core::config::AppConfig;
use mdfilter_core::engine::{FilterEngine, SettlePolicy};
use mdfilter_core::page::MemoryPage;
use mdfilter_core::store::{CredentialStore, FileStore};
use mdfilter_runtime::Runtime;

use crate::host::TerminalHost;

pub type CliRuntime = Runtime<MangaDexClient, MemoryPage, TerminalHost>;

/// Everything a subcommand needs, wired from the config and settings files.
pub struct App {
    pub config: AppConfig,
    pub settings_path: PathBuf,
    pub store: CredentialStore,
    pub client: Arc<MangaDexClient>,
}

impl App {
    pub fn load(settings: Option<&Path>) -> anyhow::Result<Self> {
        let config = AppConfig::load()?;
        let kv = match settings {
            Some(path) => FileStore::open(path)?,
            None => FileStore::open_default()?,
        };
        let settings_path = kv.path().to_path_buf();
        let store = CredentialStore::new(Arc::new(kv));

        let http = http_client(config.api.request_timeout())?;
        let auth = AuthClient::new(http.clone(), store.credentials())
            .with_token_url(&config.api.token_url)
            .with_session_ttl(config.api.session_ttl());
        let client = MangaDexClient::new(Arc::new(auth), http).with_base_url(&config.api.base_url);

        Ok(Self {
            config,
            settings_path,
            store,
            client: Arc::new(client),
        })
    }

    /// A runtime driving `page` through a [`TerminalHost`].
    pub fn runtime(&self, page: Arc<MemoryPage>) -> (CliRuntime, Arc<TerminalHost>) {
        let host = Arc::new(TerminalHost::new(page.clone()));
        let engine = FilterEngine::new(
            self.client.clone(),
            page,
            SettlePolicy::from_config(&self.config.filter),
        );
        let runtime = Runtime::new(
            self.store.clone(),
            Arc::new(engine),
            host.clone(),
            &self.config.filter,
        );
        (runtime, host)
    }
}
