pub mod shell;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use mdfilter_api::StatusSource;
use mdfilter_core::config::FilterConfig;
use mdfilter_core::engine::{FilterEngine, SettleReport};
use mdfilter_core::events::{self, FilterEvent};
use mdfilter_core::models::StatusSelection;
use mdfilter_core::page::{ObserveScope, Page};
use mdfilter_core::route::Route;
use mdfilter_core::store::CredentialStore;

use shell::{Command, FilterControls, Host, Notice, ShellState, UiEvent};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<mdfilter_core::error::CoreError> for RuntimeError {
    fn from(e: mdfilter_core::error::CoreError) -> Self {
        match e {
            mdfilter_core::error::CoreError::Config(msg) => Self::Config(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Owns the settings, the filter engine and the host page, and turns UI
/// events into engine calls.
pub struct Runtime<S, P, H> {
    store: CredentialStore,
    engine: Arc<FilterEngine<S, P>>,
    host: Arc<H>,
    anchor_timeout: Duration,
    controls: Mutex<Option<FilterControls>>,
}

impl<S, P, H> Runtime<S, P, H>
where
    S: StatusSource,
    P: Page,
    H: Host,
{
    pub fn new(
        store: CredentialStore,
        engine: Arc<FilterEngine<S, P>>,
        host: Arc<H>,
        config: &FilterConfig,
    ) -> Self {
        Self {
            store,
            engine,
            host,
            anchor_timeout: config.anchor_timeout(),
            controls: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<FilterEngine<S, P>> {
        &self.engine
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// The controls as currently mounted, if any.
    pub fn controls(&self) -> Option<FilterControls> {
        self.lock_controls().clone()
    }

    fn lock_controls(&self) -> std::sync::MutexGuard<'_, Option<FilterControls>> {
        self.controls.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn shell_state(&self) -> ShellState {
        let controls = self.lock_controls();
        ShellState {
            selected: controls
                .as_ref()
                .map(|c| c.selected)
                .unwrap_or_else(|| self.store.last_selection()),
            credentials_complete: self.store.credentials().is_complete(),
            mounted: controls.is_some(),
        }
    }

    /// Script entry point: log in, then treat `url` as the loaded page.
    pub async fn start(&self, url: &str) -> Result<Option<SettleReport>, RuntimeError> {
        self.login().await;
        self.handle(UiEvent::Loaded {
            url: url.to_string(),
        })
        .await
    }

    /// Log in with the stored credentials, even incomplete ones. A failure is
    /// logged and the page keeps working unfiltered.
    pub async fn login(&self) -> bool {
        match self.engine.source().authenticate().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "login failed");
                events::record(
                    &self.engine.events(),
                    FilterEvent::LoginFailed {
                        message: e.to_string(),
                    },
                );
                false
            }
        }
    }

    /// Run every command planned for `event`.
    ///
    /// Returns the report of the last settle run started, if any.
    pub async fn handle(&self, event: UiEvent) -> Result<Option<SettleReport>, RuntimeError> {
        if let UiEvent::Loaded { url } | UiEvent::Navigated { url } = &event {
            let route = Route::from_location(url);
            tracing::debug!(%url, ?route, "page location");
            events::record(&self.engine.events(), FilterEvent::Navigated { route });
        }

        let commands = shell::plan(&event, &self.shell_state());
        let mut report = None;
        for command in commands {
            if let Some(r) = self.execute(command).await? {
                report = Some(r);
            }
        }
        Ok(report)
    }

    async fn execute(&self, command: Command) -> Result<Option<SettleReport>, RuntimeError> {
        match command {
            Command::WaitForAnchor => {
                if self.wait_for_anchor().await {
                    return self.build_controls().await;
                }
                tracing::debug!("reset button never appeared, controls not built");
            }
            Command::BuildControls => return self.build_controls().await,
            Command::TearDown => {
                self.engine.cancel();
                self.lock_controls().take();
                self.host.unmount();
            }
            Command::ResetAndReload => {
                self.store.set_last_selection(StatusSelection::All)?;
                self.engine.reset();
                self.lock_controls().take();
                tracing::info!("left the search page, filter cleared");
                self.host.reload();
            }
            Command::Select(selection) => {
                self.update_controls(|c| c.selected = selection);
            }
            Command::Apply(selection) => {
                self.store.set_last_selection(selection)?;
                tracing::info!(%selection, "applying filter");
                return Ok(Some(self.engine.apply(selection).await));
            }
            Command::Notify(notice) => {
                if notice == Notice::ConfigIncomplete {
                    let missing = self.store.credentials().missing_fields();
                    tracing::warn!(?missing, "filter not applied, config incomplete");
                    events::record(
                        &self.engine.events(),
                        FilterEvent::ConfigIncomplete { missing },
                    );
                }
                self.host.notify(notice);
            }
            Command::OpenConfig => self.update_controls(|c| {
                c.config_form = Default::default();
                c.config_open = true;
            }),
            Command::SaveConfig(credentials) => {
                self.store.save_credentials(&credentials)?;
                self.engine.source().update_credentials(credentials).await;
            }
            Command::CloseConfig => self.update_controls(|c| {
                c.config_form = Default::default();
                c.config_open = false;
            }),
        }
        Ok(None)
    }

    fn update_controls(&self, f: impl FnOnce(&mut FilterControls)) {
        let mut guard = self.lock_controls();
        if let Some(controls) = guard.as_mut() {
            f(controls);
            self.host.mount(controls);
        }
    }

    /// Mount fresh controls with `selection` picked in the dropdown.
    pub fn mount_controls(&self, selection: StatusSelection) -> FilterControls {
        let controls = FilterControls::new(selection);
        self.host.mount(&controls);
        *self.lock_controls() = Some(controls.clone());
        controls
    }

    /// Mount fresh controls showing the persisted selection, then re-apply it.
    async fn build_controls(&self) -> Result<Option<SettleReport>, RuntimeError> {
        let selection = self.store.last_selection();
        self.mount_controls(selection);

        if selection == StatusSelection::All {
            return Ok(None);
        }
        tracing::info!(%selection, "restoring last filter");
        Ok(Some(self.engine.restore(selection).await))
    }

    /// Wait until the host reports the anchor, re-checking on every page
    /// mutation. Gives up after the anchor timeout.
    async fn wait_for_anchor(&self) -> bool {
        if self.host.find_anchor() {
            return true;
        }
        let Some(mut rx) = self.engine.page().observe(ObserveScope::Document) else {
            return false;
        };
        let deadline = Instant::now() + self.anchor_timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) if self.host.find_anchor() => return true,
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return false,
            }
        }
    }
}
