//! Headless model of the filter controls injected next to the page's
//! "Reset filters" button, and the mapping from UI events to commands.

use mdfilter_api::Credentials;
use mdfilter_core::models::StatusSelection;
use mdfilter_core::route::Route;

/// The dropdown, Apply button and config popup as the host renders them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterControls {
    pub options: Vec<StatusSelection>,
    pub selected: StatusSelection,
    /// Credential form fields; rendered empty every time the popup opens.
    pub config_form: Credentials,
    pub config_open: bool,
}

impl FilterControls {
    pub fn new(selected: StatusSelection) -> Self {
        Self {
            options: StatusSelection::options(),
            selected,
            config_form: Credentials::default(),
            config_open: false,
        }
    }

    /// `(stored value, label)` pairs in dropdown order.
    pub fn option_entries(&self) -> Vec<(&'static str, &'static str)> {
        self.options
            .iter()
            .map(|o| (o.as_stored_str(), o.label()))
            .collect()
    }
}

/// A message popup shown by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ConfigIncomplete,
    ConfigSaved,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ConfigIncomplete => {
                "Config incomplete. Please fill in Username, Password, Client ID and Client Secret."
            }
            Self::ConfigSaved => "Config saved. Reload the page to log in again.",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ConfigIncomplete)
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// First script run on a page.
    Loaded { url: String },
    /// History navigation: push, replace or back/forward.
    Navigated { url: String },
    /// The "Reset filters" button showed up.
    AnchorAppeared,
    SelectionChanged(StatusSelection),
    ApplyClicked,
    ConfigOpened,
    ConfigSaved(Credentials),
    ConfigCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch the page until the anchor button exists, then build.
    WaitForAnchor,
    /// Mount fresh controls with the persisted selection and restore it.
    BuildControls,
    TearDown,
    /// Forget the persisted selection, show every card and reload the page.
    ResetAndReload,
    Select(StatusSelection),
    Apply(StatusSelection),
    Notify(Notice),
    OpenConfig,
    SaveConfig(Credentials),
    CloseConfig,
}

/// What [`plan`] needs to know about the current shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellState {
    pub selected: StatusSelection,
    pub credentials_complete: bool,
    pub mounted: bool,
}

/// Decide what an event should do. Performs no I/O.
pub fn plan(event: &UiEvent, state: &ShellState) -> Vec<Command> {
    match event {
        UiEvent::Loaded { url } => match Route::from_location(url) {
            Route::Listing => vec![Command::WaitForAnchor],
            Route::Excluded | Route::Other => Vec::new(),
        },
        UiEvent::Navigated { url } => match Route::from_location(url) {
            Route::Listing => vec![Command::WaitForAnchor],
            Route::Excluded => vec![Command::ResetAndReload],
            Route::Other if state.mounted => vec![Command::TearDown],
            Route::Other => Vec::new(),
        },
        UiEvent::AnchorAppeared => vec![Command::BuildControls],
        UiEvent::SelectionChanged(selection) => vec![Command::Select(*selection)],
        UiEvent::ApplyClicked if !state.credentials_complete => {
            vec![Command::Notify(Notice::ConfigIncomplete)]
        }
        UiEvent::ApplyClicked => vec![Command::Apply(state.selected)],
        UiEvent::ConfigOpened => vec![Command::OpenConfig],
        UiEvent::ConfigSaved(creds) => vec![
            Command::SaveConfig(creds.clone()),
            Command::CloseConfig,
            Command::Notify(Notice::ConfigSaved),
        ],
        UiEvent::ConfigCancelled => vec![Command::CloseConfig],
    }
}

/// The page the controls live in.
pub trait Host: Send + Sync {
    /// Whether the "Reset filters" button is rendered.
    fn find_anchor(&self) -> bool;

    /// Insert (or replace) the controls before the anchor.
    fn mount(&self, controls: &FilterControls);

    fn unmount(&self);

    fn notify(&self, notice: Notice);

    /// Full page reload.
    fn reload(&self);
}
