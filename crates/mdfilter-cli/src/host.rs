use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mdfilter_core::page::MemoryPage;
use mdfilter_runtime::shell::{FilterControls, Host, Notice};

/// A host whose page is the list of links given on the command line.
///
/// The search controls are always considered mountable, notices go to
/// stderr and a reload shows every card again.
pub struct TerminalHost {
    page: Arc<MemoryPage>,
    reloads: AtomicUsize,
}

impl TerminalHost {
    pub fn new(page: Arc<MemoryPage>) -> Self {
        Self {
            page,
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Host for TerminalHost {
    fn find_anchor(&self) -> bool {
        true
    }

    fn mount(&self, controls: &FilterControls) {
        tracing::debug!(
            selected = %controls.selected,
            config_open = controls.config_open,
            "controls mounted"
        );
    }

    fn unmount(&self) {
        tracing::debug!("controls removed");
    }

    fn notify(&self, notice: Notice) {
        if notice.is_warning() {
            eprintln!("warning: {notice}");
        } else {
            eprintln!("{notice}");
        }
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.page.reload();
        tracing::info!("page reloaded");
    }
}
