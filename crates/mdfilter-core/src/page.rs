//! The host page as seen by the filter engine.
//!
//! Cards belong to the host: the engine only lists title links, toggles their
//! visibility and listens for mutations while it waits for late renders.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::models::{CardKey, CardLink};

/// Where to listen for DOM mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveScope {
    /// The container that holds the search results.
    CardList,
    /// The whole document.
    Document,
}

pub trait Page: Send + Sync {
    /// Every rendered link whose `href` starts with `/title/`.
    fn title_links(&self) -> Vec<CardLink>;

    /// Show or hide the container of one card.
    fn set_visible(&self, card: CardKey, visible: bool);

    /// Subscribe to subtree mutations in `scope`.
    ///
    /// The channel carries a mutation counter; only changes matter. Returns
    /// `None` when the scope does not exist on the page right now.
    fn observe(&self, scope: ObserveScope) -> Option<watch::Receiver<u64>>;
}

/// A rendered card in a [`MemoryPage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub key: CardKey,
    pub href: String,
    pub visible: bool,
}

#[derive(Debug, Default)]
struct PageState {
    cards: Vec<Card>,
    next_key: usize,
    has_card_list: bool,
}

/// An in-memory page: a list of title links with a visibility flag each.
pub struct MemoryPage {
    state: Mutex<PageState>,
    mutations: watch::Sender<u64>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState {
                has_card_list: true,
                ..Default::default()
            }),
            mutations: watch::Sender::new(0),
        }
    }

    pub fn with_links<I, S>(hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let page = Self::new();
        page.push_links(hrefs);
        page
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mutated(&self) {
        self.mutations.send_modify(|n| *n += 1);
    }

    /// Render new cards (visible) as one mutation.
    pub fn push_links<I, S>(&self, hrefs: I) -> Vec<CardKey>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = {
            let mut state = self.lock();
            let mut keys = Vec::new();
            for href in hrefs {
                let key = CardKey(state.next_key);
                state.next_key += 1;
                state.cards.push(Card {
                    key,
                    href: href.into(),
                    visible: true,
                });
                keys.push(key);
            }
            keys
        };
        self.mutated();
        keys
    }

    /// Drop every card, as the host does when it re-renders after navigation.
    pub fn clear(&self) {
        self.lock().cards.clear();
        self.mutated();
    }

    /// Reload: every card rendered again in its default, visible state.
    pub fn reload(&self) {
        for card in self.lock().cards.iter_mut() {
            card.visible = true;
        }
        self.mutated();
    }

    /// A mutation that does not touch the cards.
    pub fn touch(&self) {
        self.mutated();
    }

    /// Whether the search-result container exists, for scoped observation.
    pub fn set_card_list_present(&self, present: bool) {
        self.lock().has_card_list = present;
    }

    pub fn cards(&self) -> Vec<Card> {
        self.lock().cards.clone()
    }

    pub fn visible_hrefs(&self) -> Vec<String> {
        self.lock()
            .cards
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.href.clone())
            .collect()
    }

    pub fn is_visible(&self, key: CardKey) -> Option<bool> {
        self.lock()
            .cards
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.visible)
    }
}

impl Page for MemoryPage {
    fn title_links(&self) -> Vec<CardLink> {
        self.lock()
            .cards
            .iter()
            .filter(|c| c.href.starts_with(crate::models::card::TITLE_LINK_PREFIX))
            .map(|c| CardLink {
                key: c.key,
                href: c.href.clone(),
            })
            .collect()
    }

    // Visibility changes are style writes, not subtree mutations; no notification.
    fn set_visible(&self, card: CardKey, visible: bool) {
        if let Some(c) = self.lock().cards.iter_mut().find(|c| c.key == card) {
            c.visible = visible;
        }
    }

    fn observe(&self, scope: ObserveScope) -> Option<watch::Receiver<u64>> {
        match scope {
            ObserveScope::CardList if !self.lock().has_card_list => None,
            _ => Some(self.mutations.subscribe()),
        }
    }
}
