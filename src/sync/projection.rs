//! Local projections of remote state as pure reducers
//!
//! Every change, whether it comes from a user action, a load, or a pushed
//! insert, is expressed as an event and applied with `apply(projection, event)`.
//! Updates merge on identity and never write by position, so an insert that
//! lands while another update is in flight is never dropped.

use std::collections::HashSet;

use crate::models::{feed_order, sort_entries, Notification, WatchlistEntry, FEED_WINDOW};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Snapshot returned by a load
    Loaded(Vec<Notification>),
    /// Notification delivered by the change stream
    Inserted(Notification),
    MarkedRead(String),
    MarkedAllRead,
}

/// The recent-notifications window of one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationProjection {
    items: Vec<Notification>,
}

impl NotificationProjection {
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    /// Always recomputed from the items, never stored
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn apply(self, event: FeedEvent) -> Self {
        match event {
            FeedEvent::Loaded(snapshot) => self.merge(snapshot),
            FeedEvent::Inserted(notification) => self.merge(vec![notification]),
            FeedEvent::MarkedRead(id) => Self {
                items: self
                    .items
                    .into_iter()
                    .map(|n| if n.id == id { Notification { read: true, ..n } } else { n })
                    .collect(),
            },
            FeedEvent::MarkedAllRead => Self {
                items: self
                    .items
                    .into_iter()
                    .map(|n| Notification { read: true, ..n })
                    .collect(),
            },
        }
    }

    /// Union by id. A notification read on either side stays read.
    fn merge(self, incoming: Vec<Notification>) -> Self {
        let read_locally: HashSet<String> = self
            .items
            .iter()
            .filter(|n| n.read)
            .map(|n| n.id.clone())
            .collect();
        let incoming_ids: HashSet<String> = incoming.iter().map(|n| n.id.clone()).collect();

        let mut items: Vec<Notification> = self
            .items
            .into_iter()
            .filter(|n| !incoming_ids.contains(&n.id))
            .collect();

        let mut seen = HashSet::new();
        for mut n in incoming {
            if !seen.insert(n.id.clone()) {
                continue;
            }
            n.read = n.read || read_locally.contains(&n.id);
            items.push(n);
        }

        items.sort_by(feed_order);
        items.truncate(FEED_WINDOW);
        Self { items }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Added(WatchlistEntry),
    Removed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchlistEvent {
    Loaded(Vec<WatchlistEntry>),
    Toggled(Toggle),
}

/// Cached watchlist of one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchlistProjection {
    loaded: bool,
    entries: Vec<WatchlistEntry>,
}

impl WatchlistProjection {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    /// `None` until a load has populated the cache
    pub fn contains(&self, movie_id: &str) -> Option<bool> {
        self.loaded
            .then(|| self.entries.iter().any(|e| e.movie.id == movie_id))
    }

    pub fn apply(self, event: WatchlistEvent) -> Self {
        match event {
            WatchlistEvent::Loaded(mut entries) => {
                let mut seen = HashSet::new();
                entries.retain(|e| seen.insert(e.movie.id.clone()));
                sort_entries(&mut entries);
                Self {
                    loaded: true,
                    entries,
                }
            }
            WatchlistEvent::Toggled(Toggle::Added(entry)) => {
                let mut entries = self.entries;
                if !entries.iter().any(|e| e.movie.id == entry.movie.id) {
                    entries.push(entry);
                    sort_entries(&mut entries);
                }
                Self {
                    loaded: self.loaded,
                    entries,
                }
            }
            WatchlistEvent::Toggled(Toggle::Removed(movie_id)) => Self {
                loaded: self.loaded,
                entries: self
                    .entries
                    .into_iter()
                    .filter(|e| e.movie.id != movie_id)
                    .collect(),
            },
        }
    }
}
