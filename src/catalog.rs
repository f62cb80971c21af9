//! Client-side materialized view over a resource collection.
//!
//! The backing collection only hands out a forward-only cursor, which
//! must never be driven by two consumers at once. The catalog therefore
//! owns exactly one cursor and grows a materialized prefix list from it;
//! readers query the prefix freely while at most one fetch task advances
//! the cursor. The fetch state machine is `Idle | Fetching`: a request
//! while a fetch is in flight just raises the high-water mark, and a
//! caller still short after completion re-requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, warn};
use tokio::sync::watch;

use crate::resource::{CollectionItem, Resource, ResourceCollection, ResourceCursor};
use crate::tilt::{FN_THUMBNAIL, TiltFile};

/// How far past the requested index a fetch keeps going, so a user
/// paging through a gallery stays ahead of the network.
pub const DEFAULT_LOOK_AHEAD: usize = 40;

struct Entry {
    resource: Arc<dyn Resource>,
    icon: Option<Arc<Vec<u8>>>,
}

struct State {
    sketches: Vec<Entry>,
    /// Taken by the fetch task for the duration of a fetch.
    cursor: Option<Box<dyn ResourceCursor>>,
    /// High-water mark: how many sketches callers want materialized.
    requested: usize,
    fetching: bool,
    /// The upstream ran dry; distinguishes "request satisfied" from
    /// "source exhausted" for short answers.
    exhausted: bool,
    /// A refresh arrived while a fetch held the cursor; runs when the
    /// fetch returns it.
    pending_refresh: bool,
    icon_queue: VecDeque<usize>,
    loading_icons: bool,
}

struct Inner {
    collection: Arc<dyn ResourceCollection>,
    look_ahead: usize,
    state: Mutex<State>,
    changed: watch::Sender<u64>,
    refreshing: watch::Sender<bool>,
}

/// Paged catalog over one resource collection. Cheap to clone; clones
/// share the same materialized state.
#[derive(Clone)]
pub struct SketchCatalog {
    inner: Arc<Inner>,
}

impl SketchCatalog {
    pub fn new(collection: Arc<dyn ResourceCollection>) -> Self {
        Self::with_look_ahead(collection, DEFAULT_LOOK_AHEAD)
    }

    pub fn with_look_ahead(collection: Arc<dyn ResourceCollection>, look_ahead: usize) -> Self {
        let cursor = collection.contents();
        Self {
            inner: Arc::new(Inner {
                collection,
                look_ahead,
                state: Mutex::new(State {
                    sketches: Vec::new(),
                    cursor: Some(cursor),
                    requested: 0,
                    fetching: false,
                    exhausted: false,
                    pending_refresh: false,
                    icon_queue: VecDeque::new(),
                    loading_icons: false,
                }),
                changed: watch::Sender::new(0),
                refreshing: watch::Sender::new(false),
            }),
        }
    }

    /// Prime the collection and start the first fetch.
    pub async fn init(&self) -> Result<()> {
        self.inner.collection.init().await?;
        self.request_to_index(0);
        Ok(())
    }

    pub fn num_sketches(&self) -> usize {
        self.inner.state.lock().unwrap().sketches.len()
    }

    pub fn is_index_valid(&self, index: usize) -> bool {
        index < self.num_sketches()
    }

    /// True once the backing collection has been fully materialized (or
    /// its traversal failed partway; the prefix stays valid either way).
    pub fn is_exhausted(&self) -> bool {
        self.inner.state.lock().unwrap().exhausted
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().unwrap().fetching
    }

    pub fn resource(&self, index: usize) -> Option<Arc<dyn Resource>> {
        let state = self.inner.state.lock().unwrap();
        state.sketches.get(index).map(|e| e.resource.clone())
    }

    /// Cached icon bytes (PNG) for a sketch, if loaded.
    pub fn icon(&self, index: usize) -> Option<Arc<Vec<u8>>> {
        let state = self.inner.state.lock().unwrap();
        state.sketches.get(index).and_then(|e| e.icon.clone())
    }

    /// The error that cut the backing traversal short, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.collection.last_error()
    }

    /// Ticks whenever the materialized list or an icon changes.
    pub fn subscribe_changed(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Mirrors the fetch state machine for observers.
    pub fn subscribe_refreshing(&self) -> watch::Receiver<bool> {
        self.inner.refreshing.subscribe()
    }

    /// Ask for the prefix to cover `index`, plus lookahead.
    ///
    /// Records the high-water mark and starts a fetch only when none is
    /// in flight. Overlapping calls coalesce into the one live fetch; a
    /// caller that is still short after completion requests again.
    pub fn request_to_index(&self, index: usize) {
        let target = index.saturating_add(1).saturating_add(self.inner.look_ahead);
        let mut state = self.inner.state.lock().unwrap();
        state.requested = state.requested.max(target);
        self.spawn_fetch_locked(&mut state);
    }

    fn spawn_fetch_locked(&self, state: &mut State) {
        if state.fetching || state.exhausted || state.sketches.len() >= state.requested {
            return;
        }
        let Some(mut cursor) = state.cursor.take() else {
            return;
        };
        state.fetching = true;
        let _ = self.inner.refreshing.send(true);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                {
                    let state = inner.state.lock().unwrap();
                    if state.sketches.len() >= state.requested {
                        break;
                    }
                }
                match cursor.next().await {
                    Some(CollectionItem::Sketch(resource)) => {
                        let mut state = inner.state.lock().unwrap();
                        state.sketches.push(Entry {
                            resource,
                            icon: None,
                        });
                        drop(state);
                        inner.changed.send_modify(|v| *v += 1);
                    }
                    Some(CollectionItem::Folder(folder)) => {
                        // The catalog is a flat gallery; nested
                        // collections are reachable through the
                        // registry, not inlined here.
                        debug!("skipping nested collection {}", folder.uri());
                    }
                    None => {
                        if let Some(err) = inner.collection.last_error() {
                            warn!("collection traversal stopped early: {}", err);
                        }
                        inner.state.lock().unwrap().exhausted = true;
                        break;
                    }
                }
            }
            let mut state = inner.state.lock().unwrap();
            state.cursor = Some(cursor);
            state.fetching = false;
            let deferred = std::mem::take(&mut state.pending_refresh);
            if deferred {
                reset_locked(&inner, &mut state);
            }
            drop(state);
            let _ = inner.refreshing.send(false);
            inner.changed.send_modify(|v| *v += 1);
            if deferred {
                SketchCatalog {
                    inner: inner.clone(),
                }
                .request_to_index(0);
            }
        });
    }

    /// Queue icons for loading. Bursts of requests collapse into one
    /// batch: a single background task drains the queue, starts one
    /// load per index and awaits them together.
    pub fn request_icons(&self, indices: &[usize]) {
        let mut state = self.inner.state.lock().unwrap();
        state.icon_queue.extend(indices.iter().copied());
        if state.loading_icons {
            return;
        }
        state.loading_icons = true;
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                // Drain the queue into a deduplicated batch. Clearing
                // the busy flag under the same lock that saw the queue
                // empty keeps late enqueues from being dropped.
                let batch: Vec<(usize, Arc<dyn Resource>)> = {
                    let mut state = inner.state.lock().unwrap();
                    let mut batch: Vec<(usize, Arc<dyn Resource>)> = Vec::new();
                    while let Some(index) = state.icon_queue.pop_front() {
                        let Some(entry) = state.sketches.get(index) else {
                            debug!("icon requested for unmaterialized index {}", index);
                            continue;
                        };
                        if entry.icon.is_some() || batch.iter().any(|(i, _)| *i == index) {
                            continue;
                        }
                        batch.push((index, entry.resource.clone()));
                    }
                    if batch.is_empty() {
                        state.loading_icons = false;
                    }
                    batch
                };
                if batch.is_empty() {
                    inner.refreshing.send_modify(|_| {});
                    return;
                }

                let handles: Vec<_> = batch
                    .into_iter()
                    .map(|(index, resource)| (index, tokio::spawn(load_icon(resource))))
                    .collect();
                for (index, handle) in handles {
                    if let Ok(Some(bytes)) = handle.await {
                        let mut state = inner.state.lock().unwrap();
                        if let Some(entry) = state.sketches.get_mut(index) {
                            entry.icon = Some(Arc::new(bytes));
                        }
                    }
                }
                inner.changed.send_modify(|v| *v += 1);
            }
        });
    }

    /// Discard materialized state and start a fresh traversal. While a
    /// fetch holds the cursor the rematerialization is deferred and runs
    /// as soon as the fetch returns it.
    pub fn refresh(&self) {
        self.inner.collection.refresh();
        let mut state = self.inner.state.lock().unwrap();
        if state.fetching {
            state.pending_refresh = true;
            return;
        }
        reset_locked(&self.inner, &mut state);
        self.spawn_fetch_locked(&mut state);
        drop(state);
        self.inner.changed.send_modify(|v| *v += 1);
    }

    /// Wait until no fetch or icon task is running. Mostly for tests
    /// and batch tooling; interactive consumers watch the channels.
    pub async fn until_idle(&self) {
        let mut rx = self.inner.refreshing.subscribe();
        loop {
            {
                let state = self.inner.state.lock().unwrap();
                if !state.fetching && !state.loading_icons {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Drop materialized state and point the catalog at a fresh traversal.
/// The previous request high-water mark is kept so the rematerialization
/// covers what callers already asked for.
fn reset_locked(inner: &Inner, state: &mut State) {
    state.cursor = Some(inner.collection.contents());
    state.sketches.clear();
    state.exhausted = false;
    state.icon_queue.clear();
    state.requested = state.requested.max(inner.look_ahead + 1);
}

/// Resolve one sketch's icon: the source's own preview when it has one,
/// otherwise the thumbnail member pulled out of the container itself.
/// Missing either way is "no icon", not an error.
async fn load_icon(resource: Arc<dyn Resource>) -> Option<Vec<u8>> {
    match resource.load_preview().await {
        Ok(Some(bytes)) => return Some(bytes),
        Ok(None) => {}
        Err(e) => debug!("preview fetch failed for {}: {}", resource.uri(), e),
    }

    let source = match resource.open().await {
        Ok(source) => source,
        Err(e) => {
            warn!("could not open stream for {}: {}", resource.uri(), e);
            return None;
        }
    };
    let tilt = match TiltFile::from_reader(source).await {
        Ok(tilt) => tilt,
        Err(e) => {
            warn!("{} is not a sketch container: {}", resource.uri(), e);
            return None;
        }
    };
    match tilt.read_member(FN_THUMBNAIL).await {
        Some(bytes) => Some(bytes),
        None => {
            warn!("could not open {} stream for {}", FN_THUMBNAIL, resource.uri());
            None
        }
    }
}
