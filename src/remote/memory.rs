//! In-memory document store.
//!
//! Behaves like the hosted database from the data layer's point of view:
//! atomic batches, live feeds that push the current snapshot first, and
//! idempotent deletes. Every call is counted so tests can tell cache hits
//! from remote reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use super::filter::{matches_all, run_query as evaluate};
use super::{ChangeEvent, ChangeFeed, DocumentStore, RemoteError, Result, WatchTarget, Write};
use crate::models::{Collection, Document, Patch, Query};

type Tables = HashMap<Collection, BTreeMap<String, Document>>;

/// Change notifications fanned out to live feeds.
#[derive(Debug, Clone)]
enum Notice {
    Changed { collection: Collection, ids: Vec<String> },
    Fault { collection: Collection, message: String },
}

// == Call Counts ==
/// Number of store calls by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    pub puts: u64,
    pub fetches: u64,
    pub queries: u64,
    pub patches: u64,
    pub deletes: u64,
    pub commits: u64,
    pub watches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    puts: AtomicU64,
    fetches: AtomicU64,
    queries: AtomicU64,
    patches: AtomicU64,
    deletes: AtomicU64,
    commits: AtomicU64,
    watches: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CallCounts {
        CallCounts {
            puts: self.puts.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            patches: self.patches.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            watches: self.watches.load(Ordering::Relaxed),
        }
    }
}

// == Memory Store ==
#[derive(Debug)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    notices: broadcast::Sender<Notice>,
    counters: Counters,
    unavailable: AtomicBool,
    /// Feed tasks currently alive, for tests that check teardown
    live_feeds: Arc<Mutex<usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(256);
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            notices,
            counters: Counters::default(),
            unavailable: AtomicBool::new(false),
            live_feeds: Arc::new(Mutex::new(0)),
        }
    }

    /// Stores documents directly, bypassing counters. Feeds are notified.
    pub fn seed(&self, collection: Collection, documents: impl IntoIterator<Item = Document>) {
        let ids: Vec<String> = {
            let mut tables = self.tables.write();
            let table = tables.entry(collection).or_default();
            documents
                .into_iter()
                .map(|doc| {
                    let id = doc.id.clone();
                    table.insert(id.clone(), doc);
                    id
                })
                .collect()
        };
        self.notify(collection, ids);
    }

    /// Reads a document directly, bypassing counters.
    pub fn peek(&self, collection: Collection, id: &str) -> Option<Document> {
        self.tables
            .read()
            .get(&collection)
            .and_then(|table| table.get(id).cloned())
    }

    /// Number of documents stored in `collection`.
    pub fn count(&self, collection: Collection) -> usize {
        self.tables.read().get(&collection).map_or(0, BTreeMap::len)
    }

    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    /// Makes every subsequent call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Pushes an error to every live feed on `collection`.
    pub fn inject_feed_error(&self, collection: Collection, message: impl Into<String>) {
        let _ = self.notices.send(Notice::Fault {
            collection,
            message: message.into(),
        });
    }

    /// Number of feed tasks still running.
    pub fn live_feeds(&self) -> usize {
        *self.live_feeds.lock()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    fn notify(&self, collection: Collection, ids: Vec<String>) {
        // No receivers simply means no live feeds
        let _ = self.notices.send(Notice::Changed { collection, ids });
    }
}

fn snapshot(tables: &RwLock<Tables>, collection: Collection, target: &WatchTarget) -> ChangeEvent {
    let tables = tables.read();
    let table = tables.get(&collection);
    match target {
        WatchTarget::Document(id) => {
            ChangeEvent::Document(table.and_then(|t| t.get(id).cloned()))
        }
        WatchTarget::Query(filters) => ChangeEvent::Query(
            table
                .map(|t| {
                    t.values()
                        .filter(|doc| matches_all(doc, filters))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        ),
    }
}

/// Applies one write to the staging tables.
fn apply_write(tables: &mut Tables, write: &Write) -> Result<()> {
    match write {
        Write::Put { collection, document } => {
            tables
                .entry(*collection)
                .or_default()
                .insert(document.id.clone(), document.clone());
        }
        Write::Patch { collection, id, patch } => {
            let table = tables.entry(*collection).or_default();
            let current = table.get(id).ok_or_else(|| RemoteError::NotFound {
                collection: *collection,
                id: id.clone(),
            })?;
            let updated = patch
                .apply_to(current)
                .map_err(RemoteError::InvalidOperation)?;
            table.insert(id.clone(), updated);
        }
        Write::Delete { collection, id } => {
            if let Some(table) = tables.get_mut(collection) {
                table.remove(id);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, collection: Collection, document: Document) -> Result<()> {
        Counters::bump(&self.counters.puts);
        self.check_available()?;
        let id = document.id.clone();
        apply_write(&mut self.tables.write(), &Write::Put { collection, document })?;
        self.notify(collection, vec![id]);
        Ok(())
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        Counters::bump(&self.counters.fetches);
        self.check_available()?;
        Ok(self.peek(collection, id))
    }

    async fn run_query(&self, collection: Collection, query: &Query) -> Result<Vec<Document>> {
        Counters::bump(&self.counters.queries);
        self.check_available()?;
        let tables = self.tables.read();
        Ok(tables
            .get(&collection)
            .map(|table| evaluate(table.values(), query))
            .unwrap_or_default())
    }

    async fn apply_patch(&self, collection: Collection, id: &str, patch: &Patch) -> Result<()> {
        Counters::bump(&self.counters.patches);
        self.check_available()?;
        let write = Write::Patch {
            collection,
            id: id.to_string(),
            patch: patch.clone(),
        };
        apply_write(&mut self.tables.write(), &write)?;
        self.notify(collection, vec![id.to_string()]);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        Counters::bump(&self.counters.deletes);
        self.check_available()?;
        let write = Write::Delete {
            collection,
            id: id.to_string(),
        };
        apply_write(&mut self.tables.write(), &write)?;
        self.notify(collection, vec![id.to_string()]);
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        Counters::bump(&self.counters.commits);
        self.check_available()?;

        {
            let mut tables = self.tables.write();
            let mut staged = tables.clone();
            for write in &writes {
                apply_write(&mut staged, write)?;
            }
            *tables = staged;
        }

        let mut touched: BTreeMap<Collection, Vec<String>> = BTreeMap::new();
        for write in &writes {
            touched
                .entry(write.collection())
                .or_default()
                .push(write.document_id().to_string());
        }
        for (collection, ids) in touched {
            self.notify(collection, ids);
        }
        Ok(())
    }

    async fn watch(&self, collection: Collection, target: WatchTarget) -> Result<ChangeFeed> {
        Counters::bump(&self.counters.watches);
        self.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut notices = self.notices.subscribe();
        let tables = Arc::clone(&self.tables);
        let live_feeds = Arc::clone(&self.live_feeds);

        let mut last = snapshot(&tables, collection, &target);
        let _ = tx.send(Ok(last.clone()));
        *live_feeds.lock() += 1;

        tokio::spawn(async move {
            loop {
                let notice = tokio::select! {
                    _ = tx.closed() => break,
                    notice = notices.recv() => notice,
                };

                let event = match notice {
                    Ok(Notice::Changed { collection: changed, ids }) if changed == collection => {
                        if let WatchTarget::Document(id) = &target {
                            if !ids.contains(id) {
                                continue;
                            }
                        }
                        snapshot(&tables, collection, &target)
                    }
                    Ok(Notice::Fault { collection: faulted, message }) if faulted == collection => {
                        if tx.send(Err(RemoteError::Unavailable(message))).is_err() {
                            break;
                        }
                        continue;
                    }
                    Ok(_) => continue,
                    // Missed notices: resend whatever is current
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        snapshot(&tables, collection, &target)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if event == last {
                    continue;
                }
                last = event.clone();
                if tx.send(Ok(event)).is_err() {
                    break;
                }
            }
            *live_feeds.lock() -= 1;
            debug!("Feed on {} closed", collection);
        });

        Ok(rx)
    }
}
