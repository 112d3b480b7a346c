//! Live queries over the store.
//!
//! Invalidation is an explicit publish/subscribe registry keyed by table:
//! every successful write publishes the touched table, and each subscription
//! owns a worker task that re-executes its query on invalidation. Deliveries
//! for one subscription are strictly ordered, and a tick that arrives while
//! a re-execution is in flight stays queued, so a racing write is never
//! dropped between two snapshots.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::model::{LedgerEntry, Vehicle};
use crate::store::Store;
use crate::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Vehicles,
    Entries,
    Settings,
    Reminders,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Vehicles => "vehicles",
            Table::Entries => "entries",
            Table::Settings => "settings",
            Table::Reminders => "reminders",
        }
    }
}

pub const ALL_TABLES: [Table; 4] = [
    Table::Vehicles,
    Table::Entries,
    Table::Settings,
    Table::Reminders,
];

struct Listener {
    id: u64,
    tables: Vec<Table>,
    tx: mpsc::UnboundedSender<()>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Table→listener registry owned by the [`Store`]. Writes fan out one
/// invalidation tick per interested subscription.
#[derive(Default)]
pub struct ChangeBus {
    inner: Mutex<BusInner>,
}

impl ChangeBus {
    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn subscribe(&self, tables: &[Table]) -> (u64, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Listener {
            id,
            tables: tables.to_vec(),
            tx,
        });
        (id, rx)
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        self.lock().listeners.retain(|l| l.id != id);
    }

    pub(crate) fn publish(&self, table: Table) {
        // Listeners whose receiver is gone are dropped on the way through.
        self.lock().listeners.retain(|l| {
            if l.tables.contains(&table) {
                l.tx.send(()).is_ok()
            } else {
                true
            }
        });
    }
}

/// Handle to a live query. Holds the latest delivered snapshot; dropping it
/// unsubscribes and guarantees no further deliveries.
pub struct LiveQuery<T> {
    rx: watch::Receiver<T>,
    _guard: SubscriptionGuard,
}

struct SubscriptionGuard {
    id: u64,
    bus: Arc<ChangeBus>,
    worker: JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
        self.worker.abort();
    }
}

impl<T: Clone> LiveQuery<T> {
    /// Latest delivered snapshot.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next delivery. `false` once the subscription is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Store {
    /// Run `query` once now, then re-run it whenever one of `tables` is
    /// written, delivering the result when it differs from the last
    /// delivered value.
    pub async fn observe<T, F>(&self, tables: &[Table], query: F) -> AppResult<LiveQuery<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(Store) -> BoxFuture<'static, AppResult<T>> + Send + Sync + 'static,
    {
        // Register before the first execution: a write landing while the
        // initial snapshot is read leaves a tick behind for the worker.
        let (id, mut dirty) = self.bus().subscribe(tables);
        let initial = match query(self.clone()).await {
            Ok(initial) => initial,
            Err(err) => {
                self.bus().unsubscribe(id);
                return Err(err);
            }
        };
        let (tx, rx) = watch::channel(initial);
        let store = self.clone();
        let worker = tokio::spawn(async move {
            while dirty.recv().await.is_some() {
                // Coalesce a burst of invalidations into one re-execution;
                // a tick arriving after this point stays queued.
                while dirty.try_recv().is_ok() {}
                match query(store.clone()).await {
                    Ok(next) => {
                        tx.send_if_modified(|current| {
                            if *current == next {
                                false
                            } else {
                                *current = next;
                                true
                            }
                        });
                    }
                    Err(err) => {
                        warn!(
                            target = "fleetledger",
                            event = "live_query_refresh_failed",
                            error = %err
                        );
                    }
                }
            }
        });
        Ok(LiveQuery {
            rx,
            _guard: SubscriptionGuard {
                id,
                bus: self.bus().clone(),
                worker,
            },
        })
    }

    /// Live view of all ledger entries.
    pub async fn observe_entries(&self) -> AppResult<LiveQuery<Vec<LedgerEntry>>> {
        self.observe(&[Table::Entries], |store| {
            async move { store.list_entries().await }.boxed()
        })
        .await
    }

    /// Live view of all vehicles.
    pub async fn observe_vehicles(&self) -> AppResult<LiveQuery<Vec<Vehicle>>> {
        self.observe(&[Table::Vehicles], |store| {
            async move { store.list_vehicles().await }.boxed()
        })
        .await
    }

    /// Live view of the display currency symbol.
    pub async fn observe_currency_symbol(&self) -> AppResult<LiveQuery<String>> {
        self.observe(&[Table::Settings], |store| {
            async move { store.currency_symbol().await }.boxed()
        })
        .await
    }
}
