//! One way of learning about row changes, behind one interface. The push
//! source rides the store's change feed; the poll source re-reads the rows on
//! an interval and diffs them.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_channel::{
    mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use futures_timer::Delay;
use log::{debug, warn};
use serde_json::Value;

use crate::{
    error::StoreError,
    store::{ChangeEvent, ChangeKind, Filter, Row, SessionStore, SubscriptionId, Table},
};

#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn open(&self, table: Table, filter: Filter) -> Result<ChangeStream, StoreError>;
}

enum Release {
    Unsubscribe {
        store: Arc<dyn SessionStore>,
        id: SubscriptionId,
    },
    StopPolling(oneshot::Sender<()>),
}

/// Open stream of changes. `events` ends when the source goes away.
pub struct ChangeStream {
    pub events: UnboundedReceiver<ChangeEvent>,
    release: Release,
}

impl ChangeStream {
    pub fn is_push(&self) -> bool {
        matches!(self.release, Release::Unsubscribe { .. })
    }

    /// Tears the stream down at its source.
    pub async fn close(self) {
        match self.release {
            Release::Unsubscribe { store, id } => {
                if let Err(error) = store.unsubscribe(id).await {
                    warn!("Failed to unsubscribe {}: {}", id, error);
                }
            }
            Release::StopPolling(stop) => {
                let _ = stop.send(());
            }
        }
    }
}

pub struct PushSource {
    store: Arc<dyn SessionStore>,
}

impl PushSource {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        PushSource { store }
    }
}

#[async_trait]
impl ChangeSource for PushSource {
    async fn open(&self, table: Table, filter: Filter) -> Result<ChangeStream, StoreError> {
        let subscription = self.store.subscribe(table, filter).await?;
        Ok(ChangeStream {
            events: subscription.events,
            release: Release::Unsubscribe {
                store: self.store.clone(),
                id: subscription.id,
            },
        })
    }
}

/// Re-reads matching rows every `interval`. The first read reports every row
/// as an insert; later reads report what was added, changed or removed.
pub struct PollSource {
    store: Arc<dyn SessionStore>,
    interval: Duration,
}

impl PollSource {
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        PollSource { store, interval }
    }
}

#[async_trait]
impl ChangeSource for PollSource {
    async fn open(&self, table: Table, filter: Filter) -> Result<ChangeStream, StoreError> {
        let (tx, rx) = unbounded();
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(poll_loop(
            self.store.clone(),
            table,
            filter,
            self.interval,
            tx,
            stop_rx,
        ));

        Ok(ChangeStream {
            events: rx,
            release: Release::StopPolling(stop_tx),
        })
    }
}

async fn poll_loop(
    store: Arc<dyn SessionStore>,
    table: Table,
    filter: Filter,
    interval: Duration,
    tx: UnboundedSender<ChangeEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut snapshot: HashMap<String, Row> = HashMap::new();
    debug!("Polling {} every {:?}", table, interval);

    loop {
        match store.select_many(table, &filter, None).await {
            Ok(rows) => {
                for event in diff(table, &mut snapshot, rows) {
                    if tx.unbounded_send(event).is_err() {
                        return;
                    }
                }
            }
            Err(error) => warn!("Polling {} failed: {}", table, error),
        }

        tokio::select! {
            _ = &mut stop => break,
            _ = Delay::new(interval) => {}
        }
        if tx.is_closed() {
            break;
        }
    }
    debug!("Stopped polling {}", table);
}

/// Compares `rows` with the previous read and brings `snapshot` up to date.
fn diff(table: Table, snapshot: &mut HashMap<String, Row>, rows: Vec<Row>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut current: HashMap<String, Row> = HashMap::with_capacity(rows.len());

    for row in rows {
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => continue,
        };
        let kind = match snapshot.get(&id) {
            None => Some(ChangeKind::Insert),
            Some(previous) if *previous != row => Some(ChangeKind::Update),
            Some(_) => None,
        };
        if let Some(kind) = kind {
            events.push(ChangeEvent {
                kind,
                table,
                row: row.clone(),
            });
        }
        current.insert(id, row);
    }

    for (id, row) in snapshot.drain() {
        if !current.contains_key(&id) {
            events.push(ChangeEvent {
                kind: ChangeKind::Delete,
                table,
                row,
            });
        }
    }

    *snapshot = current;
    events
}
