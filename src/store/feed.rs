use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use futures_channel::mpsc::{unbounded, UnboundedSender};
use log::{debug, info};

use super::{ChangeEvent, ChangeKind, Filter, Row, Subscription, SubscriptionId, Table};
use crate::helpers::lock;

struct Subscriber {
    id: SubscriptionId,
    table: Table,
    filter: Filter,
    tx: UnboundedSender<ChangeEvent>,
}

/// Fan-out of row changes to every subscription whose table and filter match.
#[derive(Default)]
pub struct ChangeFeed {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        ChangeFeed::default()
    }

    pub fn subscribe(&self, table: Table, filter: Filter) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded();

        lock(&self.subscribers).push(Subscriber {
            id,
            table,
            filter,
            tx,
        });
        debug!("Subscription {} opened on {}", id, table);

        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        before != subscribers.len()
    }

    pub fn publish(&self, kind: ChangeKind, table: Table, row: &Row) {
        let mut subscribers = lock(&self.subscribers);

        subscribers.retain(|subscriber| {
            if subscriber.table != table || !subscriber.filter.matches(row) {
                return !subscriber.tx.is_closed();
            }
            let event = ChangeEvent {
                kind,
                table,
                row: row.clone(),
            };
            subscriber.tx.unbounded_send(event).is_ok()
        });
    }

    /// Live subscriptions. Subscriptions whose receiver was dropped are pruned first.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        subscribers.len()
    }

    /// Drops every subscription, ending their streams.
    pub fn close_all(&self) {
        let mut subscribers = lock(&self.subscribers);
        if !subscribers.is_empty() {
            info!("Closing {} change feed subscriptions", subscribers.len());
        }
        subscribers.clear();
    }
}
