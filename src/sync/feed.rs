use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_channel::{mpsc::UnboundedSender, oneshot};
use futures_timer::Delay;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;

use super::source::{ChangeSource, ChangeStream};
use crate::{
    error::{SessionError, StoreError},
    helpers::lock,
    models::events::SessionEvent,
    store::{Filter, Table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedMode {
    Push,
    /// Polling while the push feed is down; resubscription is still tried.
    Fallback,
    /// Resubscription gave up. Polls until the feed is cancelled.
    PollOnly,
}

/// Which mode each live feed is in.
#[derive(Debug, Default)]
pub struct FeedStatus {
    modes: Mutex<HashMap<Table, FeedMode>>,
}

impl FeedStatus {
    pub fn snapshot(&self) -> Vec<(Table, FeedMode)> {
        let mut modes: Vec<(Table, FeedMode)> =
            lock(&self.modes).iter().map(|(table, mode)| (*table, *mode)).collect();
        modes.sort_by_key(|(table, _)| table.name());
        modes
    }

    fn set(&self, table: Table, mode: FeedMode) {
        lock(&self.modes).insert(table, mode);
    }

    fn clear(&self, table: Table) {
        lock(&self.modes).remove(&table);
    }
}

pub struct FeedPlan {
    pub table: Table,
    pub filter: Filter,
    pub resubscribe_attempts: u32,
    pub resubscribe_delay: Duration,
}

/// Keeps one table's changes flowing into `sink` until `cancel` fires.
///
/// Starts on `first`, the caller's attempt at opening `push`. When the push
/// stream ends it switches to `poll` and tries to resubscribe every
/// `resubscribe_delay`; after `resubscribe_attempts` failures in a row it
/// stays on polling.
pub async fn supervise(
    plan: FeedPlan,
    first: Result<ChangeStream, StoreError>,
    push: Arc<dyn ChangeSource>,
    poll: Arc<dyn ChangeSource>,
    sink: UnboundedSender<SessionEvent>,
    status: Arc<FeedStatus>,
    mut cancel: oneshot::Receiver<()>,
) {
    let table = plan.table;
    let mut failures = 0;
    let mut stream = match first {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Change feed for {} unavailable, polling instead: {}", table, error);
            failures += 1;
            match poll.open(table, plan.filter.clone()).await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!("Cannot poll {}: {}", table, error);
                    status.clear(table);
                    return;
                }
            }
        }
    };

    let mut resubscribe = Delay::new(plan.resubscribe_delay);

    loop {
        let mode = if stream.is_push() {
            FeedMode::Push
        } else if failures >= plan.resubscribe_attempts {
            FeedMode::PollOnly
        } else {
            FeedMode::Fallback
        };
        status.set(table, mode);

        let retry = mode == FeedMode::Fallback;

        tokio::select! {
            _ = &mut cancel => {
                stream.close().await;
                break;
            }
            event = stream.events.next() => match event {
                Some(change) => {
                    if let Some(event) = SessionEvent::from_change(change) {
                        if sink.unbounded_send(event).is_err() {
                            stream.close().await;
                            break;
                        }
                    }
                }
                None => {
                    if stream.is_push() {
                        warn!("{}", SessionError::SubscriptionLost { table });
                    } else {
                        warn!("Polling {} stopped unexpectedly", table);
                    }
                    stream = match poll.open(table, plan.filter.clone()).await {
                        Ok(stream) => stream,
                        Err(error) => {
                            warn!("Cannot poll {}: {}", table, error);
                            break;
                        }
                    };
                    resubscribe.reset(plan.resubscribe_delay);
                }
            },
            _ = &mut resubscribe, if retry => {
                resubscribe.reset(plan.resubscribe_delay);
                match push.open(table, plan.filter.clone()).await {
                    Ok(resubscribed) => {
                        info!("Resubscribed to {} changes", table);
                        stream.close().await;
                        stream = resubscribed;
                        failures = 0;
                    }
                    Err(error) => {
                        failures += 1;
                        warn!(
                            "Resubscribing to {} failed ({}/{}): {}",
                            table, failures, plan.resubscribe_attempts, error
                        );
                        if failures >= plan.resubscribe_attempts {
                            warn!("Giving up on {} change feed, polling from now on", table);
                        }
                    }
                }
            }
        }
    }

    status.clear(table);
    debug!("Feed for {} stopped", table);
}
