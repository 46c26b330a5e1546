//! Event subscriber: turns contract notifications into refresh callbacks.
//!
//! [`EventFeed`] is the transport: a background task polls the chain head and
//! fetches the contract's logs for every new block range, paged so no request
//! spans more than the provider allows, yielding typed
//! [`ContractEvent`]s until it is closed. [`EventSubscriber`] sits on top and
//! keeps exactly one handler per [`EventKind`], each of which only calls the
//! refresh callback supplied by the UI layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FeedOptions;
use crate::connection::{Access, ConnectionManager};
use crate::contract::CrowdFundContract;
use crate::errors::{GatewayError, Result};
use crate::events::{ContractEvent, EventKind};

const FEED_CAPACITY: usize = 256;

type Handler = Arc<dyn Fn(&ContractEvent) + Send + Sync>;
type HandlerRegistry = HashMap<EventKind, Handler>;

// ─────────────────────────────────────────────────────────
// Event feed
// ─────────────────────────────────────────────────────────

/// A cancellable sequence of contract notifications.
///
/// Dropping or closing the feed stops its polling task.
pub struct EventFeed {
    events: mpsc::Receiver<ContractEvent>,
    cancel: CancellationToken,
    last_block: Arc<AtomicU64>,
}

impl EventFeed {
    /// Yield notifications mined after `after_block`.
    pub fn open(contract: Arc<dyn CrowdFundContract>, after_block: u64, options: FeedOptions) -> Self {
        let (tx, events) = mpsc::channel(FEED_CAPACITY);
        let cancel = CancellationToken::new();
        let last_block = Arc::new(AtomicU64::new(after_block));

        tokio::spawn(poll(contract, options, tx, cancel.clone(), last_block.clone()));

        Self {
            events,
            cancel,
            last_block,
        }
    }

    /// Yield notifications mined after the current chain head.
    pub async fn open_at_head(contract: Arc<dyn CrowdFundContract>, options: FeedOptions) -> Result<Self> {
        let head = contract.block_number().await?;
        Ok(Self::open(contract, head, options))
    }

    /// Next notification; `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<ContractEvent> {
        self.events.recv().await
    }

    /// Highest block whose notifications have all been handed to the channel.
    pub fn last_block(&self) -> u64 {
        self.last_block.load(Ordering::Acquire)
    }

    /// Stop polling and return whatever was already buffered.
    pub fn close(&mut self) -> Vec<ContractEvent> {
        self.cancel.cancel();
        self.events.close();
        let mut buffered = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            buffered.push(event);
        }
        buffered
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll(
    contract: Arc<dyn CrowdFundContract>,
    options: FeedOptions,
    tx: mpsc::Sender<ContractEvent>,
    cancel: CancellationToken,
    last_block: Arc<AtomicU64>,
) {
    let span = options.max_log_range.max(1);
    'ticks: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.poll_interval) => {}
        }

        let head = match contract.block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Event poll could not read the block number: {e}");
                continue;
            }
        };

        let mut from = last_block.load(Ordering::Acquire) + 1;
        while from <= head {
            if cancel.is_cancelled() {
                break 'ticks;
            }
            let to = head.min(from.saturating_add(span - 1));
            match contract.events_between(from, to).await {
                Ok(events) => {
                    debug!("Blocks {from}..={to}: {} notification(s)", events.len());
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    last_block.store(to, Ordering::Release);
                    from = to + 1;
                }
                // The remaining blocks are retried on the next tick.
                Err(e) => {
                    warn!("Event poll failed for blocks {from}..={to}: {e}");
                    continue 'ticks;
                }
            }
        }
    }
    debug!("Event feed stopped");
}

// ─────────────────────────────────────────────────────────
// Subscriber
// ─────────────────────────────────────────────────────────

struct ActiveSubscription {
    handlers: Arc<HandlerRegistry>,
    attached: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Keeps one handler per notification kind attached to the active contract
/// handle.
pub struct EventSubscriber {
    options: FeedOptions,
    active: Mutex<Option<ActiveSubscription>>,
}

impl EventSubscriber {
    pub fn new(options: FeedOptions) -> Self {
        Self {
            options,
            active: Mutex::new(None),
        }
    }

    /// Attach handlers for all five notifications; each calls `on_change`.
    ///
    /// An existing subscription is torn down first, so handlers are never
    /// registered twice.
    pub async fn subscribe<F>(&self, connections: &Arc<ConnectionManager>, on_change: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_subscribed() {
            info!("Already subscribed; replacing the existing event listeners");
            self.unsubscribe();
        }

        // Subscribe to changes before connecting so no replacement is missed.
        let changes = connections.subscribe_changes();
        let connection = connections
            .ensure_connection(Access::Read)
            .await
            .map_err(|e| GatewayError::Initialization(format!("contract handle unavailable: {e}")))?;
        let contract = connection.contract();
        let feed = EventFeed::open_at_head(contract.clone(), self.options)
            .await
            .map_err(|e| GatewayError::Initialization(format!("could not read the chain head: {e}")))?;

        let handlers = Arc::new(register_handlers(Arc::new(on_change)));
        let attached = Arc::new(AtomicU64::new(connection.id()));
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher {
            handlers: handlers.clone(),
            recent: Vec::new(),
            replayed: Vec::new(),
        };
        let task = tokio::spawn(run(
            dispatcher,
            feed,
            connections.clone(),
            changes,
            attached.clone(),
            self.options,
            cancel.clone(),
        ));

        let previous = self.lock().replace(ActiveSubscription {
            handlers,
            attached,
            cancel,
            task,
        });
        if let Some(previous) = previous {
            previous.stop();
        }

        info!("Event listeners registered for contract {:?}", contract.address());
        Ok(())
    }

    /// Remove every handler and stop the feed. No-op when nothing is subscribed.
    pub fn unsubscribe(&self) {
        match self.lock().take() {
            Some(active) => {
                info!("Removing {} event listeners", active.handlers.len());
                active.stop();
            }
            None => info!("No event listeners to remove"),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().is_some()
    }

    /// Number of registered handlers (five while subscribed).
    pub fn handler_count(&self) -> usize {
        self.lock().as_ref().map_or(0, |active| active.handlers.len())
    }

    /// Id of the connection the handlers are attached to.
    pub fn attached_connection(&self) -> Option<u64> {
        self.lock()
            .as_ref()
            .map(|active| active.attached.load(Ordering::Acquire))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveSubscription>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        if let Some(active) = self.lock().take() {
            active.stop();
        }
    }
}

fn register_handlers(on_change: Arc<dyn Fn() + Send + Sync>) -> HandlerRegistry {
    EventKind::ALL
        .into_iter()
        .map(|kind| {
            let on_change = on_change.clone();
            let handler: Handler = Arc::new(move |event: &ContractEvent| {
                info!(
                    "EVENT: {} received (project {:?}, tx {:?})",
                    kind.as_str(),
                    event.project_id,
                    event.tx_hash
                );
                on_change();
            });
            (kind, handler)
        })
        .collect()
}

/// Routes feed events to handlers and suppresses events replayed after the
/// feed is reopened on a new connection.
struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    /// Delivered events from blocks the feed has not settled yet.
    recent: Vec<ContractEvent>,
    /// Events expected to show up again after a reattach.
    replayed: Vec<ContractEvent>,
}

impl Dispatcher {
    fn deliver(&mut self, event: ContractEvent, settled_through: u64) {
        self.recent
            .retain(|e| e.block_number.map_or(false, |b| b > settled_through));

        if let Some(pos) = self.replayed.iter().position(|e| e.same_occurrence(&event)) {
            self.replayed.swap_remove(pos);
            return;
        }
        if let Some(handler) = self.handlers.get(&event.kind) {
            handler(&event);
        }
        self.recent.push(event);
    }

    fn reattached(&mut self, resume_after: u64) {
        self.replayed = self
            .recent
            .drain(..)
            .filter(|e| e.block_number.map_or(false, |b| b > resume_after))
            .collect();
    }
}

async fn run(
    mut dispatcher: Dispatcher,
    mut feed: EventFeed,
    connections: Arc<ConnectionManager>,
    mut changes: watch::Receiver<u64>,
    attached: Arc<AtomicU64>,
    options: FeedOptions,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let id = *changes.borrow_and_update();
                let current = attached.load(Ordering::Acquire);
                if id == current {
                    continue;
                }
                let Some(connection) = connections.current().await else {
                    continue;
                };

                for event in feed.close() {
                    dispatcher.deliver(event, feed.last_block());
                }
                let resume_after = feed.last_block();
                dispatcher.reattached(resume_after);
                info!(
                    "Active connection changed (#{current} -> #{}); re-attaching event listeners",
                    connection.id()
                );
                feed = EventFeed::open(connection.contract(), resume_after, options);
                attached.store(connection.id(), Ordering::Release);
            }
            event = feed.next() => match event {
                Some(event) => dispatcher.deliver(event, feed.last_block()),
                None => {
                    warn!("Event feed closed unexpectedly");
                    break;
                }
            },
        }
    }
}
