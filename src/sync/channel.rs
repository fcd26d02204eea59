//! Cross-surface sync channel: "something changed" hints between surfaces.
//!
//! Two topics, no payload. Receivers refetch through their own cache; they
//! never apply a hint as data. Delivery is best-effort: a hint may be lost,
//! duplicated, or arrive out of order.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

/// Default broadcast channel capacity.
pub const DEFAULT_SYNC_CAPACITY: usize = 256;

/// The two sync topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncTopic {
    TodoSync,
    CategorySync,
}

impl SyncTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TodoSync => "todo-sync",
            Self::CategorySync => "category-sync",
        }
    }
}

impl fmt::Display for SyncTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one surface (tab, window, relay connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hint as carried by the hub. `origin` only serves to skip self-delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEvent {
    pub topic: SyncTopic,
    pub origin: SurfaceId,
}

/// What a surface observes on its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
    /// A sibling surface announced a change on `topic`.
    Changed(SyncTopic),
    /// Hints were dropped; anything may have changed.
    Lagged(u64),
}

/// Process-wide fan-out shared by every surface and the relay.
#[derive(Debug, Clone)]
pub struct SyncHub {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// A handle for a new surface.
    pub fn channel(&self) -> SyncChannel {
        self.channel_for(SurfaceId::new())
    }

    /// A handle for a surface with a known id.
    pub fn channel_for(&self, surface: SurfaceId) -> SyncChannel {
        SyncChannel {
            surface,
            tx: self.tx.clone(),
        }
    }

    /// Number of live subscriptions.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_CAPACITY)
    }
}

/// One surface's end of the hub.
#[derive(Debug, Clone)]
pub struct SyncChannel {
    surface: SurfaceId,
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncChannel {
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn broadcast_todo_sync(&self) {
        self.broadcast(SyncTopic::TodoSync);
    }

    pub fn broadcast_category_sync(&self) {
        self.broadcast(SyncTopic::CategorySync);
    }

    /// Fire-and-forget. Ok if no sibling is listening.
    pub fn broadcast(&self, topic: SyncTopic) {
        debug!(%topic, surface = %self.surface, "Broadcasting sync hint");
        let _ = self.tx.send(SyncEvent {
            topic,
            origin: self.surface,
        });
    }

    /// Subscribe to hints from other surfaces.
    pub fn subscribe(&self) -> SyncSubscription {
        SyncSubscription {
            surface: self.surface,
            rx: self.tx.subscribe(),
        }
    }

    /// Hints from other surfaces as a stream.
    pub fn stream(&self) -> impl Stream<Item = SyncSignal> + Send + 'static {
        let me = self.surface;
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| match result {
            Ok(event) if event.origin != me => Some(SyncSignal::Changed(event.topic)),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => Some(SyncSignal::Lagged(n)),
        })
    }
}

/// Receiver that skips the owning surface's own hints.
#[derive(Debug)]
pub struct SyncSubscription {
    surface: SurfaceId,
    rx: broadcast::Receiver<SyncEvent>,
}

impl SyncSubscription {
    /// Next hint from another surface. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SyncSignal> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.surface => continue,
                Ok(event) => return Some(SyncSignal::Changed(event.topic)),
                Err(broadcast::error::RecvError::Lagged(n)) => return Some(SyncSignal::Lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
