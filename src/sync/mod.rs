//! Cross-surface sync: in-process hub plus a WebSocket relay.

pub mod channel;
pub mod relay;

pub use channel::{SurfaceId, SyncChannel, SyncEvent, SyncHub, SyncSignal, SyncSubscription, SyncTopic};
pub use relay::{SyncFrame, sync_routes};
