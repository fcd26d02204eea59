//! Configuration types.

use crate::error::ConfigError;
use crate::sync::channel::DEFAULT_SYNC_CAPACITY;

/// Sync layer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size of the single pending-list query.
    pub pending_limit: u32,
    /// Page size of each completed-list page.
    pub completed_page_size: u32,
    /// Capacity of the cross-surface broadcast channel.
    pub broadcast_capacity: usize,
    /// Port the sync relay listens on.
    pub relay_port: u16,
    /// Owner recorded on optimistic placeholders.
    pub user_id: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pending_limit: 100,
            completed_page_size: 20,
            broadcast_capacity: DEFAULT_SYNC_CAPACITY,
            relay_port: 8787,
            user_id: "default".to_string(),
        }
    }
}

impl SyncConfig {
    /// Read overrides from `TODO_SYNC_*` variables. Unparseable values keep
    /// their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pending_limit: u32 = std::env::var("TODO_SYNC_PENDING_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pending_limit);

        let completed_page_size: u32 = std::env::var("TODO_SYNC_COMPLETED_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.completed_page_size);

        let broadcast_capacity: usize = std::env::var("TODO_SYNC_BROADCAST_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.broadcast_capacity);

        let relay_port: u16 = std::env::var("TODO_SYNC_RELAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.relay_port);

        let user_id = std::env::var("TODO_SYNC_USER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_id);

        Self {
            pending_limit,
            completed_page_size,
            broadcast_capacity,
            relay_port,
            user_id,
        }
    }

    /// Reject values the cache and relay cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("pending_limit", self.pending_limit as usize),
            ("completed_page_size", self.completed_page_size as usize),
            ("broadcast_capacity", self.broadcast_capacity),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
