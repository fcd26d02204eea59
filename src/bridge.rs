//! Desktop IPC bridge: the only door between an untrusted renderer and the
//! sync layer.
//!
//! Channels outside the allow-list are refused, string arguments are trimmed
//! before decoding, and every call lands on a `Surface` operation.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::notify::{Notice, NoticeLevel};
use crate::surface::Surface;
use crate::todos::ids::{CategoryId, TodoId};
use crate::todos::model::{CategoryPatch, NewCategory, NewTodo, TodoPatch};

/// Channels a renderer may invoke.
pub const ALLOWED_CHANNELS: &[&str] = &[
    "todos:list",
    "todos:create",
    "todos:toggle",
    "todos:update",
    "todos:delete",
    "todos:clear-completed",
    "todos:reorder",
    "categories:list",
    "categories:create",
    "categories:update",
    "categories:delete",
    "notification:show",
    "sync:todos",
    "sync:categories",
];

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: TodoId,
}

#[derive(Debug, Deserialize)]
struct UpdateTodoArgs {
    id: TodoId,
    patch: TodoPatch,
}

#[derive(Debug, Deserialize)]
struct ReorderArgs {
    ids: Vec<TodoId>,
}

#[derive(Debug, Deserialize)]
struct UpdateCategoryArgs {
    id: CategoryId,
    patch: CategoryPatch,
}

#[derive(Debug, Deserialize)]
struct NotificationArgs {
    message: String,
    #[serde(default = "default_level")]
    level: NoticeLevel,
}

fn default_level() -> NoticeLevel {
    NoticeLevel::Info
}

/// Trim every string, recursing into arrays and objects.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
        other => other,
    }
}

/// Routes allow-listed IPC calls to one surface.
pub struct IpcBridge {
    surface: Surface,
}

impl IpcBridge {
    pub fn new(surface: Surface) -> Self {
        Self { surface }
    }

    pub fn is_allowed(channel: &str) -> bool {
        ALLOWED_CHANNELS.contains(&channel)
    }

    /// Refuse channels off the allow-list; return the sanitized arguments.
    pub fn validate(channel: &str, args: Value) -> std::result::Result<Value, BridgeError> {
        if !Self::is_allowed(channel) {
            warn!(channel, "Refused IPC call on unknown channel");
            return Err(BridgeError::ChannelNotAllowed {
                channel: channel.to_string(),
            });
        }
        Ok(sanitize(args))
    }

    /// Validate, decode and run one IPC call. The reply is JSON.
    pub async fn dispatch(&self, channel: &str, args: Value) -> Result<Value> {
        let args = Self::validate(channel, args)?;
        debug!(channel, "Dispatching IPC call");
        let s = &self.surface;

        let reply = match channel {
            "todos:list" => {
                let list: ListArgs = decode_or_default(channel, args)?;
                if list.completed {
                    to_json(&s.fetch_completed(list.offset).await?)?
                } else {
                    to_json(&s.fetch_pending().await?)?
                }
            }
            "todos:create" => to_json(&s.create_todo(decode::<NewTodo>(channel, args)?).await?)?,
            "todos:toggle" => {
                let IdArgs { id } = decode(channel, args)?;
                to_json(&s.toggle_todo(id).await?)?
            }
            "todos:update" => {
                let UpdateTodoArgs { id, patch } = decode(channel, args)?;
                to_json(&s.update_todo(id, patch).await?)?
            }
            "todos:delete" => {
                let IdArgs { id } = decode(channel, args)?;
                s.delete_todo(id).await?;
                Value::Null
            }
            "todos:clear-completed" => {
                s.clear_completed().await?;
                Value::Null
            }
            "todos:reorder" => {
                let ReorderArgs { ids } = decode(channel, args)?;
                s.reorder_todos(ids).await?;
                Value::Null
            }
            "categories:list" => to_json(&s.fetch_categories().await?)?,
            "categories:create" => {
                to_json(&s.create_category(decode::<NewCategory>(channel, args)?).await?)?
            }
            "categories:update" => {
                let UpdateCategoryArgs { id, patch } = decode(channel, args)?;
                to_json(&s.update_category(id, patch).await?)?
            }
            "categories:delete" => {
                let IdArgs { id } = decode(channel, args)?;
                s.delete_category(id).await?;
                Value::Null
            }
            "notification:show" => {
                let NotificationArgs { message, level } = decode(channel, args)?;
                s.notify(Notice::new(level, message));
                Value::Null
            }
            "sync:todos" => {
                s.sync().broadcast_todo_sync();
                Value::Null
            }
            "sync:categories" => {
                s.sync().broadcast_category_sync();
                Value::Null
            }
            other => {
                return Err(BridgeError::ChannelNotAllowed {
                    channel: other.to_string(),
                }
                .into());
            }
        };
        Ok(reply)
    }
}

fn decode<T: DeserializeOwned>(channel: &str, args: Value) -> std::result::Result<T, BridgeError> {
    serde_json::from_value(args).map_err(|e| BridgeError::InvalidArguments {
        channel: channel.to_string(),
        reason: e.to_string(),
    })
}

/// Like `decode`, but a missing argument object means "all defaults".
fn decode_or_default<T: DeserializeOwned + Default>(
    channel: &str,
    args: Value,
) -> std::result::Result<T, BridgeError> {
    if args.is_null() {
        Ok(T::default())
    } else {
        decode(channel, args)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> std::result::Result<Value, BridgeError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::SyncConfig;
    use crate::error::Error;
    use crate::remote::MemoryBackend;
    use crate::sync::{SyncHub, SyncSignal, SyncTopic};

    fn bridge(hub: &SyncHub) -> IpcBridge {
        IpcBridge::new(Surface::new(SyncConfig::default(), MemoryBackend::new("u"), hub))
    }

    #[test]
    fn sanitize_trims_nested_strings() {
        let raw = json!({"text": "  hi  ", "tags": [" a ", 3, {"x": " y"}], "done": true});
        assert_eq!(
            sanitize(raw),
            json!({"text": "hi", "tags": ["a", 3, {"x": "y"}], "done": true})
        );
    }

    #[test]
    fn unknown_channels_are_refused() {
        assert!(IpcBridge::validate("todos:create", Value::Null).is_ok());
        assert!(matches!(
            IpcBridge::validate("shell:exec", json!({})),
            Err(BridgeError::ChannelNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn create_then_list_round_trip() {
        let hub = SyncHub::default();
        let bridge = bridge(&hub);
        bridge.dispatch("todos:list", Value::Null).await.unwrap();

        let created = bridge
            .dispatch("todos:create", json!({"text": "  Buy milk  "}))
            .await
            .unwrap();
        assert_eq!(created["text"], "Buy milk");
        assert!(created["id"].as_i64().unwrap() > 0);

        let listed = bridge.dispatch("todos:list", json!({})).await.unwrap();
        assert_eq!(listed["total"], 1);

        let toggled = bridge
            .dispatch("todos:toggle", json!({"id": created["id"]}))
            .await
            .unwrap();
        assert_eq!(toggled["completed"], true);

        let completed = bridge
            .dispatch("todos:list", json!({"completed": true}))
            .await
            .unwrap();
        assert_eq!(completed["pages"][0]["total"], 1);
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported() {
        let hub = SyncHub::default();
        let err = bridge(&hub)
            .dispatch("todos:toggle", json!({"identifier": 1}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Bridge(BridgeError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn out_of_range_ids_are_invalid_arguments() {
        let hub = SyncHub::default();
        let err = bridge(&hub)
            .dispatch("todos:toggle", json!({"id": i64::MIN}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Bridge(BridgeError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn sync_channels_broadcast_to_siblings() {
        let hub = SyncHub::default();
        let mut sibling = hub.channel().subscribe();
        bridge(&hub).dispatch("sync:categories", Value::Null).await.unwrap();
        assert_eq!(
            sibling.recv().await,
            Some(SyncSignal::Changed(SyncTopic::CategorySync))
        );
    }

    #[tokio::test]
    async fn notifications_reach_subscribers() {
        let hub = SyncHub::default();
        let bridge = bridge(&hub);
        let mut notices = bridge.surface.notices();
        bridge
            .dispatch("notification:show", json!({"message": " Saved "}))
            .await
            .unwrap();
        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.message, "Saved");
        assert_eq!(notice.level, NoticeLevel::Info);
    }
}
