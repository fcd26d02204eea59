//! Structured query keys and partial-key patterns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Todo,
    Category,
}

/// Operation a query performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
}

/// Input parameters of a list query. Absent fields are not part of the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Address of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub entity: Entity,
    pub operation: Operation,
    pub input: ListInput,
}

impl QueryKey {
    /// The single, non-paginated pending list.
    pub const fn pending(limit: u32) -> Self {
        Self {
            entity: Entity::Todo,
            operation: Operation::List,
            input: ListInput {
                completed: Some(false),
                limit: Some(limit),
                offset: None,
            },
        }
    }

    /// One materialization of the infinite completed list, starting at `offset`.
    pub const fn completed(limit: u32, offset: u32) -> Self {
        Self {
            entity: Entity::Todo,
            operation: Operation::List,
            input: ListInput {
                completed: Some(true),
                limit: Some(limit),
                offset: Some(offset),
            },
        }
    }

    /// The category list.
    pub const fn categories() -> Self {
        Self {
            entity: Entity::Category,
            operation: Operation::List,
            input: ListInput {
                completed: None,
                limit: None,
                offset: None,
            },
        }
    }

    pub fn is_completed_list(&self) -> bool {
        KeyPattern::completed_lists().matches(self)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = match self.entity {
            Entity::Todo => "todo",
            Entity::Category => "category",
        };
        write!(f, "{entity}.list")?;
        let mut fields = Vec::new();
        if let Some(completed) = self.input.completed {
            fields.push(format!("completed={completed}"));
        }
        if let Some(limit) = self.input.limit {
            fields.push(format!("limit={limit}"));
        }
        if let Some(offset) = self.input.offset {
            fields.push(format!("offset={offset}"));
        }
        if !fields.is_empty() {
            write!(f, "{{{}}}", fields.join(","))?;
        }
        Ok(())
    }
}

/// A partial key: only the supplied fields are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    pub entity: Option<Entity>,
    pub operation: Option<Operation>,
    pub completed: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl KeyPattern {
    /// Matches `key`. Input fields the key leaves out stay wildcards.
    pub fn exact(key: QueryKey) -> Self {
        Self {
            entity: Some(key.entity),
            operation: Some(key.operation),
            completed: key.input.completed,
            limit: key.input.limit,
            offset: key.input.offset,
        }
    }

    /// Every materialized completed list, whatever its pagination.
    pub fn completed_lists() -> Self {
        Self {
            entity: Some(Entity::Todo),
            operation: Some(Operation::List),
            completed: Some(true),
            ..Self::default()
        }
    }

    /// Every todo list, pending or completed.
    pub fn todo_lists() -> Self {
        Self {
            entity: Some(Entity::Todo),
            operation: Some(Operation::List),
            ..Self::default()
        }
    }

    pub fn categories() -> Self {
        Self {
            entity: Some(Entity::Category),
            operation: Some(Operation::List),
            ..Self::default()
        }
    }

    /// Whether `key` extends this pattern.
    pub fn matches(&self, key: &QueryKey) -> bool {
        field_matches(self.entity, Some(key.entity))
            && field_matches(self.operation, Some(key.operation))
            && field_matches(self.completed, key.input.completed)
            && field_matches(self.limit, key.input.limit)
            && field_matches(self.offset, key.input.offset)
    }
}

impl From<QueryKey> for KeyPattern {
    fn from(key: QueryKey) -> Self {
        Self::exact(key)
    }
}

fn field_matches<T: PartialEq>(wanted: Option<T>, actual: Option<T>) -> bool {
    match wanted {
        Some(w) => actual.is_some_and(|a| a == w),
        None => true,
    }
}
