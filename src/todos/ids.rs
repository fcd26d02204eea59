//! Record identity: server-confirmed vs. client-provisional ids.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identity of a todo or category.
///
/// On the wire a provisional id is the negated clock value it was derived
/// from, so confirmed (positive) and provisional (negative) ids never collide.
/// `i64::MIN` has no positive counterpart and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RecordId {
    /// Assigned by the server.
    Confirmed(i64),
    /// Generated locally for an optimistic record; holds the clock value.
    Provisional(i64),
}

pub type TodoId = RecordId;
pub type CategoryId = RecordId;

impl RecordId {
    /// Whether the server has not assigned this id yet.
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    /// The confirmed server id, if any.
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            Self::Confirmed(id) => Some(*id),
            Self::Provisional(_) => None,
        }
    }

    /// Wire representation.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Confirmed(id) => *id,
            Self::Provisional(clock) => -clock,
        }
    }
}

impl TryFrom<i64> for RecordId {
    type Error = ValidationError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0.. => Ok(Self::Confirmed(raw)),
            i64::MIN => Err(ValidationError::InvalidId { raw }),
            _ => Ok(Self::Provisional(-raw)),
        }
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.as_i64()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Monotonic generator of provisional ids derived from the wall clock.
#[derive(Debug, Default)]
pub struct ProvisionalIds {
    last: AtomicI64,
}

impl ProvisionalIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next provisional id. Strictly greater than every previous one, even
    /// when called twice within the same millisecond.
    pub fn next(&self) -> RecordId {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return RecordId::Provisional(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}
