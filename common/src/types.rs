use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::ScriptValue;

/// Correlates a dispatched operation with the events it later produces. Ids are handed out in
/// dispatch order and are never reused within a process, but they say nothing about the order in
/// which operations complete.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    pub const fn new(id: u64) -> Self {
        OperationId(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<OperationId> for ScriptValue {
    fn from(id: OperationId) -> Self {
        ScriptValue::Integer(id.0 as i64)
    }
}
