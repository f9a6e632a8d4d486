//! Mutation kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a queued or pushed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Task was created locally.
    Create,
    /// Task was modified locally.
    Update,
    /// Task was deleted locally.
    Delete,
}

impl OperationType {
    /// Returns the wire name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    /// Returns true for deletions, which carry no payload.
    pub fn is_delete(&self) -> bool {
        matches!(self, OperationType::Delete)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(serde_json::to_string(&OperationType::Create).unwrap(), "\"create\"");
        assert_eq!(
            serde_json::from_str::<OperationType>("\"delete\"").unwrap(),
            OperationType::Delete
        );
        assert_eq!(OperationType::Update.to_string(), "update");
        assert!(OperationType::Delete.is_delete());
        assert!(!OperationType::Create.is_delete());
    }
}
