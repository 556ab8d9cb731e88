//! Operation names and hook event naming.
//!
//! Every collection operation has a stable camelCase name that forms the
//! suffix of its hook events: `before.create`, `after.getAll`, and so on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The operations a collection exposes through its hook pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Get,
    Update,
    Delete,
    /// Removes every document. Disabled outside development environments.
    Clear,
    GetAll,
    Find,
    Filter,
    Pager,
    FindOne,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 10] = [
        Action::Create,
        Action::Get,
        Action::Update,
        Action::Delete,
        Action::Clear,
        Action::GetAll,
        Action::Find,
        Action::Filter,
        Action::Pager,
        Action::FindOne,
    ];

    /// Returns the camelCase operation name used in event names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Get => "get",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Clear => "clear",
            Action::GetAll => "getAll",
            Action::Find => "find",
            Action::Filter => "filter",
            Action::Pager => "pager",
            Action::FindOne => "findOne",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Which side of the action a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
}

impl HookPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::Before => "before",
            HookPhase::After => "after",
        }
    }

    /// Full event name for this phase and action, e.g. `"before.create"`.
    #[must_use]
    pub fn event_name(self, action: Action) -> String {
        format!("{}.{}", self.as_str(), action.as_str())
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
