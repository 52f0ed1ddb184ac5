//! Field definitions supplied by a tool and the references used to reorder them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static description of a single form field (a "box").
///
/// Definitions are created once from the tool description and stay immutable
/// for the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Identifier unique within a tool; also the key of the submitted form value.
    pub id: String,
    /// Human-readable header rendered above the widget.
    pub name: String,
    /// Optional explicit 1-based evaluation position, used when the tool does not
    /// supply a custom order list.
    #[serde(default)]
    pub order_index: Option<usize>,
    /// When true, a change in this field's canonical value discards the submitted
    /// values of every field evaluated after it.
    #[serde(default)]
    pub reset_on_change: bool,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order_index: None,
            reset_on_change: false,
        }
    }

    /// Builds a definition with the legacy positional id (`box1`, `box2`, ...).
    pub fn positional(position: usize, name: impl Into<String>) -> Self {
        Self::new(format!("box{}", position), name)
    }

    pub fn with_order_index(mut self, order_index: usize) -> Self {
        self.order_index = Some(order_index);
        self
    }

    pub fn with_reset_on_change(mut self, reset_on_change: bool) -> Self {
        self.reset_on_change = reset_on_change;
        self
    }
}

/// Reference to a field inside a custom order or reset list.
///
/// Positions are 1-based, matching how tool authors count boxes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum FieldRef {
    Position(usize),
    Id(String),
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Position(position) => write!(f, "#{}", position),
            FieldRef::Id(id) => f.write_str(id),
        }
    }
}

impl From<usize> for FieldRef {
    fn from(position: usize) -> Self {
        FieldRef::Position(position)
    }
}

impl From<&str> for FieldRef {
    fn from(id: &str) -> Self {
        FieldRef::Id(id.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(id: String) -> Self {
        FieldRef::Id(id)
    }
}
