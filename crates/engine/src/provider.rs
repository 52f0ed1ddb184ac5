//! External resource lookups delegated to the host.
//!
//! Some option shapes (resource pickers, history lists, "all resources"
//! multiselects) cannot be coerced locally; the coercion engine hands them to
//! an [`ExternalResourceProvider`]. Provider failures never abort a scan.

use std::fmt::Debug;

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of resource a delegated widget asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Single reference resource (for example a genome build).
    Resource,
    /// Item within the selected resource (for example a track).
    Item,
    /// History datasets filtered by format.
    History,
    /// History datasets filtered by producing tool.
    ToolHistory,
    /// History datasets offered as a keyed group.
    GroupedHistory,
}

/// Value chosen for a single-value delegated widget plus what to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    /// Canonical value handed to validation and execution.
    pub value: Value,
    /// Presentation payload for the widget (entries, labels, ...).
    pub presentation: Value,
}

/// Host-supplied catalog of resources.
pub trait ExternalResourceProvider: Debug {
    /// Every known resource keyed by id, with its default selection state.
    fn list_all(&self) -> Result<IndexMap<String, bool>>;

    /// Resolves a single-value widget. `filters` restricts the candidates
    /// (item sources, for example); `selected` is the submitted value, if any.
    fn resolve_single(&self, kind: ResourceKind, filters: &[String], selected: Option<&str>) -> Result<ResolvedResource>;

    /// Ordered `value -> label` entries for a list or group widget.
    fn resolve_group(&self, kind: ResourceKind, filters: &[String]) -> Result<IndexMap<String, String>>;
}

/// Provider with no resources; single-value widgets echo the submitted value.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResourceProvider;

impl ExternalResourceProvider for NullResourceProvider {
    fn list_all(&self) -> Result<IndexMap<String, bool>> {
        Ok(IndexMap::new())
    }

    fn resolve_single(&self, _kind: ResourceKind, _filters: &[String], selected: Option<&str>) -> Result<ResolvedResource> {
        Ok(ResolvedResource {
            value: selected.map(|value| Value::String(value.to_string())).unwrap_or(Value::Null),
            presentation: Value::Null,
        })
    }

    fn resolve_group(&self, _kind: ResourceKind, _filters: &[String]) -> Result<IndexMap<String, String>> {
        Ok(IndexMap::new())
    }
}
