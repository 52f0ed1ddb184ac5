//! Declarative tool manifests.
//!
//! A manifest describes a tool in YAML (or JSON) without Rust callbacks:
//!
//! ```yaml
//! tool: demo
//! name: Demo tool
//! fields:
//!   - { id: first, name: First, options: [a, b] }
//!   - id: second
//!     name: Second
//!     depends_on: first
//!     cases: { a: [x, y], b: [z] }
//!     fallback: null
//! reset_on_change: [first]
//! required: [second]
//! ```
//!
//! `options`, `cases` values and `fallback` are raw option shapes classified
//! with [`WidgetSpec::from_raw`].

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolform_types::{FieldDefinition, FieldRef, WidgetSpec, display_string};
use tracing::debug;

use crate::error::ManifestError;
use crate::registry::FieldRegistry;
use crate::resolver::{ChoiceContext, FieldCallbacks, InfoFn, ResolveFn};
use crate::tool::ToolDefinition;
use crate::validator::required_fields;

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub tool: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Name shown in a parent's sub-tool selector.
    #[serde(default)]
    pub selection_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldManifest>,
    #[serde(default)]
    pub custom_order: Option<Vec<FieldRef>>,
    #[serde(default)]
    pub reset_on_change: Option<Vec<FieldRef>>,
    /// Ids of fields that must hold a non-empty value.
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default = "default_batch")]
    pub batch: bool,
    #[serde(default)]
    pub public: bool,
    /// Demo values, one per field.
    #[serde(default)]
    pub demo: Vec<String>,
    #[serde(default)]
    pub sub_tools: Vec<ToolManifest>,
}

fn default_batch() -> bool {
    true
}

/// One field of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldManifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Raw option shape used when the field has no dependency.
    #[serde(default)]
    pub options: Value,
    /// Field whose canonical value selects an entry of `cases`.
    #[serde(default)]
    pub depends_on: Option<String>,
    #[serde(default)]
    pub cases: IndexMap<String, Value>,
    /// Raw option shape used when no case matches.
    #[serde(default)]
    pub fallback: Value,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub reset_on_change: bool,
    #[serde(default)]
    pub order_index: Option<usize>,
}

impl FieldManifest {
    fn definition(&self) -> FieldDefinition {
        let mut definition = FieldDefinition::new(self.id.clone(), self.name.clone().unwrap_or_else(|| self.id.clone()))
            .with_reset_on_change(self.reset_on_change);
        if let Some(order_index) = self.order_index {
            definition = definition.with_order_index(order_index);
        }
        definition
    }

    fn callbacks(&self) -> FieldCallbacks {
        let resolve: Arc<ResolveFn> = match &self.depends_on {
            None => {
                let options = WidgetSpec::from_raw(&self.options);
                Arc::new(move |_: &ChoiceContext<'_>| -> anyhow::Result<WidgetSpec> { Ok(options.clone()) })
            }
            Some(dependency) => {
                let dependency = dependency.clone();
                let cases: IndexMap<String, WidgetSpec> = self
                    .cases
                    .iter()
                    .map(|(key, raw)| (key.clone(), WidgetSpec::from_raw(raw)))
                    .collect();
                let fallback = WidgetSpec::from_raw(&self.fallback);
                Arc::new(move |context: &ChoiceContext<'_>| -> anyhow::Result<WidgetSpec> {
                    let selected = context
                        .prior(&dependency)
                        .filter(|value| !value.is_null())
                        .and_then(|value| cases.get(&display_string(value)));
                    Ok(selected.unwrap_or(&fallback).clone())
                })
            }
        };
        let callbacks = FieldCallbacks::new(resolve);
        match &self.info {
            Some(text) => {
                let text = text.clone();
                let info: Arc<InfoFn> =
                    Arc::new(move |_: &ChoiceContext<'_>| -> anyhow::Result<Option<String>> { Ok(Some(text.clone())) });
                callbacks.with_info(info)
            }
            None => callbacks,
        }
    }
}

impl ToolManifest {
    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Checks references and builds the tool.
    pub fn into_definition(self) -> Result<ToolDefinition, ManifestError> {
        for field in &self.fields {
            if let Some(dependency) = &field.depends_on
                && !self.fields.iter().any(|candidate| &candidate.id == dependency)
            {
                return Err(ManifestError::UnknownDependency {
                    field: field.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let definitions: Vec<FieldDefinition> = self.fields.iter().map(FieldManifest::definition).collect();
        FieldRegistry::new(definitions.clone(), self.custom_order.as_deref(), self.reset_on_change.as_deref())?;

        let mut required = Vec::with_capacity(self.required.len());
        for id in &self.required {
            let Some(definition) = definitions.iter().find(|definition| &definition.id == id) else {
                return Err(ManifestError::UnknownRequiredField { id: id.clone() });
            };
            required.push((definition.id.clone(), definition.name.clone()));
        }

        let mut builder = ToolDefinition::builder(self.tool.clone())
            .batch_tool(self.batch)
            .public(self.public)
            .demo_selections(self.demo);
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(selection_name) = self.selection_name {
            builder = builder.selection_name(selection_name);
        }
        for (field, definition) in self.fields.iter().zip(definitions) {
            builder = builder.field_callbacks(definition, field.callbacks());
        }
        if let Some(order) = self.custom_order {
            builder = builder.custom_order(order);
        }
        if let Some(reset) = self.reset_on_change {
            builder = builder.reset_on_change(reset);
        }
        if !required.is_empty() {
            builder = builder.validator_arc(required_fields(required));
        }
        for sub_tool in self.sub_tools {
            builder = builder.sub_tool(sub_tool.into_definition()?);
        }
        Ok(builder.build())
    }
}

/// Reads a manifest file and builds the tool it describes.
pub fn parse_tool_manifest_file(file_path: impl AsRef<Path>) -> Result<ToolDefinition, ManifestError> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).map_err(|source| ManifestError::Io {
        path: file_path.display().to_string(),
        source,
    })?;
    let manifest = ToolManifest::from_yaml_str(&content)?;
    debug!(path = %file_path.display(), tool = %manifest.tool, fields = manifest.fields.len(), "parsed tool manifest");
    manifest.into_definition()
}
