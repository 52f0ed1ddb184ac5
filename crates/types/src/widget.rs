//! Raw option shapes returned by field resolvers and the widget tags they map to.
//!
//! Resolvers written in Rust return a [`WidgetSpec`] directly. Resolvers that
//! produce loosely shaped JSON (declarative manifests, cached payloads from
//! older producers) go through [`WidgetSpec::from_raw`], which applies the
//! structural dispatch order documented on that function.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved token: multiselect over every entry the resource provider knows about.
pub const ENUMERATE_ALL: &str = "__genomes__";
/// Reserved token: single resource picker delegated to the resource provider.
pub const RESOURCE_PICKER: &str = "__genome__";
/// Reserved token: item picker delegated to the resource provider.
pub const ITEM_PICKER: &str = "__track__";
/// Reserved token: masked single-line input.
pub const SECRET_INPUT: &str = "__password__";
/// Tuple tag: select over history datasets filtered by format.
pub const RESOURCE_LIST: &str = "__history__";
/// Tuple tag: select over history datasets filtered by producing tool.
pub const TOOL_RESOURCE_LIST: &str = "__toolhistory__";
/// Tuple tag: keyed map of history datasets filtered by format.
pub const GROUPED_RESOURCE_MAP: &str = "__multihistory__";
/// Tuple tag: hidden field carrying a fixed value.
pub const HIDDEN_FIELD: &str = "__hidden__";
/// Tuple tag: read-only text showing a label.
pub const READ_ONLY_TEXT: &str = "__readonly__";
/// Tuple tag: literal markup rendered inline.
pub const INLINE_LITERAL: &str = "__rawstr__";

/// Tagged union of every option shape a resolver may produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WidgetSpec {
    /// No widget; the field contributes an absent value.
    Empty,
    /// Checkbox group keyed by option, each with its default state.
    Multiselect { choices: IndexMap<String, bool> },
    /// Checkbox group over everything the resource provider can list.
    EnumerateAll,
    /// Free text input with a default value.
    Text { default: String },
    /// Single resource picker resolved by the resource provider.
    ResourcePicker,
    /// Item picker resolved by the resource provider, optionally restricted to sources.
    ItemPicker {
        #[serde(default)]
        sources: Vec<String>,
    },
    /// Masked text input.
    SecretInput,
    /// Select over history datasets of the given formats.
    ResourceList {
        #[serde(default)]
        formats: Vec<String>,
    },
    /// Select over history datasets produced by the given tools.
    ToolResourceList {
        #[serde(default)]
        tools: Vec<String>,
    },
    /// Keyed map of history datasets of the given formats.
    GroupedResourceMap {
        #[serde(default)]
        formats: Vec<String>,
    },
    /// Hidden field; a present `value` overrides anything submitted.
    Hidden {
        #[serde(default)]
        value: Option<Value>,
    },
    /// Text input with a label, a display length, and a read-only switch.
    TextInput { label: String, length: u32, readonly: bool },
    /// Literal shown inline and never submitted.
    InlineLiteral { label: String, literal: Value },
    /// Tabular display; the first row is the header.
    Table { header: Vec<Value>, rows: Vec<Vec<Value>> },
    /// Single choice among options.
    Select { options: Vec<String> },
    /// Checkbox with its default state.
    Checkbox { default: bool },
}

impl WidgetSpec {
    /// Classifies a loosely shaped value into a [`WidgetSpec`].
    ///
    /// Shapes are matched in priority order:
    /// null, keyed boolean mapping (or [`ENUMERATE_ALL`]), plain text (with the
    /// picker and secret sentinels), sequence headed by a tuple tag, generic
    /// `(label, length|value, readonly?)` tuple, list of lists, flat list, boolean.
    /// Anything else is [`WidgetSpec::Empty`].
    pub fn from_raw(raw: &Value) -> Self {
        match raw {
            Value::Null => WidgetSpec::Empty,
            Value::Object(map) => WidgetSpec::Multiselect {
                choices: map.iter().map(|(key, value)| (key.clone(), truthy(value))).collect(),
            },
            Value::String(text) => match text.as_str() {
                ENUMERATE_ALL => WidgetSpec::EnumerateAll,
                RESOURCE_PICKER => WidgetSpec::ResourcePicker,
                ITEM_PICKER => WidgetSpec::ItemPicker { sources: Vec::new() },
                SECRET_INPUT => WidgetSpec::SecretInput,
                _ => WidgetSpec::Text { default: text.clone() },
            },
            Value::Array(items) => classify_sequence(items),
            Value::Bool(default) => WidgetSpec::Checkbox { default: *default },
            Value::Number(_) => WidgetSpec::Empty,
        }
    }

    /// Widget tag this shape renders as before any provider delegation.
    pub fn widget_type(&self) -> WidgetType {
        match self {
            WidgetSpec::Empty => WidgetType::Empty,
            WidgetSpec::Multiselect { .. } | WidgetSpec::EnumerateAll => WidgetType::Multiselect,
            WidgetSpec::Text { .. } => WidgetType::Text,
            WidgetSpec::ResourcePicker => WidgetType::ResourcePicker,
            WidgetSpec::ItemPicker { .. } => WidgetType::ItemPicker,
            WidgetSpec::SecretInput => WidgetType::Secret,
            WidgetSpec::ResourceList { .. } => WidgetType::ResourceList,
            WidgetSpec::ToolResourceList { .. } => WidgetType::ToolResourceList,
            WidgetSpec::GroupedResourceMap { .. } => WidgetType::GroupedResourceMap,
            WidgetSpec::Hidden { .. } => WidgetType::Hidden,
            WidgetSpec::TextInput { readonly: true, .. } => WidgetType::TextReadonly,
            WidgetSpec::TextInput { readonly: false, .. } => WidgetType::Text,
            WidgetSpec::InlineLiteral { .. } => WidgetType::InlineLiteral,
            WidgetSpec::Table { .. } => WidgetType::Table,
            WidgetSpec::Select { .. } => WidgetType::Select,
            WidgetSpec::Checkbox { .. } => WidgetType::Checkbox,
        }
    }
}

fn classify_sequence(items: &[Value]) -> WidgetSpec {
    if let Some(Value::String(tag)) = items.first() {
        let rest = &items[1..];
        match tag.as_str() {
            RESOURCE_LIST => return WidgetSpec::ResourceList { formats: strings(rest) },
            TOOL_RESOURCE_LIST => return WidgetSpec::ToolResourceList { tools: strings(rest) },
            GROUPED_RESOURCE_MAP => return WidgetSpec::GroupedResourceMap { formats: strings(rest) },
            ITEM_PICKER => return WidgetSpec::ItemPicker { sources: strings(rest) },
            HIDDEN_FIELD => {
                return WidgetSpec::Hidden {
                    value: rest.first().filter(|value| !value.is_null()).cloned(),
                };
            }
            READ_ONLY_TEXT => {
                let label = rest.first().map(display_string).unwrap_or_default();
                return WidgetSpec::TextInput {
                    length: label.chars().count().max(1) as u32,
                    label,
                    readonly: true,
                };
            }
            INLINE_LITERAL => {
                return WidgetSpec::InlineLiteral {
                    label: String::new(),
                    literal: rest.first().cloned().unwrap_or(Value::Null),
                };
            }
            _ => {}
        }

        if let Some(tuple) = classify_tuple(tag, rest) {
            return tuple;
        }
    }

    if let Some(Value::Array(header)) = items.first() {
        let rows = items[1..]
            .iter()
            .map(|row| match row {
                Value::Array(cells) => cells.clone(),
                other => vec![other.clone()],
            })
            .collect();
        return WidgetSpec::Table {
            header: header.clone(),
            rows,
        };
    }

    WidgetSpec::Select {
        options: items.iter().map(display_string).collect(),
    }
}

/// `(label, length, readonly?)` becomes a text input, `(label, value, readonly?)`
/// with a non-numeric second element an inline literal. Sequences of plain
/// strings are left for the select rule.
fn classify_tuple(label: &str, rest: &[Value]) -> Option<WidgetSpec> {
    if rest.is_empty() || rest.len() > 2 {
        return None;
    }
    let readonly = match rest.get(1) {
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => return None,
        None => None,
    };
    match &rest[0] {
        Value::Number(length) => Some(WidgetSpec::TextInput {
            label: label.to_string(),
            length: length.as_u64().map_or(1, |length| u32::try_from(length).unwrap_or(u32::MAX)),
            readonly: readonly.unwrap_or(false),
        }),
        literal if readonly.is_some() => Some(WidgetSpec::InlineLiteral {
            label: label.to_string(),
            literal: literal.clone(),
        }),
        _ => None,
    }
}

fn strings(values: &[Value]) -> Vec<String> {
    values.iter().map(display_string).collect()
}

/// Truthiness of a loosely typed form value: null, false, zero and empty
/// containers are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Renders a value the way form markup shows it: strings verbatim, anything
/// else as compact JSON.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Tag describing how a canonical value is presented and collected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    #[serde(rename = "none")]
    Empty,
    Multiselect,
    Text,
    TextReadonly,
    ResourcePicker,
    ItemPicker,
    Secret,
    ResourceList,
    ToolResourceList,
    GroupedResourceMap,
    Hidden,
    InlineLiteral,
    Table,
    Select,
    Checkbox,
}

impl WidgetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetType::Empty => "none",
            WidgetType::Multiselect => "multiselect",
            WidgetType::Text => "text",
            WidgetType::TextReadonly => "text_readonly",
            WidgetType::ResourcePicker => "resource_picker",
            WidgetType::ItemPicker => "item_picker",
            WidgetType::Secret => "secret",
            WidgetType::ResourceList => "resource_list",
            WidgetType::ToolResourceList => "tool_resource_list",
            WidgetType::GroupedResourceMap => "grouped_resource_map",
            WidgetType::Hidden => "hidden",
            WidgetType::InlineLiteral => "inline_literal",
            WidgetType::Table => "table",
            WidgetType::Select => "select",
            WidgetType::Checkbox => "checkbox",
        }
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
