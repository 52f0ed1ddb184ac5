//! Per-request field state and the ordered tuple of canonical choices.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::widget::WidgetType;

/// Resolved state of one field for the current request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldState {
    pub id: String,
    pub name: String,
    /// Widget the field renders as.
    pub widget: WidgetType,
    /// Options after coercion (select entries, checkbox map, formatted table, ...).
    pub options: Value,
    /// Canonical value, including values of display-only fields.
    pub value: Value,
    /// Value as shown in form markup.
    pub display_value: String,
    /// Optional help text produced by the tool's info callback.
    #[serde(default)]
    pub info: Option<String>,
    /// Display-only fields contribute an absent value to the [`ChoiceTuple`].
    pub display_only: bool,
}

/// Ordered canonical values, one per field in field-definition order.
///
/// This is the contract handed to validation and execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ChoiceTuple {
    entries: IndexMap<String, Value>,
}

impl ChoiceTuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: impl Into<String>, value: Value) {
        self.entries.insert(id.into(), value);
    }

    /// Value of the field with the given id; `None` when the id is unknown.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    /// Value at the given 0-based position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.entries.get_index(index).map(|(_, value)| value)
    }

    /// String value of a field, `None` when absent or not a string.
    pub fn str(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, value)| (id.as_str(), value))
    }

    /// `repr|repr|...` rendering used in batch command lines.
    pub fn batch_arguments(&self) -> String {
        self.entries.values().map(batch_repr).collect::<Vec<_>>().join("|")
    }
}

/// Literal form understood by batch runners: `None`, `True`/`False`,
/// single-quoted strings, `[..]` lists and `{'key': ..}` mappings.
pub fn batch_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        Value::Array(items) => format!("[{}]", items.iter().map(batch_repr).collect::<Vec<_>>().join(", ")),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(key, value)| format!("{}: {}", quote(key), batch_repr(value)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl FromIterator<(String, Value)> for ChoiceTuple {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Additional history output a tool declares for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryOutput {
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// Per-call context handed to a tool's executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionContext {
    /// Account the run is performed for; empty for anonymous runs.
    #[serde(default)]
    pub username: String,
    /// Output locations for extra history outputs, keyed by output name.
    #[serde(default)]
    pub extra_outputs: IndexMap<String, String>,
    /// Raw run parameters supplied by the host.
    #[serde(default)]
    pub run_params: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn choice_tuple_keeps_field_order() {
        let mut choices = ChoiceTuple::new();
        choices.push("second", json!("b"));
        choices.push("first", json!(null));
        choices.push("third", json!(true));

        assert_eq!(choices.ids().collect::<Vec<_>>(), vec!["second", "first", "third"]);
        assert_eq!(choices.get_index(0), Some(&json!("b")));
        assert_eq!(choices.str("second"), Some("b"));
        assert_eq!(choices.batch_arguments(), "'b'|None|True");
    }

    #[test]
    fn batch_repr_writes_batch_literals() {
        assert_eq!(batch_repr(&json!(false)), "False");
        assert_eq!(batch_repr(&json!(2.5)), "2.5");
        assert_eq!(batch_repr(&json!("it's")), r"'it\'s'");
        assert_eq!(batch_repr(&json!({"a": true, "b": null})), "{'a': True, 'b': None}");
        assert_eq!(batch_repr(&json!(["x", 1])), "['x', 1]");
    }

    #[test]
    fn choice_tuple_serializes_as_object() {
        let choices: ChoiceTuple = vec![("a".to_string(), json!(1)), ("b".to_string(), json!("x"))].into_iter().collect();
        assert_eq!(serde_json::to_value(&choices).expect("serialize"), json!({"a": 1, "b": "x"}));
    }
}
