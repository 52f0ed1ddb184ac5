//! Submitted form parameters and the per-request inputs of a scan.
//!
//! Form values arrive as a flat `key -> string` map. Grouped widgets submit
//! one entry per member under the composite key `fieldId|subKey`.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use toolform_util::{decode_component, encode_component};
use tracing::warn;

/// Parameter carrying the encoded option cache.
pub const CACHE_TOKEN_PARAM: &str = "cached_state";
/// Parameter carrying the percent-encoded JSON of reset-tracking values.
pub const OLD_VALUES_PARAM: &str = "old_values";
/// Parameter naming the selected sub-tool.
pub const SUB_TOOL_PARAM: &str = "sub_class_id";
/// Key under which the selected sub-tool is remembered in the old values.
pub const SUB_TOOL_OLD_VALUE_KEY: &str = "sub_class_id";
/// Parameter present when the user pressed the start button.
pub const START_PARAM: &str = "start";
/// Parameter carrying a resource picker's selection.
pub const RESOURCE_PICKER_PARAM: &str = "dbkey";

/// Separator between a field id and a member key.
pub const GROUP_SEPARATOR: char = '|';

/// Builds the composite key `fieldId|subKey`.
pub fn grouped_key(field_id: &str, sub_key: &str) -> String {
    format!("{}{}{}", field_id, GROUP_SEPARATOR, sub_key)
}

/// Flat map of submitted form values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedParams {
    values: IndexMap<String, String>,
}

impl SubmittedParams {
    pub fn new(values: IndexMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value submitted for member `sub_key` of a grouped field.
    pub fn grouped(&self, field_id: &str, sub_key: &str) -> Option<&str> {
        self.get(&grouped_key(field_id, sub_key))
    }

    /// Every `fieldId|subKey` entry of a grouped field, sorted by member key.
    pub fn grouped_entries(&self, field_id: &str) -> Vec<(String, String)> {
        let prefix = format!("{}{}", field_id, GROUP_SEPARATOR);
        let mut entries: Vec<(String, String)> = self
            .values
            .iter()
            .filter_map(|(key, value)| key.strip_prefix(&prefix).map(|sub_key| (sub_key.to_string(), value.clone())))
            .collect();
        let numeric = entries.iter().all(|(key, _)| key.parse::<i64>().is_ok());
        entries.sort_by(|(left, _), (right, _)| compare_member_keys(left, right, numeric));
        entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for SubmittedParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Orders member keys numerically when every key is an integer, else lexically.
pub(crate) fn compare_member_keys(left: &str, right: &str, numeric: bool) -> Ordering {
    if numeric
        && let (Ok(left_number), Ok(right_number)) = (left.parse::<i64>(), right.parse::<i64>())
    {
        return left_number.cmp(&right_number);
    }
    left.cmp(right)
}

/// Everything a single evaluation of a tool's form needs.
#[derive(Debug, Clone, Default)]
pub struct ToolRequest {
    pub params: SubmittedParams,
    /// Token produced by the previous round trip, if any.
    pub cache_token: Option<String>,
    /// Reset-tracking values from the previous round trip. `None` marks a
    /// first visit, which turns use-defaults mode on.
    pub old_values: Option<JsonMap<String, Value>>,
    /// Sub-tool selection name.
    pub sub_tool: Option<String>,
    /// Fixed default choices; when present they replace submitted values.
    pub init_choices: Option<IndexMap<String, Value>>,
}

impl ToolRequest {
    /// Builds a request from the raw flat parameter map, reading the reserved
    /// cache, old-values and sub-tool keys.
    pub fn from_params(values: IndexMap<String, String>) -> Self {
        let params = SubmittedParams::new(values);
        let cache_token = params.get(CACHE_TOKEN_PARAM).map(str::to_string);
        let old_values = params.get(OLD_VALUES_PARAM).map(decode_old_values);
        let sub_tool = params
            .get(SUB_TOOL_PARAM)
            .map(decode_component)
            .filter(|name| !name.is_empty());
        Self {
            params,
            cache_token,
            old_values,
            sub_tool,
            init_choices: None,
        }
    }

    pub fn with_init_choices(mut self, init_choices: IndexMap<String, Value>) -> Self {
        self.init_choices = Some(init_choices);
        self
    }

    /// First visit: no reset-tracking values were posted back.
    pub fn use_default(&self) -> bool {
        self.old_values.is_none()
    }

    /// Fixed-defaults mode is engaged.
    pub fn fixed_defaults(&self) -> bool {
        self.init_choices.is_some()
    }

    /// Raw value considered for a field before resolution.
    pub fn candidate_value(&self, field_id: &str) -> Value {
        match &self.init_choices {
            Some(choices) => choices.get(field_id).cloned().unwrap_or(Value::Null),
            None => self
                .params
                .get(field_id)
                .map(|value| Value::String(value.to_string()))
                .unwrap_or(Value::Null),
        }
    }
}

/// Decodes the percent-encoded JSON object posted as `old_values`.
pub fn decode_old_values(raw: &str) -> JsonMap<String, Value> {
    let decoded = decode_component(raw);
    match serde_json::from_str::<Value>(&decoded) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("ignoring malformed old_values parameter");
            JsonMap::new()
        }
    }
}

/// Percent-encoded JSON for the `old_values` parameter of the next round trip.
pub fn encode_old_values(old_values: &JsonMap<String, Value>) -> String {
    let json = Value::Object(old_values.clone()).to_string();
    encode_component(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn grouped_entries_sort_numerically_when_possible() {
        let submitted = SubmittedParams::new(params(&[("hist|10", "c"), ("hist|2", "b"), ("other|1", "x"), ("hist|1", "a")]));
        let keys: Vec<String> = submitted.grouped_entries("hist").into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["1", "2", "10"]);

        let submitted = SubmittedParams::new(params(&[("g|b", "1"), ("g|a", "2"), ("g|10", "3")]));
        let keys: Vec<String> = submitted.grouped_entries("g").into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["10", "a", "b"]);
        assert_eq!(submitted.grouped("g", "a"), Some("2"));
    }

    #[test]
    fn from_params_reads_reserved_keys() {
        let old = encode_old_values(&json!({"first": "a"}).as_object().cloned().unwrap());
        let request = ToolRequest::from_params(params(&[
            ("first", "a"),
            (CACHE_TOKEN_PARAM, "token"),
            (OLD_VALUES_PARAM, &old),
            (SUB_TOOL_PARAM, "Sub%20tool"),
        ]));
        assert_eq!(request.cache_token.as_deref(), Some("token"));
        assert_eq!(request.old_values.as_ref().and_then(|values| values.get("first")), Some(&json!("a")));
        assert_eq!(request.sub_tool.as_deref(), Some("Sub tool"));
        assert!(!request.use_default());
        assert_eq!(request.candidate_value("first"), json!("a"));
        assert_eq!(request.candidate_value("missing"), Value::Null);
    }

    #[test]
    fn first_visit_uses_defaults_and_init_choices_override_params() {
        let request = ToolRequest::from_params(params(&[("first", "submitted")]))
            .with_init_choices(indexmap! {"first".to_string() => json!("fixed")});
        assert!(request.use_default());
        assert!(request.fixed_defaults());
        assert_eq!(request.candidate_value("first"), json!("fixed"));
    }

    #[test]
    fn malformed_old_values_decode_to_empty_map() {
        assert!(decode_old_values("%7Bnot-json").is_empty());
        assert!(decode_old_values("%5B1%2C2%5D").is_empty());
    }
}
