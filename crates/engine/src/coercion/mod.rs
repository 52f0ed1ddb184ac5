//! Widget dispatch: turns resolved options plus a submitted value into the
//! widget to render, the canonical value, and the display-only flag.
//!
//! Shapes that need host data (resource pickers, history lists, "all
//! resources" multiselects) are delegated to the [`ExternalResourceProvider`].
//! A failing provider degrades the field to an absent, display-only value.

mod table;

pub use table::{HtmlTableFormatter, TableFormatter};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value, json};
use toolform_types::{WidgetSpec, WidgetType, display_string, truthy};
use toolform_util::config::DEFAULT_CHECKBOX_TRUE_TOKEN;
use tracing::{debug, warn};

use crate::cache::OptionCache;
use crate::provider::{ExternalResourceProvider, ResourceKind};
use crate::request::{RESOURCE_PICKER_PARAM, SubmittedParams, compare_member_keys};

/// Outcome of coercing one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub widget: WidgetType,
    /// Canonical options the widget renders.
    pub options: Value,
    /// Canonical value.
    pub value: Value,
    /// Display-only fields contribute an absent value to the choice tuple.
    pub display_only: bool,
}

impl Coerced {
    fn new(widget: WidgetType, options: Value, value: Value) -> Self {
        Self {
            widget,
            options,
            value,
            display_only: false,
        }
    }

    fn display_only(widget: WidgetType, options: Value, value: Value) -> Self {
        Self {
            widget,
            options,
            value,
            display_only: true,
        }
    }

    /// Degraded state used when the resource provider fails.
    fn degraded(widget: WidgetType) -> Self {
        Self::display_only(widget, Value::Null, Value::Null)
    }
}

/// Request-scoped coercion settings.
#[derive(Debug, Clone, Copy)]
pub struct CoercionMode<'a> {
    /// Literal a ticked checkbox submits.
    pub true_token: &'a str,
    /// First visit: unset values fall back to the options' own defaults.
    pub use_default: bool,
    /// Values come from fixed default choices and are taken as given.
    pub fixed_defaults: bool,
}

impl Default for CoercionMode<'_> {
    fn default() -> Self {
        Self {
            true_token: DEFAULT_CHECKBOX_TRUE_TOKEN,
            use_default: true,
            fixed_defaults: false,
        }
    }
}

/// Structural dispatcher from [`WidgetSpec`] to [`Coerced`].
#[derive(Debug, Clone, Copy)]
pub struct ValueCoercionEngine<'a> {
    provider: &'a dyn ExternalResourceProvider,
    formatter: &'a dyn TableFormatter,
    params: &'a SubmittedParams,
    mode: CoercionMode<'a>,
}

impl<'a> ValueCoercionEngine<'a> {
    pub fn new(
        provider: &'a dyn ExternalResourceProvider,
        formatter: &'a dyn TableFormatter,
        params: &'a SubmittedParams,
        mode: CoercionMode<'a>,
    ) -> Self {
        Self {
            provider,
            formatter,
            params,
            mode,
        }
    }

    /// Coerces `val` against `spec`. `val` is already absent when a reset is in
    /// effect for this field. Provider data is read from and written to the
    /// `extra` part of `cache`.
    pub fn coerce(&self, field_id: &str, spec: &WidgetSpec, val: Value, cache: &mut OptionCache) -> Coerced {
        match spec {
            WidgetSpec::Empty => Coerced::new(WidgetType::Empty, Value::Null, Value::Null),
            WidgetSpec::Multiselect { choices } => self.multiselect(field_id, choices, val),
            WidgetSpec::EnumerateAll => {
                let choices = match cache.extra::<IndexMap<String, bool>>(field_id) {
                    Some(choices) => {
                        debug!(field = %field_id, "resource listing served from cache");
                        choices
                    }
                    None => match self.provider.list_all() {
                        Ok(choices) => {
                            cache.put_extra(field_id, &choices);
                            choices
                        }
                        Err(error) => {
                            warn!(field = %field_id, error = %error, "resource provider failed to list resources");
                            return Coerced::degraded(WidgetType::Multiselect);
                        }
                    },
                };
                self.multiselect(field_id, &choices, val)
            }
            WidgetSpec::Text { default } => {
                let value = if val.is_null() { Value::String(default.clone()) } else { val };
                let options = json!({"label": value.clone(), "length": 1, "readonly": false});
                Coerced::new(WidgetType::Text, options, value)
            }
            WidgetSpec::ResourcePicker => {
                let selected = self
                    .params
                    .get(RESOURCE_PICKER_PARAM)
                    .map(str::to_string)
                    .or_else(|| val.as_str().map(str::to_string));
                self.single(field_id, WidgetType::ResourcePicker, ResourceKind::Resource, &[], selected.as_deref())
            }
            WidgetSpec::ItemPicker { sources } => {
                self.single(field_id, WidgetType::ItemPicker, ResourceKind::Item, sources, val.as_str())
            }
            WidgetSpec::SecretInput => {
                let value = if val.is_null() { Value::String(String::new()) } else { val };
                Coerced::new(WidgetType::Secret, Value::Null, value)
            }
            WidgetSpec::ResourceList { formats } => {
                self.list(field_id, WidgetType::ResourceList, ResourceKind::History, formats, val)
            }
            WidgetSpec::ToolResourceList { tools } => {
                self.list(field_id, WidgetType::ToolResourceList, ResourceKind::ToolHistory, tools, val)
            }
            WidgetSpec::GroupedResourceMap { formats } => self.grouped(field_id, formats, val),
            WidgetSpec::Hidden { value } => {
                let value = value.clone().unwrap_or(val);
                Coerced::new(WidgetType::Hidden, Value::Null, value)
            }
            WidgetSpec::TextInput { label, length, readonly } => {
                let options = json!({"label": label, "length": length, "readonly": readonly});
                if *readonly {
                    Coerced::display_only(WidgetType::TextReadonly, options, Value::String(label.clone()))
                } else {
                    let value = if val.is_null() { Value::String(label.clone()) } else { val };
                    Coerced::new(WidgetType::Text, options, value)
                }
            }
            WidgetSpec::InlineLiteral { label, literal } => {
                Coerced::display_only(WidgetType::InlineLiteral, json!({"label": label}), literal.clone())
            }
            WidgetSpec::Table { header, rows } => {
                let markup = self.formatter.format(header, rows);
                Coerced::display_only(WidgetType::Table, Value::String(markup.clone()), Value::String(markup))
            }
            WidgetSpec::Select { options } => {
                let is_member = match &val {
                    Value::Null => false,
                    other => {
                        let submitted = display_string(other);
                        options.iter().any(|option| *option == submitted)
                    }
                };
                let value = match options.first() {
                    Some(first) if !is_member => Value::String(first.clone()),
                    _ => val,
                };
                Coerced::new(WidgetType::Select, json!(options), value)
            }
            WidgetSpec::Checkbox { default } => {
                let ticked = match &val {
                    Value::String(text) => text == self.mode.true_token,
                    Value::Bool(flag) => *flag,
                    _ => false,
                };
                let value = ticked || (self.mode.use_default && *default);
                Coerced::new(WidgetType::Checkbox, Value::Bool(*default), Value::Bool(value))
            }
        }
    }

    fn multiselect(&self, field_id: &str, choices: &IndexMap<String, bool>, val: Value) -> Coerced {
        let options = Value::Object(
            choices
                .iter()
                .map(|(key, default)| (key.clone(), Value::Bool(*default)))
                .collect(),
        );
        if self.mode.fixed_defaults {
            return Coerced::new(WidgetType::Multiselect, options, val);
        }
        let submitted = truthy(&val);
        let value: JsonMap<String, Value> = choices
            .iter()
            .map(|(key, default)| {
                let selected = if submitted {
                    self.params.grouped(field_id, key).is_some_and(|member| !member.is_empty())
                } else {
                    *default
                };
                (key.clone(), Value::Bool(selected))
            })
            .collect();
        Coerced::new(WidgetType::Multiselect, options, Value::Object(value))
    }

    fn single(
        &self,
        field_id: &str,
        widget: WidgetType,
        kind: ResourceKind,
        filters: &[String],
        selected: Option<&str>,
    ) -> Coerced {
        match self.provider.resolve_single(kind, filters, selected) {
            Ok(resolved) => Coerced::new(widget, resolved.presentation, resolved.value),
            Err(error) => {
                warn!(field = %field_id, kind = ?kind, error = %error, "resource provider failed to resolve value");
                Coerced::degraded(widget)
            }
        }
    }

    fn list(&self, field_id: &str, widget: WidgetType, kind: ResourceKind, filters: &[String], val: Value) -> Coerced {
        let entries = match self.provider.resolve_group(kind, filters) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(field = %field_id, kind = ?kind, error = %error, "resource provider failed to list entries");
                return Coerced::degraded(widget);
            }
        };
        let value = match (val, entries.keys().next()) {
            (Value::Null, Some(first)) => Value::String(first.clone()),
            (val, _) => val,
        };
        Coerced::new(widget, entries_to_json(&entries), value)
    }

    fn grouped(&self, field_id: &str, formats: &[String], val: Value) -> Coerced {
        let widget = WidgetType::GroupedResourceMap;
        let entries = match self.provider.resolve_group(ResourceKind::GroupedHistory, formats) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(field = %field_id, error = %error, "resource provider failed to list grouped entries");
                return Coerced::degraded(widget);
            }
        };
        let options = entries_to_json(&entries);
        if self.mode.fixed_defaults {
            return Coerced::new(widget, options, val);
        }
        let mut keys: Vec<&String> = entries.keys().collect();
        let numeric = keys.iter().all(|key| key.parse::<i64>().is_ok());
        keys.sort_by(|left, right| compare_member_keys(left, right, numeric));
        let value: JsonMap<String, Value> = keys
            .into_iter()
            .map(|key| {
                let member = self
                    .params
                    .grouped(field_id, key)
                    .map(|member| Value::String(member.to_string()))
                    .unwrap_or(Value::Null);
                (key.clone(), member)
            })
            .collect();
        Coerced::new(widget, options, Value::Object(value))
    }
}

fn entries_to_json(entries: &IndexMap<String, String>) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(key, label)| (key.clone(), Value::String(label.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NullResourceProvider, ResolvedResource};
    use anyhow::{Result, bail};
    use indexmap::indexmap;
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct CatalogProvider {
        list_calls: Cell<usize>,
    }

    impl ExternalResourceProvider for CatalogProvider {
        fn list_all(&self) -> Result<IndexMap<String, bool>> {
            self.list_calls.set(self.list_calls.get() + 1);
            Ok(indexmap! {"hg18".to_string() => false, "hg19".to_string() => true})
        }

        fn resolve_single(&self, kind: ResourceKind, filters: &[String], selected: Option<&str>) -> Result<ResolvedResource> {
            Ok(ResolvedResource {
                value: json!(selected.unwrap_or("hg19")),
                presentation: json!({"kind": kind, "filters": filters}),
            })
        }

        fn resolve_group(&self, _kind: ResourceKind, _filters: &[String]) -> Result<IndexMap<String, String>> {
            Ok(indexmap! {
                "10".to_string() => "tenth".to_string(),
                "2".to_string() => "second".to_string(),
            })
        }
    }

    #[derive(Debug)]
    struct FailingProvider;

    impl ExternalResourceProvider for FailingProvider {
        fn list_all(&self) -> Result<IndexMap<String, bool>> {
            bail!("catalog offline")
        }

        fn resolve_single(&self, _kind: ResourceKind, _filters: &[String], _selected: Option<&str>) -> Result<ResolvedResource> {
            bail!("catalog offline")
        }

        fn resolve_group(&self, _kind: ResourceKind, _filters: &[String]) -> Result<IndexMap<String, String>> {
            bail!("catalog offline")
        }
    }

    fn params(pairs: &[(&str, &str)]) -> SubmittedParams {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    fn coerce_with(
        provider: &dyn ExternalResourceProvider,
        params: &SubmittedParams,
        mode: CoercionMode<'_>,
        spec: &WidgetSpec,
        val: Value,
    ) -> Coerced {
        let formatter = HtmlTableFormatter::default();
        let engine = ValueCoercionEngine::new(provider, &formatter, params, mode);
        engine.coerce("field", spec, val, &mut OptionCache::default())
    }

    fn coerce(spec: &WidgetSpec, val: Value) -> Coerced {
        coerce_with(&NullResourceProvider, &SubmittedParams::default(), CoercionMode::default(), spec, val)
    }

    #[test]
    fn each_shape_class_yields_documented_widget() {
        let cases = [
            (json!(null), WidgetType::Empty),
            (json!({"a": true}), WidgetType::Multiselect),
            (json!("text"), WidgetType::Text),
            (json!("__password__"), WidgetType::Secret),
            (json!(["__hidden__", "x"]), WidgetType::Hidden),
            (json!(["label", 5]), WidgetType::Text),
            (json!(["label", 5, true]), WidgetType::TextReadonly),
            (json!(["label", "<b>", false]), WidgetType::InlineLiteral),
            (json!([["h"], ["r"]]), WidgetType::Table),
            (json!(["a", "b"]), WidgetType::Select),
            (json!(false), WidgetType::Checkbox),
            (json!(1.5), WidgetType::Empty),
        ];
        for (raw, expected) in cases {
            let coerced = coerce(&WidgetSpec::from_raw(&raw), Value::Null);
            assert_eq!(coerced.widget, expected, "raw shape {}", raw);
        }
    }

    #[test]
    fn select_defaults_to_first_option_when_unset_or_unknown() {
        let spec = WidgetSpec::from_raw(&json!(["a", "b", "c"]));
        assert_eq!(coerce(&spec, Value::Null).value, json!("a"));
        assert_eq!(coerce(&spec, json!("z")).value, json!("a"));
        assert_eq!(coerce(&spec, json!("b")).value, json!("b"));

        let empty = WidgetSpec::Select { options: Vec::new() };
        assert_eq!(coerce(&empty, json!("z")).value, json!("z"));
    }

    #[test]
    fn text_defaults_to_raw_text() {
        let spec = WidgetSpec::from_raw(&json!("default text"));
        let coerced = coerce(&spec, Value::Null);
        assert_eq!(coerced.value, json!("default text"));
        assert_eq!(coerced.options, json!({"label": "default text", "length": 1, "readonly": false}));
        assert_eq!(coerce(&spec, json!("typed")).value, json!("typed"));
    }

    #[test]
    fn readonly_tuple_forces_label_and_is_display_only() {
        let coerced = coerce(&WidgetSpec::from_raw(&json!(["fixed", 10, true])), json!("edited"));
        assert_eq!(coerced.value, json!("fixed"));
        assert!(coerced.display_only);

        let editable = coerce(&WidgetSpec::from_raw(&json!(["fixed", 10])), Value::Null);
        assert_eq!(editable.value, json!("fixed"));
        assert!(!editable.display_only);
    }

    #[test]
    fn checkbox_follows_true_token_and_defaults() {
        let spec = WidgetSpec::Checkbox { default: true };
        assert_eq!(coerce(&spec, json!("True")).value, json!(true));
        assert_eq!(coerce(&spec, Value::Null).value, json!(true));

        let submitted = CoercionMode {
            use_default: false,
            ..CoercionMode::default()
        };
        let params = SubmittedParams::default();
        assert_eq!(coerce_with(&NullResourceProvider, &params, submitted, &spec, Value::Null).value, json!(false));
        assert_eq!(coerce_with(&NullResourceProvider, &params, submitted, &spec, json!("true")).value, json!(false));

        let custom = CoercionMode {
            true_token: "on",
            use_default: false,
            fixed_defaults: false,
        };
        assert_eq!(coerce_with(&NullResourceProvider, &params, custom, &spec, json!("on")).value, json!(true));
    }

    #[test]
    fn multiselect_reads_grouped_keys_once_submitted() {
        let spec = WidgetSpec::from_raw(&json!({"a": true, "b": false, "c": true}));
        assert_eq!(coerce(&spec, Value::Null).value, json!({"a": true, "b": false, "c": true}));

        let submitted = params(&[("field", "1"), ("field|b", "on"), ("field|c", "")]);
        let coerced = coerce_with(&NullResourceProvider, &submitted, CoercionMode::default(), &spec, json!("1"));
        assert_eq!(coerced.value, json!({"a": false, "b": true, "c": false}));
    }

    #[test]
    fn hidden_value_overrides_submission() {
        assert_eq!(coerce(&WidgetSpec::from_raw(&json!(["__hidden__", "fixed"])), json!("x")).value, json!("fixed"));
        assert_eq!(coerce(&WidgetSpec::Hidden { value: None }, json!("x")).value, json!("x"));
    }

    #[test]
    fn table_and_literal_are_display_only() {
        let table = coerce(&WidgetSpec::from_raw(&json!([["h1"], ["v1"]])), Value::Null);
        assert!(table.display_only);
        assert!(table.value.as_str().is_some_and(|markup| markup.contains("<td>v1</td>")));

        let literal = coerce(&WidgetSpec::from_raw(&json!(["__rawstr__", "<hr>"])), Value::Null);
        assert!(literal.display_only);
        assert_eq!(literal.value, json!("<hr>"));
    }

    #[test]
    fn secret_defaults_to_empty_string() {
        assert_eq!(coerce(&WidgetSpec::SecretInput, Value::Null).value, json!(""));
    }

    #[test]
    fn enumerate_all_lists_once_and_caches_in_extra() {
        let provider = CatalogProvider::default();
        let formatter = HtmlTableFormatter::default();
        let params = SubmittedParams::default();
        let engine = ValueCoercionEngine::new(&provider, &formatter, &params, CoercionMode::default());
        let mut cache = OptionCache::default();

        let first = engine.coerce("genomes", &WidgetSpec::EnumerateAll, Value::Null, &mut cache);
        let second = engine.coerce("genomes", &WidgetSpec::EnumerateAll, Value::Null, &mut cache);
        assert_eq!(first.widget, WidgetType::Multiselect);
        assert_eq!(first.value, json!({"hg18": false, "hg19": true}));
        assert_eq!(second, first);
        assert_eq!(provider.list_calls.get(), 1);
    }

    #[test]
    fn resource_picker_prefers_dbkey_param() {
        let submitted = params(&[("dbkey", "mm9")]);
        let coerced = coerce_with(
            &CatalogProvider::default(),
            &submitted,
            CoercionMode::default(),
            &WidgetSpec::ResourcePicker,
            json!("hg18"),
        );
        assert_eq!(coerced.widget, WidgetType::ResourcePicker);
        assert_eq!(coerced.value, json!("mm9"));
    }

    #[test]
    fn resource_list_defaults_to_first_entry() {
        let spec = WidgetSpec::ResourceList { formats: vec!["bed".into()] };
        let coerced = coerce_with(&CatalogProvider::default(), &SubmittedParams::default(), CoercionMode::default(), &spec, Value::Null);
        assert_eq!(coerced.value, json!("10"));
        assert_eq!(coerced.options, json!({"10": "tenth", "2": "second"}));
    }

    #[test]
    fn grouped_map_orders_members_numerically() {
        let spec = WidgetSpec::GroupedResourceMap { formats: Vec::new() };
        let submitted = params(&[("field|10", "x"), ("field|2", "y")]);
        let coerced = coerce_with(&CatalogProvider::default(), &submitted, CoercionMode::default(), &spec, Value::Null);
        let keys: Vec<&String> = coerced.value.as_object().map(|map| map.keys().collect()).unwrap_or_default();
        assert_eq!(keys, vec!["2", "10"]);
        assert_eq!(coerced.value["2"], json!("y"));
    }

    #[test]
    fn provider_failure_degrades_field() {
        let submitted = SubmittedParams::default();
        for spec in [
            WidgetSpec::EnumerateAll,
            WidgetSpec::ResourcePicker,
            WidgetSpec::ResourceList { formats: Vec::new() },
            WidgetSpec::GroupedResourceMap { formats: Vec::new() },
        ] {
            let coerced = coerce_with(&FailingProvider, &submitted, CoercionMode::default(), &spec, json!("x"));
            assert!(coerced.display_only, "{:?}", spec);
            assert_eq!(coerced.value, Value::Null);
        }
    }

    #[test]
    fn fixed_defaults_take_multiselect_values_as_given() {
        let fixed = CoercionMode {
            fixed_defaults: true,
            ..CoercionMode::default()
        };
        let spec = WidgetSpec::from_raw(&json!({"a": true}));
        let coerced = coerce_with(&NullResourceProvider, &SubmittedParams::default(), fixed, &spec, json!({"a": false}));
        assert_eq!(coerced.value, json!({"a": false}));
    }
}
