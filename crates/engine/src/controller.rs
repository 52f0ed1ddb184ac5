//! Per-request facade: selects the tool, runs the scan and validation, and
//! exposes everything a form renderer or executor needs afterwards.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value};
use toolform_types::{ChoiceTuple, ExecutionContext, FieldState, HistoryOutput, WidgetSpec, WidgetType};
use toolform_util::config::{DEFAULT_CHECKBOX_TRUE_TOKEN, DEFAULT_COMPRESSION_LEVEL};
use toolform_util::{ToolformConfig, append_query_pairs};
use tracing::{debug, info, warn};

use crate::cache::{CacheEncodeError, OptionCache};
use crate::cascade::{CascadeController, CascadeFlags};
use crate::coercion::{CoercionMode, HtmlTableFormatter, TableFormatter, ValueCoercionEngine};
use crate::error::ControllerError;
use crate::provider::{ExternalResourceProvider, NullResourceProvider};
use crate::registry::FieldRegistry;
use crate::request::{
    RESOURCE_PICKER_PARAM, START_PARAM, SUB_TOOL_OLD_VALUE_KEY, SubmittedParams, ToolRequest, encode_old_values,
};
use crate::resolver::OptionResolver;
use crate::tool::ToolDefinition;
use crate::validator::ValidationState;

/// Base of demo links.
const DEMO_URL_BASE: &str = "?mako=generictool";

/// Host collaborators consulted during coercion.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn ExternalResourceProvider + Send + Sync>,
    pub formatter: Arc<dyn TableFormatter + Send + Sync>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            provider: Arc::new(NullResourceProvider),
            formatter: Arc::new(HtmlTableFormatter::default()),
        }
    }
}

impl Collaborators {
    pub fn with_provider(mut self, provider: Arc<dyn ExternalResourceProvider + Send + Sync>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn TableFormatter + Send + Sync>) -> Self {
        self.formatter = formatter;
        self
    }
}

/// Settings taken from the host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// zlib level used when encoding the cache token.
    pub compression_level: u32,
    /// Literal a ticked checkbox submits.
    pub checkbox_true_token: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            checkbox_true_token: DEFAULT_CHECKBOX_TRUE_TOKEN.to_string(),
        }
    }
}

impl From<&ToolformConfig> for ControllerOptions {
    fn from(config: &ToolformConfig) -> Self {
        Self {
            compression_level: config.compression_level,
            checkbox_true_token: config.checkbox_true_token.clone(),
        }
    }
}

/// Evaluated form for one request.
#[derive(Debug)]
pub struct ToolController<'a> {
    root: &'a ToolDefinition,
    definition: &'a ToolDefinition,
    request: ToolRequest,
    options: ControllerOptions,
    fields: Vec<FieldState>,
    specs: Vec<WidgetSpec>,
    choices: ChoiceTuple,
    flags: CascadeFlags,
    recomputed: Vec<String>,
    validation: ValidationState,
    extra_outputs: Vec<HistoryOutput>,
    cache: OptionCache,
    old_values: JsonMap<String, Value>,
}

impl<'a> ToolController<'a> {
    /// Evaluates `tool` for `request`.
    ///
    /// Fails on invalid field references in the selected definition and on
    /// any resolver error; every other failure degrades softly.
    pub fn new(
        tool: &'a ToolDefinition,
        request: ToolRequest,
        collaborators: &Collaborators,
        options: ControllerOptions,
    ) -> Result<Self, ControllerError> {
        let use_default = request.use_default();
        let mut old_values = request.old_values.clone().unwrap_or_default();
        let mut reset_all = false;

        let definition = match request.sub_tool.as_deref().and_then(|name| tool.select(name)) {
            Some(selected) => {
                let name = selected.selection_name();
                let recorded = old_values.get(SUB_TOOL_OLD_VALUE_KEY).and_then(Value::as_str);
                if recorded != Some(name) {
                    debug!(tool = %tool.tool_id(), sub_tool = %name, "sub-tool selection changed");
                    old_values.insert(SUB_TOOL_OLD_VALUE_KEY.to_string(), Value::String(name.to_string()));
                    // Links carrying parameters (demo, redirect) must keep them.
                    reset_all = !use_default;
                }
                selected
            }
            None => {
                if let Some(name) = request.sub_tool.as_deref() {
                    warn!(tool = %tool.tool_id(), sub_tool = %name, "unknown sub-tool selection; using the main tool");
                }
                tool
            }
        };

        let registry = FieldRegistry::new(
            definition.fields.clone(),
            definition.custom_order(),
            definition.reset_on_change(),
        )?;
        let mut cache = OptionCache::decode(request.cache_token.as_deref());
        let evaluation_order = registry
            .order()
            .iter()
            .filter_map(|&index| registry.field(index))
            .map(|field| field.id.clone())
            .collect();
        if cache.bind_order(evaluation_order) {
            debug!(tool = %definition.tool_id(), "cached options were built under another field order");
        }

        let mode = CoercionMode {
            true_token: &options.checkbox_true_token,
            use_default,
            fixed_defaults: request.fixed_defaults(),
        };
        let coercion = ValueCoercionEngine::new(
            collaborators.provider.as_ref(),
            collaborators.formatter.as_ref(),
            &request.params,
            mode,
        );
        let resolver = OptionResolver::new(&definition.callbacks);
        let outcome = CascadeController::new(&registry, resolver, coercion, &request).scan(
            reset_all,
            &mut cache,
            &mut old_values,
        )?;

        let validation = ValidationState::run(definition.validator.as_deref(), &outcome.choices);
        let extra_outputs = definition
            .extra_outputs
            .as_ref()
            .map(|outputs| outputs(&outcome.choices))
            .unwrap_or_default();

        info!(
            tool = %definition.tool_id(),
            fields = outcome.fields.len(),
            recomputed = outcome.recomputed.len(),
            reset = outcome.flags.reset_all,
            valid = validation.is_valid(),
            "form scan complete"
        );

        Ok(Self {
            root: tool,
            definition,
            request,
            options,
            fields: outcome.fields,
            specs: outcome.specs,
            choices: outcome.choices,
            flags: outcome.flags,
            recomputed: outcome.recomputed,
            validation,
            extra_outputs,
            cache,
            old_values,
        })
    }

    /// Definition in effect for this request (a sub-tool when one is selected).
    pub fn tool(&self) -> &ToolDefinition {
        self.definition
    }

    pub fn request(&self) -> &ToolRequest {
        &self.request
    }

    /// Field states in definition order.
    pub fn fields(&self) -> &[FieldState] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&FieldState> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn choices(&self) -> &ChoiceTuple {
        &self.choices
    }

    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    pub fn has_error_message(&self) -> bool {
        self.validation.has_error_message()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.validation.error_message()
    }

    /// Flags as they stood after the last field.
    pub fn flags(&self) -> CascadeFlags {
        self.flags
    }

    /// Ids whose resolver ran during this request, in evaluation order.
    pub fn recomputed_fields(&self) -> &[String] {
        &self.recomputed
    }

    pub fn cache(&self) -> &OptionCache {
        &self.cache
    }

    /// Encoded cache for the next round trip.
    pub fn cache_token(&self) -> Result<String, CacheEncodeError> {
        self.cache.encode(self.options.compression_level)
    }

    pub fn old_values(&self) -> &JsonMap<String, Value> {
        &self.old_values
    }

    /// Percent-encoded `old_values` parameter for the next round trip.
    pub fn old_values_param(&self) -> String {
        encode_old_values(&self.old_values)
    }

    /// Sub-tool selector entries of the requested tool.
    pub fn sub_tool_titles(&self) -> Vec<&str> {
        self.root.sub_tool_titles()
    }

    pub fn extra_outputs(&self) -> &[HistoryOutput] {
        &self.extra_outputs
    }

    pub fn is_public(&self) -> bool {
        self.definition.is_public()
    }

    pub fn is_debugging(&self) -> bool {
        self.definition.is_debug_mode()
    }

    /// `$Tool[<id>](<arg>|<arg>...)` line for batch runs. Tools with
    /// sub-tools and non-batch tools have none.
    pub fn batch_line(&self) -> Option<String> {
        if !self.root.sub_tools().is_empty() || !self.definition.is_batch_tool() {
            return None;
        }
        Some(format!("$Tool[{}]({})", self.root.tool_id(), self.choices.batch_arguments()))
    }

    /// Link that opens the tool with its demo selections filled in.
    pub fn demo_url(&self) -> Option<String> {
        let demo = self.definition.demo_selections();
        if demo.is_empty() {
            return None;
        }
        if demo.len() < self.fields.len() {
            warn!(
                tool = %self.definition.tool_id(),
                selections = demo.len(),
                fields = self.fields.len(),
                "demo selections do not cover every field"
            );
            return None;
        }
        let base = format!("{}&tool_id={}", DEMO_URL_BASE, self.root.tool_id());
        let pairs = self.fields.iter().zip(demo).map(|(field, value)| {
            let key = if field.widget == WidgetType::ResourcePicker {
                RESOURCE_PICKER_PARAM
            } else {
                field.id.as_str()
            };
            (key, value.as_str())
        });
        Some(append_query_pairs(&base, pairs))
    }

    pub fn full_example_url(&self) -> Option<&str> {
        self.definition.full_example_url()
    }

    pub fn is_redirect_tool(&self) -> bool {
        self.definition.is_redirect_tool()
    }

    pub fn redirect_url(&self) -> Option<String> {
        self.definition.redirect.as_ref().and_then(|redirect| redirect(&self.choices))
    }

    /// Redirect tool with a target, and the user pressed start.
    pub fn do_redirect(&self) -> bool {
        self.request.params.contains(START_PARAM) && self.redirect_url().is_some()
    }

    /// Rebuilds the choices from a final submission.
    pub fn collect_execution_choices(&self, params: &SubmittedParams) -> ChoiceTuple {
        self.fields
            .iter()
            .zip(&self.specs)
            .map(|(field, spec)| {
                let id = field.id.as_str();
                let value = match spec {
                    WidgetSpec::EnumerateAll | WidgetSpec::GroupedResourceMap { .. } => Value::Object(
                        params
                            .grouped_entries(id)
                            .into_iter()
                            .map(|(key, value)| (key, Value::String(value)))
                            .collect(),
                    ),
                    WidgetSpec::Multiselect { choices } => Value::Object(
                        choices
                            .keys()
                            .map(|key| {
                                let member = params
                                    .grouped(id, key)
                                    .map(|member| Value::String(member.to_string()))
                                    .unwrap_or(Value::Bool(false));
                                (key.clone(), member)
                            })
                            .collect(),
                    ),
                    WidgetSpec::ResourcePicker => {
                        Value::String(params.get(RESOURCE_PICKER_PARAM).unwrap_or_default().to_string())
                    }
                    WidgetSpec::Checkbox { .. } => {
                        Value::Bool(params.get(id) == Some(self.options.checkbox_true_token.as_str()))
                    }
                    _ => Value::String(params.get(id).unwrap_or_default().to_string()),
                };
                (field.id.clone(), value)
            })
            .collect()
    }

    /// Runs the executor over the scanned choices. Refused while the
    /// validator reports an error.
    pub fn execute(&self, context: &ExecutionContext) -> Result<Option<String>, ControllerError> {
        self.execute_choices(&self.choices, context)
    }

    /// Runs the executor over explicitly supplied choices, typically from
    /// [`collect_execution_choices`](Self::collect_execution_choices).
    pub fn execute_choices(
        &self,
        choices: &ChoiceTuple,
        context: &ExecutionContext,
    ) -> Result<Option<String>, ControllerError> {
        let tool = self.definition.tool_id().to_string();
        if !self.is_valid() {
            return Err(ControllerError::Invalid {
                tool,
                message: self.error_message().unwrap_or_default().to_string(),
            });
        }
        let Some(executor) = &self.definition.executor else {
            return Err(ControllerError::NotExecutable { tool });
        };
        info!(tool = %tool, user = %context.username, "executing tool");
        executor(choices, context).map_err(|error| ControllerError::execution(tool, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;
    use toolform_types::FieldDefinition;

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    fn tool() -> ToolDefinition {
        ToolDefinition::builder("demo")
            .name("Demo")
            .static_field(
                FieldDefinition::new("genome", "Genome"),
                WidgetSpec::Select {
                    options: vec!["hg18".into(), "hg19".into()],
                },
            )
            .static_field(FieldDefinition::new("flag", "Flag"), WidgetSpec::Checkbox { default: false })
            .static_field(FieldDefinition::new("secret", "Secret"), WidgetSpec::SecretInput)
            .demo_selections(vec!["hg19".into(), "True".into(), "pw".into()])
            .redirect(|choices: &ChoiceTuple| choices.str("genome").map(|genome| format!("https://example.org/{}", genome)))
            .build()
    }

    fn evaluate<'a>(tool: &'a ToolDefinition, pairs: &[(&str, &str)]) -> ToolController<'a> {
        ToolController::new(
            tool,
            ToolRequest::from_params(params(pairs)),
            &Collaborators::default(),
            ControllerOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn exposes_choices_batch_line_and_masked_secret() {
        let tool = tool();
        let controller = evaluate(&tool, &[("genome", "hg19"), ("flag", "True"), ("secret", "pw")]);
        assert_eq!(controller.choices().str("genome"), Some("hg19"));
        assert_eq!(controller.choices().get("flag"), Some(&json!(true)));
        assert_eq!(controller.batch_line().as_deref(), Some("$Tool[demo]('hg19'|True|'pw')"));
        assert_eq!(controller.field("secret").map(|field| field.display_value.as_str()), Some("********"));
        assert!(controller.is_valid());
    }

    #[test]
    fn demo_url_lists_every_field() {
        let tool = tool();
        let controller = evaluate(&tool, &[]);
        assert_eq!(
            controller.demo_url().as_deref(),
            Some("?mako=generictool&tool_id=demo&genome=hg19&flag=True&secret=pw")
        );
    }

    #[test]
    fn redirect_requires_start_param() {
        let tool = tool();
        let idle = evaluate(&tool, &[("genome", "hg18")]);
        assert_eq!(idle.redirect_url().as_deref(), Some("https://example.org/hg18"));
        assert!(!idle.do_redirect());

        let started = evaluate(&tool, &[("genome", "hg18"), ("start", "1")]);
        assert!(started.do_redirect());
    }

    #[test]
    fn execution_choices_follow_submission_rules() {
        let tool = ToolDefinition::builder("collect")
            .static_field(
                FieldDefinition::new("multi", "Multi"),
                WidgetSpec::Multiselect {
                    choices: [("a".to_string(), true), ("b".to_string(), false)].into_iter().collect(),
                },
            )
            .static_field(FieldDefinition::new("flag", "Flag"), WidgetSpec::Checkbox { default: true })
            .static_field(FieldDefinition::new("text", "Text"), WidgetSpec::Text { default: "x".into() })
            .build();
        let controller = evaluate(&tool, &[]);
        let submitted = SubmittedParams::new(params(&[("multi|b", "on"), ("flag", "False")]));
        let choices = controller.collect_execution_choices(&submitted);
        assert_eq!(choices.get("multi"), Some(&json!({"a": false, "b": "on"})));
        assert_eq!(choices.get("flag"), Some(&json!(false)));
        assert_eq!(choices.get("text"), Some(&json!("")));
    }

    #[test]
    fn execute_is_refused_when_invalid_or_missing() {
        let tool = ToolDefinition::builder("guarded")
            .static_field(FieldDefinition::new("name", "Name"), WidgetSpec::Text { default: String::new() })
            .validator(|choices: &ChoiceTuple| {
                choices
                    .str("name")
                    .filter(|name| name.is_empty())
                    .map(|_| "Name is required".to_string())
            })
            .executor(|choices: &ChoiceTuple, context: &ExecutionContext| {
                Ok(Some(format!("{} by {}", choices.str("name").unwrap_or_default(), context.username)))
            })
            .build();

        let invalid = evaluate(&tool, &[]);
        let error = invalid.execute(&ExecutionContext::default()).unwrap_err();
        assert!(matches!(error, ControllerError::Invalid { ref message, .. } if message == "Name is required"));

        let valid = evaluate(&tool, &[("name", "run")]);
        let context = ExecutionContext {
            username: "ana".into(),
            ..ExecutionContext::default()
        };
        assert_eq!(valid.execute(&context).unwrap().as_deref(), Some("run by ana"));

        let silent = ToolDefinition::builder("silent").build();
        let error = evaluate(&silent, &[]).execute(&ExecutionContext::default()).unwrap_err();
        assert!(matches!(error, ControllerError::NotExecutable { .. }));
    }
}
