//! Static description of a tool: its fields, their callbacks, and metadata.

use std::fmt;
use std::sync::Arc;

use toolform_types::{ChoiceTuple, ExecutionContext, FieldDefinition, FieldRef, HistoryOutput, WidgetSpec};

use crate::resolver::{ChoiceContext, FieldCallbacks, ResolveFn};
use crate::validator::ValidateFn;

/// Executor callback; returns optional output markup.
pub type ExecuteFn = dyn Fn(&ChoiceTuple, &ExecutionContext) -> anyhow::Result<Option<String>> + Send + Sync;
/// Extra history outputs declared for the final choices.
pub type ExtraOutputsFn = dyn Fn(&ChoiceTuple) -> Vec<HistoryOutput> + Send + Sync;
/// Redirect target for the final choices; `None` when the tool does not redirect.
pub type RedirectFn = dyn Fn(&ChoiceTuple) -> Option<String> + Send + Sync;

/// A tool built once and shared across requests.
#[derive(Clone)]
pub struct ToolDefinition {
    pub(crate) tool_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) fields: Vec<FieldDefinition>,
    pub(crate) callbacks: Vec<FieldCallbacks>,
    pub(crate) custom_order: Option<Vec<FieldRef>>,
    pub(crate) reset_on_change: Option<Vec<FieldRef>>,
    pub(crate) validator: Option<Arc<ValidateFn>>,
    pub(crate) executor: Option<Arc<ExecuteFn>>,
    pub(crate) extra_outputs: Option<Arc<ExtraOutputsFn>>,
    pub(crate) redirect: Option<Arc<RedirectFn>>,
    pub(crate) demo_selections: Vec<String>,
    pub(crate) full_example_url: Option<String>,
    pub(crate) batch_tool: bool,
    pub(crate) public: bool,
    pub(crate) debug_mode: bool,
    pub(crate) selection_name: Option<String>,
    pub(crate) sub_tools: Vec<ToolDefinition>,
}

impl ToolDefinition {
    pub fn builder(tool_id: impl Into<String>) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder::new(tool_id)
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn custom_order(&self) -> Option<&[FieldRef]> {
        self.custom_order.as_deref()
    }

    pub fn reset_on_change(&self) -> Option<&[FieldRef]> {
        self.reset_on_change.as_deref()
    }

    pub fn is_batch_tool(&self) -> bool {
        self.batch_tool
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn is_redirect_tool(&self) -> bool {
        self.redirect.is_some()
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    pub fn demo_selections(&self) -> &[String] {
        &self.demo_selections
    }

    pub fn full_example_url(&self) -> Option<&str> {
        self.full_example_url.as_deref()
    }

    /// Name shown in the sub-tool selector; defaults to the tool name.
    pub fn selection_name(&self) -> &str {
        self.selection_name.as_deref().unwrap_or(&self.name)
    }

    pub fn sub_tools(&self) -> &[ToolDefinition] {
        &self.sub_tools
    }

    /// Selector entries: this tool first, then each sub-tool.
    pub fn sub_tool_titles(&self) -> Vec<&str> {
        if self.sub_tools.is_empty() {
            return Vec::new();
        }
        std::iter::once(self.selection_name())
            .chain(self.sub_tools.iter().map(ToolDefinition::selection_name))
            .collect()
    }

    /// Definition selected by `name`: this tool or one of its sub-tools.
    pub fn select(&self, name: &str) -> Option<&ToolDefinition> {
        if self.sub_tools.is_empty() {
            return None;
        }
        if self.selection_name() == name {
            return Some(self);
        }
        self.sub_tools.iter().find(|sub_tool| sub_tool.selection_name() == name)
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("tool_id", &self.tool_id)
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("custom_order", &self.custom_order)
            .field("reset_on_change", &self.reset_on_change)
            .field("batch_tool", &self.batch_tool)
            .field("public", &self.public)
            .field("sub_tools", &self.sub_tools)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ToolDefinition`].
pub struct ToolDefinitionBuilder {
    definition: ToolDefinition,
}

impl ToolDefinitionBuilder {
    fn new(tool_id: impl Into<String>) -> Self {
        let tool_id = tool_id.into();
        Self {
            definition: ToolDefinition {
                name: tool_id.clone(),
                tool_id,
                description: None,
                fields: Vec::new(),
                callbacks: Vec::new(),
                custom_order: None,
                reset_on_change: None,
                validator: None,
                executor: None,
                extra_outputs: None,
                redirect: None,
                demo_selections: Vec::new(),
                full_example_url: None,
                batch_tool: true,
                public: false,
                debug_mode: false,
                selection_name: None,
                sub_tools: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    /// Registers a field with its resolver.
    pub fn field<F>(self, field: FieldDefinition, resolve: F) -> Self
    where
        F: Fn(&ChoiceContext<'_>) -> anyhow::Result<WidgetSpec> + Send + Sync + 'static,
    {
        self.field_callbacks(field, FieldCallbacks::new(Arc::new(resolve)))
    }

    /// Registers a field with its resolver and info callback.
    pub fn field_with_info<F, I>(self, field: FieldDefinition, resolve: F, info: I) -> Self
    where
        F: Fn(&ChoiceContext<'_>) -> anyhow::Result<WidgetSpec> + Send + Sync + 'static,
        I: Fn(&ChoiceContext<'_>) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        self.field_callbacks(field, FieldCallbacks::new(Arc::new(resolve)).with_info(Arc::new(info)))
    }

    /// Registers a field with prebuilt callbacks.
    pub fn field_callbacks(mut self, field: FieldDefinition, callbacks: FieldCallbacks) -> Self {
        self.definition.fields.push(field);
        self.definition.callbacks.push(callbacks);
        self
    }

    /// Registers a field whose options never change.
    pub fn static_field(self, field: FieldDefinition, options: WidgetSpec) -> Self {
        let resolve: Arc<ResolveFn> = Arc::new(move |_: &ChoiceContext<'_>| -> anyhow::Result<WidgetSpec> { Ok(options.clone()) });
        self.field_callbacks(field, FieldCallbacks::new(resolve))
    }

    pub fn custom_order(mut self, order: Vec<FieldRef>) -> Self {
        self.definition.custom_order = Some(order);
        self
    }

    pub fn reset_on_change(mut self, fields: Vec<FieldRef>) -> Self {
        self.definition.reset_on_change = Some(fields);
        self
    }

    pub fn validator<F>(self, validate: F) -> Self
    where
        F: Fn(&ChoiceTuple) -> Option<String> + Send + Sync + 'static,
    {
        self.validator_arc(Arc::new(validate))
    }

    pub fn validator_arc(mut self, validate: Arc<ValidateFn>) -> Self {
        self.definition.validator = Some(validate);
        self
    }

    pub fn executor<F>(mut self, execute: F) -> Self
    where
        F: Fn(&ChoiceTuple, &ExecutionContext) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        self.definition.executor = Some(Arc::new(execute));
        self
    }

    pub fn extra_outputs<F>(mut self, outputs: F) -> Self
    where
        F: Fn(&ChoiceTuple) -> Vec<HistoryOutput> + Send + Sync + 'static,
    {
        self.definition.extra_outputs = Some(Arc::new(outputs));
        self
    }

    pub fn redirect<F>(mut self, redirect: F) -> Self
    where
        F: Fn(&ChoiceTuple) -> Option<String> + Send + Sync + 'static,
    {
        self.definition.redirect = Some(Arc::new(redirect));
        self
    }

    /// Demo values, one per field in definition order.
    pub fn demo_selections(mut self, selections: Vec<String>) -> Self {
        self.definition.demo_selections = selections;
        self
    }

    pub fn full_example_url(mut self, url: impl Into<String>) -> Self {
        self.definition.full_example_url = Some(url.into());
        self
    }

    pub fn batch_tool(mut self, batch_tool: bool) -> Self {
        self.definition.batch_tool = batch_tool;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.definition.public = public;
        self
    }

    pub fn debug_mode(mut self, debug_mode: bool) -> Self {
        self.definition.debug_mode = debug_mode;
        self
    }

    pub fn selection_name(mut self, name: impl Into<String>) -> Self {
        self.definition.selection_name = Some(name.into());
        self
    }

    pub fn sub_tool(mut self, sub_tool: ToolDefinition) -> Self {
        self.definition.sub_tools.push(sub_tool);
        self
    }

    pub fn build(self) -> ToolDefinition {
        self.definition
    }
}
