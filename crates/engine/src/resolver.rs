//! Invokes a tool's per-field resolution callbacks.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use toolform_types::{ChoiceTuple, WidgetSpec};
use tracing::{debug, warn};

use crate::cache::ResolvedOptions;
use crate::error::ControllerError;

/// Resolution callback: prior canonical values plus the tentative value in,
/// raw option shape out.
pub type ResolveFn = dyn Fn(&ChoiceContext<'_>) -> anyhow::Result<WidgetSpec> + Send + Sync;

/// Optional help-text callback evaluated alongside the resolver.
pub type InfoFn = dyn Fn(&ChoiceContext<'_>) -> anyhow::Result<Option<String>> + Send + Sync;

/// Input handed to resolution and info callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceContext<'a> {
    field_id: &'a str,
    prior: &'a ChoiceTuple,
    tentative: &'a Value,
}

impl<'a> ChoiceContext<'a> {
    pub fn new(field_id: &'a str, prior: &'a ChoiceTuple, tentative: &'a Value) -> Self {
        Self {
            field_id,
            prior,
            tentative,
        }
    }

    /// Id of the field being resolved.
    pub fn field_id(&self) -> &str {
        self.field_id
    }

    /// Canonical values decided so far, in evaluation order.
    pub fn prior_values(&self) -> &ChoiceTuple {
        self.prior
    }

    /// Canonical value of an already decided field.
    pub fn prior(&self, id: &str) -> Option<&Value> {
        self.prior.get(id)
    }

    /// String canonical value of an already decided field.
    pub fn prior_str(&self, id: &str) -> Option<&str> {
        self.prior.str(id)
    }

    /// Canonical value at a 0-based position in evaluation order.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.prior.get_index(index)
    }

    /// Raw value submitted for the field being resolved.
    pub fn tentative(&self) -> &Value {
        self.tentative
    }

    pub fn tentative_str(&self) -> Option<&str> {
        self.tentative.as_str()
    }
}

/// Callbacks registered for one field.
#[derive(Clone)]
pub struct FieldCallbacks {
    pub resolve: Arc<ResolveFn>,
    pub info: Option<Arc<InfoFn>>,
}

impl FieldCallbacks {
    pub fn new(resolve: Arc<ResolveFn>) -> Self {
        Self { resolve, info: None }
    }

    pub fn with_info(mut self, info: Arc<InfoFn>) -> Self {
        self.info = Some(info);
        self
    }
}

impl fmt::Debug for FieldCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCallbacks")
            .field("info", &self.info.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolves fields through the explicit field id → callback table.
#[derive(Debug, Clone, Copy)]
pub struct OptionResolver<'a> {
    callbacks: &'a [FieldCallbacks],
}

impl<'a> OptionResolver<'a> {
    /// `callbacks[i]` belongs to the field at definition index `i`.
    pub fn new(callbacks: &'a [FieldCallbacks]) -> Self {
        Self { callbacks }
    }

    /// Runs the resolver of field `index`. A failing resolver is fatal; a
    /// failing info callback is logged and yields no info.
    pub fn resolve(
        &self,
        index: usize,
        field_id: &str,
        prior: &ChoiceTuple,
        tentative: &Value,
    ) -> Result<ResolvedOptions, ControllerError> {
        let Some(callbacks) = self.callbacks.get(index) else {
            return Err(ControllerError::resolution(
                field_id,
                anyhow::anyhow!("no resolver registered at position {}", index + 1),
            ));
        };
        let context = ChoiceContext::new(field_id, prior, tentative);
        let options = (callbacks.resolve)(&context).map_err(|error| ControllerError::resolution(field_id, error))?;

        let info = match &callbacks.info {
            Some(info) => match info(&context) {
                Ok(text) => text,
                Err(error) => {
                    warn!(field = %field_id, error = %error, "info callback failed; continuing without info");
                    None
                }
            },
            None => None,
        };
        debug!(field = %field_id, widget = %options.widget_type(), "resolved field options");
        Ok(ResolvedOptions { options, info })
    }
}
