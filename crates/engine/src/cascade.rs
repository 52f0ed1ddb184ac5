//! Ordered scan over a tool's fields.
//!
//! Two flags are folded left to right over the evaluation order:
//!
//! - `changed` decides cache use. Once a field recomputes, every later field
//!   recomputes too. On a cache hit the flag is recomputed from that field's
//!   own submitted value against its last cached value.
//! - `reset_all` suppresses submitted values. It is raised when a
//!   reset-on-change field's canonical value differs from the value recorded
//!   on the previous round trip, and affects only fields not yet processed.

use serde_json::{Map as JsonMap, Value};
use toolform_types::{ChoiceTuple, FieldState, WidgetSpec, WidgetType, display_string};
use tracing::{debug, warn};

use crate::cache::{CachedOptions, OptionCache, ResolvedOptions};
use crate::coercion::ValueCoercionEngine;
use crate::error::ControllerError;
use crate::registry::FieldRegistry;
use crate::request::ToolRequest;
use crate::resolver::OptionResolver;

/// Display string shown for a non-empty secret value.
pub const MASKED_SECRET: &str = "********";

/// Accumulators threaded through the scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeFlags {
    /// Cache invalidation: later fields must recompute.
    pub changed: bool,
    /// Value suppression: later fields ignore submitted values.
    pub reset_all: bool,
}

impl CascadeFlags {
    /// Flags at the start of a scan; `changed` starts equal to `reset_all`.
    pub fn initial(reset_all: bool) -> Self {
        Self {
            changed: reset_all,
            reset_all,
        }
    }
}

/// Options for one field, from the cache or freshly resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Reuse {
    pub resolved: ResolvedOptions,
    /// Value of `changed` after this field.
    pub changed: bool,
    /// The resolver ran for this field.
    pub recomputed: bool,
}

/// Resolve-or-reuse decision for one field.
///
/// Recomputes when `changed` is set, when the cache has no entry for the
/// field, or when the cached entry cannot be decoded; `changed` then becomes
/// `true`. Otherwise the cached options are reused and `changed` becomes
/// `val != last_value`.
pub fn resolve_or_reuse<F>(
    changed: bool,
    cache: &OptionCache,
    field_id: &str,
    val: &Value,
    resolve: F,
) -> Result<Reuse, ControllerError>
where
    F: FnOnce() -> Result<ResolvedOptions, ControllerError>,
{
    if !changed {
        match cache.cached_options(field_id) {
            CachedOptions::Hit { resolved, last_value } => {
                let changed = *val != last_value;
                debug!(field = %field_id, cache_hit = true, changed, "reusing cached options");
                return Ok(Reuse {
                    resolved,
                    changed,
                    recomputed: false,
                });
            }
            CachedOptions::Corrupt(error) => {
                warn!(field = %field_id, error = %error, "cached options are corrupt; recomputing");
            }
            CachedOptions::Missing => {
                debug!(field = %field_id, cache_hit = false, "no cached options");
            }
        }
    }
    Ok(Reuse {
        resolved: resolve()?,
        changed: true,
        recomputed: true,
    })
}

/// Result of a complete scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Field states in definition order.
    pub fields: Vec<FieldState>,
    /// Canonical values in definition order; display-only fields are null.
    pub choices: ChoiceTuple,
    pub flags: CascadeFlags,
    /// Ids whose resolver ran, in evaluation order.
    pub recomputed: Vec<String>,
    /// Resolved option shapes in definition order.
    pub specs: Vec<WidgetSpec>,
}

/// Drives the ordered scan for one request.
#[derive(Debug, Clone, Copy)]
pub struct CascadeController<'a> {
    registry: &'a FieldRegistry,
    resolver: OptionResolver<'a>,
    coercion: ValueCoercionEngine<'a>,
    request: &'a ToolRequest,
}

struct Step {
    state: FieldState,
    spec: WidgetSpec,
    recomputed: bool,
}

impl<'a> CascadeController<'a> {
    pub fn new(
        registry: &'a FieldRegistry,
        resolver: OptionResolver<'a>,
        coercion: ValueCoercionEngine<'a>,
        request: &'a ToolRequest,
    ) -> Self {
        Self {
            registry,
            resolver,
            coercion,
            request,
        }
    }

    /// Runs the scan. `cache` and `old_values` are updated in place; an
    /// unrecovered resolver error aborts the whole scan.
    pub fn scan(
        &self,
        reset_all: bool,
        cache: &mut OptionCache,
        old_values: &mut JsonMap<String, Value>,
    ) -> Result<ScanOutcome, ControllerError> {
        let mut flags = CascadeFlags::initial(reset_all);
        let mut prior = ChoiceTuple::new();
        let mut steps: Vec<Option<Step>> = (0..self.registry.len()).map(|_| None).collect();
        let mut recomputed = Vec::new();

        for &index in self.registry.order() {
            let (next, step) = self.step(flags, index, &prior, cache, old_values)?;
            flags = next;
            let choice = if step.state.display_only {
                Value::Null
            } else {
                step.state.value.clone()
            };
            prior.push(step.state.id.clone(), choice);
            if step.recomputed {
                recomputed.push(step.state.id.clone());
            }
            steps[index] = Some(step);
        }

        let mut fields = Vec::with_capacity(steps.len());
        let mut specs = Vec::with_capacity(steps.len());
        let mut choices = ChoiceTuple::new();
        for step in steps.into_iter().flatten() {
            let choice = if step.state.display_only {
                Value::Null
            } else {
                step.state.value.clone()
            };
            choices.push(step.state.id.clone(), choice);
            fields.push(step.state);
            specs.push(step.spec);
        }

        Ok(ScanOutcome {
            fields,
            choices,
            flags,
            recomputed,
            specs,
        })
    }

    fn step(
        &self,
        flags: CascadeFlags,
        index: usize,
        prior: &ChoiceTuple,
        cache: &mut OptionCache,
        old_values: &mut JsonMap<String, Value>,
    ) -> Result<(CascadeFlags, Step), ControllerError> {
        let Some(field) = self.registry.field(index) else {
            return Err(ControllerError::resolution(
                format!("#{}", index + 1),
                anyhow::anyhow!("field position {} is not registered", index + 1),
            ));
        };
        let id = field.id.as_str();
        let val = self.request.candidate_value(id);

        let reuse = resolve_or_reuse(flags.changed, cache, id, &val, || {
            self.resolver.resolve(index, id, prior, &val)
        })?;
        cache.store(id, &val, &reuse.resolved);

        let coerce_val = if flags.reset_all && !self.request.fixed_defaults() {
            Value::Null
        } else {
            val
        };
        let coerced = self.coercion.coerce(id, &reuse.resolved.options, coerce_val, cache);

        let mut reset_all = flags.reset_all;
        if self.registry.is_reset_field(index) {
            let previous = old_values.insert(field.id.clone(), coerced.value.clone());
            let differs = match previous {
                None | Some(Value::Null) => true,
                Some(previous) => previous != coerced.value,
            };
            if differs {
                debug!(field = %id, "reset-on-change field changed; suppressing later values");
                reset_all = true;
            }
        }

        let display_value = display_value(coerced.widget, &coerced.value);
        let state = FieldState {
            id: field.id.clone(),
            name: field.name.clone(),
            widget: coerced.widget,
            options: coerced.options,
            value: coerced.value,
            display_value,
            info: reuse.resolved.info,
            display_only: coerced.display_only,
        };
        let next = CascadeFlags {
            changed: reuse.changed,
            reset_all,
        };
        Ok((
            next,
            Step {
                state,
                spec: reuse.resolved.options,
                recomputed: reuse.recomputed,
            },
        ))
    }
}

fn display_value(widget: WidgetType, value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) if widget == WidgetType::Secret && !text.is_empty() => MASKED_SECRET.to_string(),
        other => display_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select(options: &[&str]) -> ResolvedOptions {
        ResolvedOptions {
            options: WidgetSpec::Select {
                options: options.iter().map(|option| option.to_string()).collect(),
            },
            info: None,
        }
    }

    fn never_called() -> Result<ResolvedOptions, ControllerError> {
        panic!("resolver must not run on a clean cache hit")
    }

    #[test]
    fn cold_cache_recomputes_and_poisons() {
        let reuse = resolve_or_reuse(false, &OptionCache::default(), "first", &json!("a"), || Ok(select(&["a"]))).unwrap();
        assert!(reuse.recomputed);
        assert!(reuse.changed);
    }

    #[test]
    fn hit_recomputes_changed_from_own_value() {
        let mut cache = OptionCache::default();
        cache.store("first", &json!("a"), &select(&["a", "b"]));

        let same = resolve_or_reuse(false, &cache, "first", &json!("a"), never_called).unwrap();
        assert!(!same.recomputed);
        assert!(!same.changed);

        let different = resolve_or_reuse(false, &cache, "first", &json!("b"), never_called).unwrap();
        assert!(!different.recomputed);
        assert!(different.changed);
    }

    #[test]
    fn sticky_changed_bypasses_cache() {
        let mut cache = OptionCache::default();
        cache.store("first", &json!("a"), &select(&["a"]));
        let reuse = resolve_or_reuse(true, &cache, "first", &json!("a"), || Ok(select(&["fresh"]))).unwrap();
        assert!(reuse.recomputed);
        assert_eq!(reuse.resolved, select(&["fresh"]));
    }

    #[test]
    fn corrupt_entry_recomputes() {
        let mut cache = OptionCache::default();
        cache.store("first", &json!("a"), &select(&["a"]));
        let mut entry = cache.into_entry();
        entry.resolved.insert("first".into(), "not json".into());
        let cache = OptionCache::new(entry);

        let reuse = resolve_or_reuse(false, &cache, "first", &json!("a"), || Ok(select(&["a"]))).unwrap();
        assert!(reuse.recomputed);
        assert!(reuse.changed);
    }

    #[test]
    fn resolver_error_propagates() {
        let result = resolve_or_reuse(false, &OptionCache::default(), "first", &Value::Null, || {
            Err(ControllerError::resolution("first", anyhow::anyhow!("boom")))
        });
        assert!(matches!(result, Err(ControllerError::Resolution { .. })));
    }

    #[test]
    fn initial_flags_mirror_reset() {
        assert_eq!(CascadeFlags::initial(true), CascadeFlags { changed: true, reset_all: true });
        assert_eq!(CascadeFlags::initial(false), CascadeFlags::default());
    }

    #[test]
    fn secrets_are_masked_for_display() {
        assert_eq!(display_value(WidgetType::Secret, &json!("hunter2")), MASKED_SECRET);
        assert_eq!(display_value(WidgetType::Secret, &json!("")), "");
        assert_eq!(display_value(WidgetType::Multiselect, &json!({"a": true})), "{\"a\":true}");
        assert_eq!(display_value(WidgetType::Empty, &Value::Null), "");
    }
}
