//! Runs a tool's validation callback over the final choices.

use std::sync::Arc;

use toolform_types::ChoiceTuple;
use tracing::debug;

/// Validation callback: `Some(message)` rejects the choices.
pub type ValidateFn = dyn Fn(&ChoiceTuple) -> Option<String> + Send + Sync;

/// Stored outcome of validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    error_message: Option<String>,
}

impl ValidationState {
    /// Validates `choices` once. Without a callback the choices are valid.
    pub fn run(validator: Option<&ValidateFn>, choices: &ChoiceTuple) -> Self {
        let error_message = validator.and_then(|validate| validate(choices));
        if let Some(message) = &error_message {
            debug!(message = %message, "choices rejected by validator");
        }
        Self { error_message }
    }

    pub fn is_valid(&self) -> bool {
        self.error_message.is_none()
    }

    /// A message is present and non-empty.
    pub fn has_error_message(&self) -> bool {
        self.error_message.as_deref().is_some_and(|message| !message.is_empty())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Validator that requires the listed fields to hold a non-empty value.
pub fn required_fields(fields: Vec<(String, String)>) -> Arc<ValidateFn> {
    Arc::new(move |choices: &ChoiceTuple| {
        fields.iter().find_map(|(id, name)| {
            let missing = match choices.get(id) {
                None | Some(serde_json::Value::Null) => true,
                Some(serde_json::Value::String(text)) => text.trim().is_empty(),
                Some(_) => false,
            };
            missing.then(|| format!("Please fill in '{}'", name))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choices(value: serde_json::Value) -> ChoiceTuple {
        let mut choices = ChoiceTuple::new();
        choices.push("name", value);
        choices
    }

    #[test]
    fn no_validator_means_valid() {
        let state = ValidationState::run(None, &choices(json!(null)));
        assert!(state.is_valid());
        assert!(!state.has_error_message());
    }

    #[test]
    fn required_fields_reports_first_missing_field() {
        let validate = required_fields(vec![("name".into(), "Name".into())]);
        let state = ValidationState::run(Some(validate.as_ref()), &choices(json!("  ")));
        assert!(!state.is_valid());
        assert!(state.has_error_message());
        assert_eq!(state.error_message(), Some("Please fill in 'Name'"));

        assert!(ValidationState::run(Some(validate.as_ref()), &choices(json!("x"))).is_valid());
        assert!(ValidationState::run(Some(validate.as_ref()), &choices(json!(false))).is_valid());
    }

    #[test]
    fn empty_message_is_invalid_without_message() {
        let reject = |_: &ChoiceTuple| Some(String::new());
        let state = ValidationState::run(Some(&reject), &choices(json!("x")));
        assert!(!state.is_valid());
        assert!(!state.has_error_message());
    }
}
