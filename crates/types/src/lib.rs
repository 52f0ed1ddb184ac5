//! Shared type definitions for Toolform.
//!
//! The engine, the CLI, and host integrations exchange these types: static
//! field definitions, the raw option shapes produced by tool resolvers, and the
//! per-request field state and choice tuple produced by a scan.

pub mod choices;
pub mod field;
pub mod widget;

pub use choices::{ChoiceTuple, ExecutionContext, FieldState, HistoryOutput, batch_repr};
pub use field::{FieldDefinition, FieldRef};
pub use widget::{WidgetSpec, WidgetType, display_string, truthy};
