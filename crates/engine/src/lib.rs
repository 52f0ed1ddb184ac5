//! # Toolform Engine
//!
//! Cascading option resolution for multi-field tool forms. Each field's
//! options depend on the values chosen for the fields before it; the engine
//! evaluates fields in a fixed order, caches resolved options across round
//! trips in a caller-managed token, and recomputes only what an upstream
//! change invalidates.
//!
//! ## Key pieces
//!
//! - **Registry** ([`FieldRegistry`]): field definitions, custom evaluation
//!   order, and reset-on-change fields.
//! - **Cache** ([`OptionCache`]): last values, resolved options, and provider
//!   data, encoded as zlib-compressed JSON in URL-safe base64.
//! - **Resolution** ([`OptionResolver`]): runs the per-field callbacks.
//! - **Coercion** ([`ValueCoercionEngine`]): maps option shapes to widgets and
//!   canonical values, delegating to an [`ExternalResourceProvider`].
//! - **Cascade** ([`CascadeController`]): the ordered scan.
//! - **Validation** ([`ValidationState`]).
//! - **Facade** ([`ToolController`]): one evaluated request.
//!
//! ## Usage
//!
//! ```rust
//! use toolform_engine::{Collaborators, ControllerOptions, ToolController, ToolRequest, parse_tool_manifest_file};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let manifest_path = temp_dir.path().join("demo.yaml");
//! std::fs::write(&manifest_path, r#"
//! tool: demo
//! fields:
//!   - { id: first, options: [a, b] }
//!   - { id: second, depends_on: first, cases: { a: [x, y] }, fallback: [z] }
//! "#)?;
//!
//! let tool = parse_tool_manifest_file(&manifest_path)?;
//! let request = ToolRequest::from_params([("first".to_string(), "a".to_string())].into_iter().collect());
//! let controller = ToolController::new(&tool, request, &Collaborators::default(), ControllerOptions::default())?;
//! assert_eq!(controller.choices().str("second"), Some("x"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod cascade;
pub mod coercion;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod provider;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod tool;
pub mod validator;

pub use cache::{CacheEncodeError, CacheEntry, CachedOptions, OptionCache, ResolvedOptions};
pub use cascade::{CascadeController, CascadeFlags, ScanOutcome, resolve_or_reuse};
pub use coercion::{Coerced, CoercionMode, HtmlTableFormatter, TableFormatter, ValueCoercionEngine};
pub use controller::{Collaborators, ControllerOptions, ToolController};
pub use error::{ControllerError, ManifestError, RegistryError};
pub use manifest::{FieldManifest, ToolManifest, parse_tool_manifest_file};
pub use provider::{ExternalResourceProvider, NullResourceProvider, ResolvedResource, ResourceKind};
pub use registry::FieldRegistry;
pub use request::{SubmittedParams, ToolRequest, grouped_key};
pub use resolver::{ChoiceContext, FieldCallbacks, OptionResolver};
pub use tool::{ToolDefinition, ToolDefinitionBuilder};
pub use validator::ValidationState;
