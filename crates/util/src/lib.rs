pub mod config;
pub mod path_processing;
pub mod query;

pub use config::{CONFIG_PATH_ENV, ConfigError, ToolformConfig, default_config_path};
pub use path_processing::{expand_tilde, manifest_path_for};
pub use query::{append_query_pairs, decode_component, encode_component};
