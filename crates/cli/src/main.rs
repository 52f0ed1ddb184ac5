use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use serde_json::json;
use toolform_engine::request::{CACHE_TOKEN_PARAM, OLD_VALUES_PARAM, SUB_TOOL_PARAM};
use toolform_engine::{Collaborators, ControllerOptions, ToolController, ToolRequest, parse_tool_manifest_file};
use toolform_util::{ToolformConfig, default_config_path, manifest_path_for};
use tracing::{Level, debug};

fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = ToolformConfig::load_from(&config_path).with_context(|| format!("reading config {}", config_path.display()))?;
    debug!(path = %config_path.display(), "loaded configuration");

    match matches.subcommand() {
        Some(("render", sub)) => run_render(&config, sub),
        Some(("validate-manifest", sub)) => run_validate(&config, sub),
        _ => bail!("expected a subcommand; see --help"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let manifest = Arg::new("manifest")
        .required(true)
        .help("Manifest file, or a tool id looked up in the configured tools directory");
    Command::new("toolform")
        .about("Evaluate cascading tool forms")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .action(ArgAction::Set)
                .help("Path to the JSON config file"),
        )
        .subcommand(
            Command::new("render")
                .about("Evaluate one request and print the resulting form as JSON")
                .arg(manifest.clone())
                .arg(
                    Arg::new("param")
                        .long("param")
                        .short('p')
                        .action(ArgAction::Append)
                        .help("Submitted form value as key=value; repeatable"),
                )
                .arg(Arg::new("cache").long("cache").action(ArgAction::Set).help("Cache token from a previous render"))
                .arg(
                    Arg::new("old-values")
                        .long("old-values")
                        .action(ArgAction::Set)
                        .help("Encoded old values from a previous render"),
                )
                .arg(Arg::new("sub-tool").long("sub-tool").action(ArgAction::Set).help("Sub-tool selection name")),
        )
        .subcommand(
            Command::new("validate-manifest")
                .about("Check a manifest's field references")
                .arg(manifest),
        )
}

fn resolve_manifest(config: &ToolformConfig, argument: &str) -> PathBuf {
    let direct = Path::new(argument);
    if direct.exists() {
        return direct.to_path_buf();
    }
    match &config.tools_dir {
        Some(tools_dir) => manifest_path_for(tools_dir, argument),
        None => direct.to_path_buf(),
    }
}

fn parse_params(matches: &ArgMatches) -> Result<IndexMap<String, String>> {
    let mut params = IndexMap::new();
    for pair in matches.get_many::<String>("param").into_iter().flatten() {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid --param '{}': expected key=value", pair))?;
        params.insert(key.to_string(), value.to_string());
    }
    let reserved = [
        ("cache", CACHE_TOKEN_PARAM),
        ("old-values", OLD_VALUES_PARAM),
        ("sub-tool", SUB_TOOL_PARAM),
    ];
    for (flag, key) in reserved {
        if let Some(value) = matches.get_one::<String>(flag) {
            params.insert(key.to_string(), value.clone());
        }
    }
    Ok(params)
}

fn run_render(config: &ToolformConfig, matches: &ArgMatches) -> Result<()> {
    let argument = matches.get_one::<String>("manifest").context("missing manifest")?;
    let tool = parse_tool_manifest_file(resolve_manifest(config, argument))?;
    let request = ToolRequest::from_params(parse_params(matches)?);
    let controller = ToolController::new(&tool, request, &Collaborators::default(), ControllerOptions::from(config))?;

    let out = json!({
        "tool": controller.tool().tool_id(),
        "sub_tools": controller.sub_tool_titles(),
        "fields": controller.fields(),
        "choices": controller.choices(),
        "valid": controller.is_valid(),
        "error": controller.error_message(),
        "recomputed": controller.recomputed_fields(),
        "cache_token": controller.cache_token()?,
        "old_values": controller.old_values_param(),
        "batch_line": controller.batch_line(),
        "demo_url": controller.demo_url(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_validate(config: &ToolformConfig, matches: &ArgMatches) -> Result<()> {
    let argument = matches.get_one::<String>("manifest").context("missing manifest")?;
    let path = resolve_manifest(config, argument);
    let tool = parse_tool_manifest_file(&path)?;
    println!(
        "{}: tool '{}' with {} fields and {} sub-tools",
        path.display(),
        tool.tool_id(),
        tool.fields().len(),
        tool.sub_tools().len()
    );
    Ok(())
}
