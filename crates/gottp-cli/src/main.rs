// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! `gottp`: the command-line front end over the request engine and
//! collection model (§6.3). Thin dispatcher — all real work lives in the
//! library crates; this binary parses arguments, wires up I/O, and maps
//! results to process exit codes.

mod commands;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::CodecFormat;
use gottp_auth::AuthContext;
use gottp_collection::Collection;
use gottp_dispatch::DispatchContext;
use gottp_history::Store;
use gottp_runner::{OutputFormat, Selection};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for usage / argument errors (§6.3).
const EXIT_BAD_FLAG: u8 = 2;
/// Exit code for a failed operation (parse error, bind failure, missing
/// request, any-request-failed, etc.).
const EXIT_FAILURE: u8 = 1;

#[derive(Parser, Debug)]
#[command(name = "gottp", version, about = "Terminal API client request engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a selected request, folder, or workflow from a collection.
    Run {
        /// Path to a `.gottp.yaml` collection file.
        collection: PathBuf,
        /// Environment file (defaults to `environments.yaml` beside the collection).
        #[arg(long)]
        env_file: Option<PathBuf>,
        /// Active environment name.
        #[arg(long)]
        env: Option<String>,
        /// Run a single request by name.
        #[arg(long)]
        request: Option<String>,
        /// Run every request under a named folder.
        #[arg(long)]
        folder: Option<String>,
        /// Run an explicit, ordered sequence of request names.
        #[arg(long, value_delimiter = ',')]
        workflow: Option<Vec<String>>,
        /// Output format.
        #[arg(long, default_value = "text")]
        output: String,
        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Skip writing executed requests to the history store.
        #[arg(long)]
        no_history: bool,
    },

    /// Create a new, minimal collection file.
    Init {
        /// Collection display name.
        #[arg(long, default_value = "New Collection")]
        name: String,
        /// Output path for the new collection.
        #[arg(long, default_value = "collection.gottp.yaml")]
        output: PathBuf,
        /// Also write a sibling `environments.yaml` with a `default` environment.
        #[arg(long)]
        with_env: bool,
    },

    /// Validate one or more collection files.
    Validate {
        /// Collection files to validate.
        files: Vec<PathBuf>,
    },

    /// Reformat one or more collection files to canonical YAML.
    Fmt {
        /// Collection files to format.
        files: Vec<PathBuf>,
        /// Write the formatted output back to each file.
        #[arg(short = 'w', long)]
        write: bool,
        /// Report which files need formatting without writing; exit 1 if any do.
        #[arg(long)]
        check: bool,
    },

    /// Import a request/collection from another format.
    Import {
        /// Input file, or `-` for stdin.
        file: String,
        /// Source format (auto-detected when omitted).
        #[arg(long)]
        format: Option<String>,
        /// Write the imported collection here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Export a collection or request to another format.
    Export {
        /// Path to a `.gottp.yaml` collection file.
        collection: PathBuf,
        /// Destination format.
        #[arg(long)]
        format: String,
        /// Request name (required for `curl` and `har`).
        #[arg(long)]
        request: Option<String>,
        /// Write the exported document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Serve a collection's requests as canned mock responses.
    Mock {
        /// Path to a `.gottp.yaml` collection file.
        collection: PathBuf,
        /// Port to bind on `127.0.0.1`.
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Artificial latency in milliseconds before every response.
        #[arg(long)]
        latency: Option<u64>,
        /// Probability in [0,1] of an injected 500 response.
        #[arg(long, default_value_t = 0.0)]
        error_rate: f64,
        /// `Access-Control-Allow-Origin` value.
        #[arg(long, default_value = "*")]
        cors_origin: String,
    },

    /// Print a shell completion script.
    Completion {
        /// Target shell.
        #[arg(value_enum)]
        shell: ShellArg,
    },

    /// Print the JSON Schema for the collection file format (editor tooling).
    Schema,

    /// Print the version.
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
}

impl From<ShellArg> for Shell {
    fn from(value: ShellArg) -> Self {
        match value {
            ShellArg::Bash => Shell::Bash,
            ShellArg::Zsh => Shell::Zsh,
            ShellArg::Fish => Shell::Fish,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("gottp=debug") } else { EnvFilter::new("gottp=info") };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match dispatch(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn dispatch(command: Commands) -> Result<u8> {
    match command {
        Commands::Run { collection, env_file, env, request, folder, workflow, output, timeout, no_history } => {
            cmd_run(collection, env_file, env, request, folder, workflow, output, timeout, no_history).await
        }
        Commands::Init { name, output, with_env } => cmd_init(name, output, with_env),
        Commands::Validate { files } => cmd_validate(files),
        Commands::Fmt { files, write, check } => cmd_fmt(files, write, check),
        Commands::Import { file, format, output } => cmd_import(file, format, output),
        Commands::Export { collection, format, request, output } => cmd_export(collection, format, request, output).await,
        Commands::Mock { collection, port, latency, error_rate, cors_origin } => cmd_mock(collection, port, latency, error_rate, cors_origin).await,
        Commands::Completion { shell } => cmd_completion(shell),
        Commands::Schema => cmd_schema(),
        Commands::Version => {
            println!("gottp {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    collection_path: PathBuf,
    env_file: Option<PathBuf>,
    env_name: Option<String>,
    request: Option<String>,
    folder: Option<String>,
    workflow: Option<Vec<String>>,
    output: String,
    timeout: u64,
    no_history: bool,
) -> Result<u8> {
    let format: OutputFormat = output.parse().map_err(anyhow::Error::msg)?;

    let selection = match (request, folder, workflow) {
        (Some(name), None, None) => Selection::Request(name),
        (None, Some(name), None) => Selection::Folder(name),
        (None, None, Some(names)) => Selection::Workflow(names),
        _ => bail!("exactly one of --request, --folder, or --workflow is required"),
    };

    let collection = gottp_collection::load(&collection_path)?;

    let environment = if let Some(name) = &env_name {
        let env_path = env_file.unwrap_or_else(|| sibling_environments_path(&collection_path));
        let data = std::fs::read(&env_path).with_context(|| format!("read environment file '{}'", env_path.display()))?;
        let envs: gottp_collection::EnvironmentsFile = serde_yaml::from_slice(&data).with_context(|| format!("parse environment file '{}'", env_path.display()))?;
        Some(envs.find(name).cloned().ok_or_else(|| anyhow::anyhow!("no environment named `{name}` in '{}'", env_path.display()))?)
    } else {
        None
    };

    let client = gottp_dispatch::http_driver::client_builder().build().context("build HTTP client")?;
    let mut auth_ctx = AuthContext::default();
    let ctx = DispatchContext { deadline: std::time::Duration::from_secs(timeout), ..DispatchContext::default() };
    let history = if no_history { None } else { Store::open_default().ok() };

    let report = gottp_runner::run(&collection, environment.as_ref(), &selection, &client, &mut auth_ctx, &ctx, history.as_ref()).await?;

    let rendered = report.render(format);
    if format == OutputFormat::Text && std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        println!("{}", colorize_text_report(&rendered));
    } else {
        println!("{rendered}");
    }
    Ok(report.exit_code() as u8)
}

/// Colorize a rendered text report's `PASS`/`FAIL` markers for a terminal.
fn colorize_text_report(rendered: &str) -> String {
    use colored::Colorize;
    rendered
        .lines()
        .map(|line| {
            if let Some(rest) = line.strip_prefix("PASS") {
                format!("{}{rest}", "PASS".green().bold())
            } else if let Some(rest) = line.strip_prefix("FAIL") {
                format!("{}{rest}", "FAIL".red().bold())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sibling_environments_path(collection_path: &std::path::Path) -> PathBuf {
    collection_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new(".")).join("environments.yaml")
}

fn cmd_init(name: String, output: PathBuf, with_env: bool) -> Result<u8> {
    commands::init_collection(&name, &output, with_env)?;
    println!("wrote {}", output.display());
    Ok(0)
}

fn cmd_validate(files: Vec<PathBuf>) -> Result<u8> {
    if files.is_empty() {
        bail!("validate requires at least one file");
    }
    let mut any_invalid = false;
    for file in &files {
        let problems = commands::validate_file(file)?;
        if problems.is_empty() {
            println!("{}: valid", file.display());
        } else {
            any_invalid = true;
            println!("{}: invalid", file.display());
            for problem in problems {
                println!("  - {problem}");
            }
        }
    }
    Ok(if any_invalid { EXIT_FAILURE } else { 0 })
}

fn cmd_fmt(files: Vec<PathBuf>, write: bool, check: bool) -> Result<u8> {
    if files.is_empty() {
        bail!("fmt requires at least one file");
    }
    let mut needs_formatting = false;
    for file in &files {
        let current = std::fs::read_to_string(file).with_context(|| format!("read '{}'", file.display()))?;
        let canonical = commands::canonical_yaml(file)?;
        let differs = current != canonical;

        if check {
            if differs {
                needs_formatting = true;
                println!("{}: needs formatting", file.display());
            }
            continue;
        }

        if write {
            if differs {
                std::fs::write(file, &canonical).with_context(|| format!("write '{}'", file.display()))?;
            }
        } else {
            print!("{canonical}");
        }
    }
    Ok(if check && needs_formatting { EXIT_FAILURE } else { 0 })
}

fn cmd_import(file: String, format: Option<String>, output: Option<PathBuf>) -> Result<u8> {
    let format = format.map(|f| CodecFormat::parse(&f)).transpose()?;
    let bytes = commands::read_input(&file)?;
    let outcome = commands::import_bytes(&bytes, format)?;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    commands::write_collection(&outcome.value, output.as_deref())?;
    Ok(0)
}

async fn cmd_export(collection_path: PathBuf, format: String, request: Option<String>, output: Option<PathBuf>) -> Result<u8> {
    let format = CodecFormat::parse(&format)?;
    let collection = gottp_collection::load(&collection_path)?;

    let bytes: Vec<u8> = match format {
        CodecFormat::Curl => {
            let name = request.ok_or_else(|| anyhow::anyhow!("--request is required for `--format curl`"))?;
            let (_path, req) = find_request(&collection, &name)?;
            commands::export_curl(&req)?.into_bytes()
        }
        CodecFormat::Har => {
            let name = request.ok_or_else(|| anyhow::anyhow!("--request is required for `--format har`"))?;
            export_har(&collection, &name).await?
        }
        CodecFormat::Postman => commands::export_postman(&collection)?,
        CodecFormat::Insomnia => commands::export_insomnia(&collection)?,
        CodecFormat::OpenApi => bail!("OpenAPI export is not supported (§4.6: OpenAPI is import-only)"),
    };

    match output {
        Some(path) => std::fs::write(&path, &bytes).with_context(|| format!("write export to '{}'", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(0)
}

fn find_request(collection: &Collection, name: &str) -> Result<(String, gottp_collection::Request)> {
    gottp_runner::select(collection, &Selection::Request(name.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no request named `{name}`"))
}

async fn export_har(collection: &Collection, name: &str) -> Result<Vec<u8>> {
    let (_path, request) = find_request(collection, name)?;
    let resolved = gottp_dispatch::resolve_request(&request, None, collection);

    let client = gottp_dispatch::http_driver::client_builder().build().context("build HTTP client")?;
    let mut auth_ctx = AuthContext::default();
    let ctx = DispatchContext::default();
    let auth = request.auth.clone().unwrap_or_else(|| collection.auth.clone());
    let response = gottp_dispatch::http_driver::send(&client, resolved.clone(), &auth, ctx.max_redirects, &mut auth_ctx).await?;

    let export_request = gottp_codecs::har::ExportRequest {
        method: &resolved.method,
        url: &resolved.url,
        headers: &resolved.headers,
        body: &resolved.body,
    };
    Ok(gottp_codecs::har::export(&export_request, &response)?)
}

async fn cmd_mock(collection_path: PathBuf, port: u16, latency: Option<u64>, error_rate: f64, cors_origin: String) -> Result<u8> {
    if !(0.0..=1.0).contains(&error_rate) {
        println!("error: --error-rate must be within [0, 1]");
        return Ok(EXIT_BAD_FLAG);
    }

    let collection = gottp_collection::load(&collection_path)?;
    let mut config = gottp_mock::MockConfig::new(port);
    config.latency = latency.map(std::time::Duration::from_millis);
    config.error_rate = error_rate;
    config.cors_allow_origin = cors_origin;

    let cancel = tokio_util::sync::CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    match gottp_mock::serve(collection, config, cancel).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(EXIT_FAILURE)
        }
    }
}

fn cmd_schema() -> Result<u8> {
    let schema = schemars::schema_for!(Collection);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(0)
}

fn cmd_completion(shell: ShellArg) -> Result<u8> {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(Shell::from(shell), &mut cmd, name, &mut std::io::stdout());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_request_selection() {
        let cli = Cli::try_parse_from(["gottp", "run", "demo.gottp.yaml", "--request", "Ping"]).unwrap();
        match cli.command {
            Commands::Run { request, folder, workflow, .. } => {
                assert_eq!(request.as_deref(), Some("Ping"));
                assert!(folder.is_none());
                assert!(workflow.is_none());
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_workflow_as_comma_separated_list() {
        let cli = Cli::try_parse_from(["gottp", "run", "demo.gottp.yaml", "--workflow", "Login,Logout"]).unwrap();
        match cli.command {
            Commands::Run { workflow, .. } => assert_eq!(workflow, Some(vec!["Login".to_string(), "Logout".to_string()])),
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_missing_required_export_format() {
        assert!(Cli::try_parse_from(["gottp", "export", "demo.gottp.yaml"]).is_err());
    }

    #[test]
    fn sibling_environments_path_defaults_next_to_collection() {
        let path = sibling_environments_path(std::path::Path::new("collections/demo.gottp.yaml"));
        assert_eq!(path, PathBuf::from("collections/environments.yaml"));
    }
}
