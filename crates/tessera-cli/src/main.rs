//! Tessera CLI - authorize and run untrusted Lua
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`TESSERA_*`)
//! 3. Project config (`.tessera/config.toml` in the project root)
//! 4. Global config (`~/.tessera/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `TESSERA_DEBUG`: Enable debug mode (`true`/`false`)
//! - `TESSERA_DEPLOYMENT_MODE`: `restricted` or `open`
//! - `TESSERA_EXECUTOR_ENABLED`: Provision the Lua host
//! - `TESSERA_PUBLIC_CODE_EXECUTION`: Let the public tier run code
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | completed successfully / admitted |
//! | 1 | execution failed, or a usage/config error |
//! | 2 | denied, rate limited or concurrency limited |

mod caller;

use anyhow::{Context, Result};
use caller::{CallerArgs, RequestArgs};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tessera_app::{
    normalize, CliOverrides, CodeExecutionService, ConfigLoader, ConfigResolver, DeploymentMode,
    ExecutionOutcome, NormalizeOptions, NormalizeOutcome, ResourceRegistry, TesseraConfig,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Tessera CLI - authorize and run untrusted Lua
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Global config file (defaults to ~/.tessera/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ignore the global config file
    #[arg(long, global = true)]
    no_global_config: bool,

    /// Deployment mode override (`restricted` or `open`)
    #[arg(long, global = true)]
    mode: Option<DeploymentMode>,

    /// Let the public tier run code in restricted deployments
    #[arg(long, global = true)]
    public_code_execution: bool,

    /// Run without an evaluation host
    #[arg(long, global = true)]
    no_executor: bool,

    /// Lua heap limit in bytes (0 disables the limit)
    #[arg(long, global = true, value_name = "BYTES")]
    memory_limit_bytes: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script through the full pipeline and print the outcome as JSON
    Run {
        /// Script path, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Authorize a request without running it and print the decision
    Check {
        /// Script path, or `-` for stdin. Only used for the request body.
        file: Option<PathBuf>,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Strip type annotations and print plain Lua
    Normalize {
        /// Script path, or `-` for stdin
        #[arg(default_value = "-")]
        file: PathBuf,

        /// Skip the final compile check
        #[arg(long)]
        no_compile_check: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective policy table as TOML
    Policy,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides::new()
            .mode_opt(self.mode)
            .memory_limit_bytes_opt(self.memory_limit_bytes);
        if self.debug {
            overrides = overrides.debug(true);
        }
        if self.public_code_execution {
            overrides = overrides.public_code_execution(true);
        }
        if self.no_executor {
            overrides = overrides.executor_enabled(false);
        }
        overrides
    }

    fn load_config(&self) -> Result<TesseraConfig> {
        let project_root = match &self.project {
            Some(p) => p.clone(),
            None => std::env::current_dir().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            }),
        };
        let mut loader = ConfigLoader::new().with_project_root(&project_root);
        if let Some(ref path) = self.config {
            loader = loader.with_global_config(path);
        }
        if self.no_global_config {
            loader = loader.skip_global_config();
        }
        let mut config = loader.load().context("Config error")?;
        self.overrides().apply(&mut config);
        debug!(project = %project_root.display(), mode = %config.deployment.mode, "config resolved");
        Ok(config)
    }
}

/// Terminal filter: --debug > --verbose > RUST_LOG env > default "warn".
///
/// Logs go to stderr so that stdout only carries results.
fn init_tracing(args: &Args) {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read script from stdin")?;
        Ok(source)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn exit_code_for(outcome: &ExecutionOutcome) -> ExitCode {
    match outcome {
        ExecutionOutcome::Completed { result, .. } if result.success => ExitCode::SUCCESS,
        ExecutionOutcome::Completed { .. } => ExitCode::from(1),
        ExecutionOutcome::RateLimited { .. }
        | ExecutionOutcome::Denied { .. }
        | ExecutionOutcome::ConcurrencyLimited { .. } => ExitCode::from(2),
    }
}

async fn run(
    config: &TesseraConfig,
    file: &Path,
    caller: &CallerArgs,
    request: &RequestArgs,
) -> Result<ExitCode> {
    let source = read_source(file)?;
    let service = CodeExecutionService::from_config(config)?;
    let request = request.build(source);
    let ctx = caller.context();
    let registry = ResourceRegistry::in_memory();

    let outcome = service.handle(&request, &ctx, &registry).await;
    info!(status = outcome.status(), "request handled");
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(exit_code_for(&outcome))
}

fn check(
    config: &TesseraConfig,
    file: Option<&Path>,
    caller: &CallerArgs,
    request: &RequestArgs,
) -> Result<ExitCode> {
    let source = match file {
        Some(path) => read_source(path)?,
        None => String::new(),
    };
    let service = CodeExecutionService::from_config(config)?;
    let decision = service.authorize_code_execution(&request.build(source), &caller.context());
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(if decision.admitted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn normalize_file(file: &Path, no_compile_check: bool, json: bool) -> Result<ExitCode> {
    let source = read_source(file)?;
    let options = NormalizeOptions {
        compile_check: !no_compile_check,
        ..NormalizeOptions::default()
    };
    let result = normalize(&source, &options);
    let code = if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    };
    if json {
        let outcome = NormalizeOutcome::from(result);
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match result {
            Ok(normalized) => print!("{}", normalized.code),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(code)
}

fn policy(config: &TesseraConfig) -> Result<ExitCode> {
    let table = config.policy_table()?;
    print!("{}", toml::to_string_pretty(&table)?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(&args);

    let config = args.load_config()?;

    match &args.command {
        Command::Run {
            file,
            caller,
            request,
        } => run(&config, file, caller, request).await,
        Command::Check {
            file,
            caller,
            request,
        } => check(&config, file.as_deref(), caller, request),
        Command::Normalize {
            file,
            no_compile_check,
            json,
        } => normalize_file(file, *no_compile_check, *json),
        Command::Policy => policy(&config),
    }
}
