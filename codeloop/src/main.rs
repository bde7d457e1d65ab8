//! codeloop: plan, run, and repair model-generated Python programs.
//!
//! `codeloop run` sends a task to the model, executes the candidate program in a
//! policy-gated sandbox with a hard timeout, and feeds failures back for up to three
//! attempts in total.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use codeloop::core::types::{AgentState, ExecutionResult};
use codeloop::exit_codes;
use codeloop::io::config::{DEFAULT_CONFIG_PATH, LoopConfig, load_config, write_config};
use codeloop::io::credentials::{load_dotenv, resolve_api_key};
use codeloop::io::model::{ChatRequest, ModelClient, OpenRouterClient};
use codeloop::io::sandbox::{PythonSandbox, Sandbox};
use codeloop::logging;
use codeloop::orchestrator::{RunContext, run_task_with};
use codeloop::tasks::{SAMPLE_TASKS, sample_task};

const DOTENV_PATH: &str = ".env";
const PING_PROMPT: &str = "Reply with exactly: MODEL WORKING";

#[derive(Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Plan, run, and repair model-generated Python programs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve a task: plan, execute, and repair for up to three attempts.
    Run {
        /// Natural-language task description.
        task: String,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Run a built-in sample task (see `codeloop tasks`).
    Demo {
        /// Zero-based sample task index.
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Execute a Python file (or `-` for stdin) through the sandbox only.
    Exec {
        file: PathBuf,
        /// Per-execution timeout in seconds.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Print the execution result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the built-in sample tasks.
    Tasks,
    /// Check that the configured model answers.
    Ping {
        /// Model identifier (overrides config and `OPENROUTER_MODEL`).
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Write the effective configuration back to the config path.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Per-execution timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
    /// Model identifier (overrides config and `OPENROUTER_MODEL`).
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Print the final state as JSON instead of per-attempt output.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { task, args } => cmd_run(&task, &args),
        Command::Demo { index, args } => cmd_run(sample_task(index)?, &args),
        Command::Exec {
            file,
            timeout,
            config,
            json,
        } => cmd_exec(&file, timeout, &config, json),
        Command::Tasks => {
            cmd_tasks();
            Ok(exit_codes::OK)
        }
        Command::Ping { model, config } => cmd_ping(model, &config),
        Command::Config { config, write } => cmd_config(&config, write),
    }
}

fn cmd_run(task: &str, args: &RunArgs) -> Result<i32> {
    let cfg = load_effective_config(&args.config, args.model.clone(), args.timeout)?;
    let model = build_model_client(&cfg)?;
    let sandbox = build_sandbox(&cfg)?;
    let ctx = RunContext::new(&model, &sandbox, &cfg);

    let state = run_task_with(task, &ctx, |attempt, program, result| {
        if !args.json {
            print_attempt(attempt, program, result);
        }
    })?;

    if args.json {
        print_json(&state)?;
    } else {
        print_summary(&state);
    }
    Ok(if state.succeeded() {
        exit_codes::OK
    } else {
        exit_codes::UNSOLVED
    })
}

fn cmd_exec(file: &Path, timeout: Option<u64>, config: &Path, json: bool) -> Result<i32> {
    let cfg = load_effective_config(config, None, timeout)?;
    let program = read_program(file)?;
    let sandbox = build_sandbox(&cfg)?;
    let result = sandbox.execute(&program, cfg.exec_timeout())?;

    if json {
        print_json(&result)?;
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }
    Ok(if result.ok {
        exit_codes::OK
    } else {
        exit_codes::UNSOLVED
    })
}

fn cmd_tasks() {
    for (index, task) in SAMPLE_TASKS.iter().enumerate() {
        println!("{index}: {task}");
    }
}

fn cmd_ping(model: Option<String>, config: &Path) -> Result<i32> {
    let cfg = load_effective_config(config, model, None)?;
    let client = build_model_client(&cfg)?;
    let request = ChatRequest {
        system: String::new(),
        user: PING_PROMPT.to_string(),
        model: cfg.model.model.clone(),
        temperature: cfg.model.temperature,
    };
    let reply = client.complete(&request).context("ping model")?;
    println!("{}", reply.trim());
    Ok(exit_codes::OK)
}

fn cmd_config(config: &Path, write: bool) -> Result<i32> {
    let cfg = load_effective_config(config, None, None)?;
    if write {
        write_config(config, &cfg)?;
        println!("wrote {}", config.display());
    } else {
        print!(
            "{}",
            toml::to_string_pretty(&cfg).context("serialize config toml")?
        );
    }
    Ok(exit_codes::OK)
}

/// Layer `.env`, the config file, `OPENROUTER_MODEL`, and CLI flags, in that order.
fn load_effective_config(
    path: &Path,
    model: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<LoopConfig> {
    load_dotenv(Path::new(DOTENV_PATH))?;
    let mut cfg = load_config(path)?;
    cfg.apply_env_overrides();
    apply_cli_overrides(&mut cfg, model, timeout_secs);
    cfg.validate()?;
    Ok(cfg)
}

fn apply_cli_overrides(cfg: &mut LoopConfig, model: Option<String>, timeout_secs: Option<u64>) {
    if let Some(model) = model {
        cfg.model.model = model;
    }
    if let Some(timeout_secs) = timeout_secs {
        cfg.exec_timeout_secs = timeout_secs;
    }
}

fn build_model_client(cfg: &LoopConfig) -> Result<OpenRouterClient> {
    let api_key = resolve_api_key(&cfg.model.api_key_env)?;
    OpenRouterClient::new(&cfg.model, api_key)
}

fn build_sandbox(cfg: &LoopConfig) -> Result<PythonSandbox> {
    let sandbox = PythonSandbox::resolve(&cfg.python, cfg.output_limit_bytes)?;
    Ok(match &cfg.workdir_root {
        Some(root) => sandbox.with_workdir_root(root),
        None => sandbox,
    })
}

fn read_program(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut program = String::new();
        io::stdin()
            .read_to_string(&mut program)
            .context("read program from stdin")?;
        return Ok(program);
    }
    fs::read_to_string(file).with_context(|| format!("read {}", file.display()))
}

fn print_attempt(attempt: u32, program: &str, result: &ExecutionResult) {
    println!("=== ATTEMPT {attempt}: GENERATED CODE ===");
    println!("{program}");
    println!(
        "=== RESULT: {} (exit {}) ===",
        result.outcome().as_str(),
        result.exit_code
    );
    if !result.stdout.is_empty() {
        println!("--- stdout ---");
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        println!("--- stderr ---");
        println!("{}", result.stderr.trim_end());
    }
    println!();
}

fn print_summary(state: &AgentState) {
    let status = if state.succeeded() {
        "solved"
    } else {
        "unsolved"
    };
    println!("{status} after {} attempt(s)", state.attempts);
    if let Some(run) = &state.last_run {
        println!("note: {}", run.note);
    }
}

/// Print `value` as pretty JSON with a trailing newline.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
