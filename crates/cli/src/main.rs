//! prompt-canvas CLI - drive a workspace from scripts and inspect generated
//! programs.

mod logger;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codegen::{ChatRequest, ReplayClient};
use log::LevelFilter;
use sandbox::NullBackend;
use script::{ResponseParser, ResponseProtocol};
use serde::Deserialize;
use std::cell::RefCell;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use workspace::{execute_command, execute_query, Command, Query, Workspace, WorkspaceConfig};

/// Prompt canvas - regions that draw what you ask for
#[derive(Parser)]
#[command(name = "prompt-canvas")]
#[command(about = "Drive a prompt canvas workspace from the command line")]
struct Cli {
    /// Workspace config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to the run's log file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a script of commands and queries, one JSON object per line
    Run {
        /// Script file (.jsonl)
        script: PathBuf,

        /// JSON object mapping prompts to recorded generator responses
        #[arg(short, long)]
        responses: Option<PathBuf>,

        /// Animation frames to run after the script finishes
        #[arg(short, long, default_value_t = 0)]
        frames: u32,

        /// Seed for random() in programs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check a raw generator response and print the program it contains
    Validate {
        /// Response file, or - for stdin
        file: PathBuf,

        /// Response protocol: delimited, bare or auto
        #[arg(short, long)]
        protocol: Option<String>,
    },

    /// Print the chat-completion request that would be sent for a prompt
    Request {
        prompt: String,
    },
}

/// A script line is either a command or a query.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptLine {
    Command(Command),
    Query(Query),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = logger::CanvasLogger::init(level) {
        eprintln!("logging disabled: {:#}", e);
    }

    let config = match &cli.config {
        Some(path) => WorkspaceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WorkspaceConfig::default(),
    };

    match cli.command {
        Commands::Run {
            script,
            responses,
            frames,
            seed,
        } => run_script(config, &script, responses.as_deref(), frames, seed),
        Commands::Validate { file, protocol } => validate(&config, &file, protocol.as_deref()),
        Commands::Request { prompt } => print_request(&config, &prompt),
    }
}

fn run_script(
    mut config: WorkspaceConfig,
    script: &Path,
    responses: Option<&Path>,
    frames: u32,
    seed: Option<u64>,
) -> Result<()> {
    logger::log_section("run");
    if seed.is_some() {
        config.seed = seed;
    }

    let client = match responses {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read responses {}", path.display()))?;
            ReplayClient::from_json(&json)
                .with_context(|| format!("Invalid responses file {}", path.display()))?
        }
        None => ReplayClient::new(),
    };
    log::info!("replaying {} with {} recorded responses", script.display(), client.len());

    let text = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;
    let workspace = RefCell::new(Workspace::new(config, Rc::new(client), Box::new(NullBackend)));

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ScriptLine = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: not a command or query", script.display(), number + 1))?;

        let output = match parsed {
            ScriptLine::Command(command) => {
                let result = smol::block_on(execute_command(&workspace, command));
                if !result.is_success() {
                    log::warn!("line {}: {:?}", number + 1, result);
                }
                serde_json::to_string(&result)?
            }
            ScriptLine::Query(query) => {
                serde_json::to_string(&execute_query(&workspace.borrow(), query))?
            }
        };
        println!("{}", output);
    }

    if frames > 0 {
        logger::log_section("frames");
        let result = smol::block_on(execute_command(
            &workspace,
            Command::AdvanceFrames {
                count: frames,
                dt_ms: 16.0,
            },
        ));
        println!("{}", serde_json::to_string(&result)?);
    }

    let regions = execute_query(&workspace.borrow(), Query::ListRegions);
    println!("{}", serde_json::to_string(&regions)?);
    Ok(())
}

fn validate(config: &WorkspaceConfig, file: &Path, protocol: Option<&str>) -> Result<()> {
    let protocol = match protocol {
        Some(name) => serde_json::from_value::<ResponseProtocol>(serde_json::Value::from(name))
            .with_context(|| format!("Unknown protocol {:?}", name))?,
        None => config.protocol,
    };

    let response = if file == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read response {}", file.display()))?
    };

    let program = ResponseParser::new(protocol)
        .parse(&response)
        .context("Response rejected")?;

    println!("{}", program.source());
    if let Some(explanation) = program.explanation() {
        eprintln!("{}", explanation);
    }
    log::info!(
        "valid program: {} setup instructions, animated: {}",
        program.setup().len(),
        program.is_animated()
    );
    Ok(())
}

fn print_request(config: &WorkspaceConfig, prompt: &str) -> Result<()> {
    let request = ChatRequest::for_prompt(&config.codegen, prompt);
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
