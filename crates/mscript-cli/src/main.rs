use std::io::BufWriter;
use std::sync::Once;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mscript_ast::ast::{Program, Stmt};
use mscript_ast::markup::Node;
use mscript_ast::span::Span;
use mscript_cli::eval::{Env, Interpreter, RuntimeError};
use mscript_cli::host::{HostRegistry, TraceEmitter};
use mscript_cli::mission::Mission;
use mscript_cli::value::Value;
use mscript_link::{link_mission, run_link, LinkError};
use mscript_parse::{line_col, parse_str};

/// Maximum source file size in bytes (1MB)
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "mscript")]
#[command(about = "Mission script interpreter: link and run markup mission scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Link and run a mission (or a bare statement)
    Run {
        /// Path to mission source file
        file: String,

        /// Number of gameloop ticks to run
        #[arg(long, default_value_t = 1)]
        ticks: u64,

        /// Write host call trace to file (large values hashed)
        #[arg(long)]
        trace: Option<String>,

        /// Write host call trace with all values recorded
        #[arg(long, conflicts_with = "trace")]
        trace_full: Option<String>,
    },

    /// Run the link pass and report structural errors
    Check {
        /// Path to mission source file
        file: String,
    },

    /// Parse a source file and dump the markup tree
    Parse {
        /// Path to mission source file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber when `RUST_LOG` is set.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            ticks,
            trace,
            trace_full,
        } => cmd_run(&file, ticks, trace, trace_full),
        Commands::Check { file } => cmd_check(&file),
        Commands::Parse { file, format } => cmd_parse(&file, format),
    }
}

/// A source file after the link pass.
enum Linked {
    Mission(Program),
    Statement(Stmt),
}

fn read_source(path: &str) -> Result<String> {
    let src = std::fs::read_to_string(path).with_context(|| format!("failed to read `{}`", path))?;
    if src.len() > MAX_SOURCE_SIZE {
        bail!(
            "source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
    }
    Ok(src)
}

fn located(path: &str, src: &str, span: Span, msg: impl std::fmt::Display) -> anyhow::Error {
    let (line, col) = line_col(src, span.start);
    anyhow!("{}:{}:{}: {}", path, line, col, msg)
}

fn link_error(path: &str, src: &str, err: LinkError) -> anyhow::Error {
    located(path, src, err.span(), format!("link error: {}", err))
}

fn runtime_error(path: &str, src: &str, err: RuntimeError) -> anyhow::Error {
    match err.span() {
        Some(span) => located(path, src, span, format!("runtime error: {}", err)),
        None => anyhow!("{}: runtime error: {}", path, err),
    }
}

fn is_mission_root(node: &Node) -> bool {
    matches!(node.tag.as_str(), "mission" | "module")
}

fn load_and_link(path: &str) -> Result<(String, Linked)> {
    let src = read_source(path)?;
    let root = parse_str(path, &src)?;
    let linked = if is_mission_root(&root) {
        link_mission(&root).map(Linked::Mission)
    } else {
        run_link(&root).map(Linked::Statement)
    };
    match linked {
        Ok(linked) => Ok((src, linked)),
        Err(e) => Err(link_error(path, &src, e)),
    }
}

fn open_trace(
    trace: Option<String>,
    trace_full: Option<String>,
    mission: Option<&str>,
) -> Result<Option<(String, TraceEmitter)>> {
    let (path, full) = match (trace, trace_full) {
        (_, Some(path)) => (path, true),
        (Some(path), None) => (path, false),
        (None, None) => return Ok(None),
    };
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create trace file `{}`", path))?;
    let emitter = TraceEmitter::new(Box::new(BufWriter::new(file)), mission, full)?;
    Ok(Some((path, emitter)))
}

fn cmd_run(
    file: &str,
    ticks: u64,
    trace: Option<String>,
    trace_full: Option<String>,
) -> Result<()> {
    let (src, linked) = load_and_link(file)?;
    let host = HostRegistry::with_builtins();

    match linked {
        Linked::Mission(program) => {
            let name = program.name.clone();
            let traced = open_trace(trace, trace_full, name.as_deref())?;
            let (trace_path, tracer) = match traced {
                Some((path, tracer)) => (Some(path), tracer),
                None => (None, TraceEmitter::disabled()),
            };

            let mut mission = Mission::load_traced(program, host, tracer)
                .map_err(|e| runtime_error(file, &src, e))?;
            let outcome = (|| {
                mission.start()?;
                for _ in 0..ticks {
                    mission.tick()?;
                }
                mission.finish()
            })();
            outcome.map_err(|e| runtime_error(file, &src, e))?;

            println!(
                "Mission {} finished after {} tick(s).",
                name.as_deref().unwrap_or("(unnamed)"),
                mission.ticks()
            );
            if let Some(path) = trace_path {
                eprintln!("Trace written to {}", path);
            }
        }
        Linked::Statement(stmt) => {
            let traced = open_trace(trace, trace_full, None)?;
            let (trace_path, mut tracer) = match traced {
                Some((path, tracer)) => (Some(path), tracer),
                None => (None, TraceEmitter::disabled()),
            };

            let mut env = Env::new();
            let result = Interpreter::new(&host, &mut tracer).run(&mut env, &stmt);
            let status = if result.is_ok() { "finished" } else { "failed" };
            tracer.finalize(status)?;
            let value = result.map_err(|e| runtime_error(file, &src, e))?;

            if value != Value::Void {
                println!("result = {}", value);
            }
            if let Some(path) = trace_path {
                eprintln!("Trace written to {}", path);
            }
        }
    }
    Ok(())
}

fn cmd_check(file: &str) -> Result<()> {
    let (_, linked) = load_and_link(file)?;
    match linked {
        Linked::Mission(program) => {
            let scripts: usize = program.modules.iter().map(|m| m.scripts.len()).sum();
            println!(
                "{}: ok ({} module(s), {} script(s))",
                file,
                program.modules.len(),
                scripts
            );
        }
        Linked::Statement(stmt) => println!("{}: ok (<{}> statement)", file, stmt.tag()),
    }
    Ok(())
}

fn cmd_parse(file: &str, format: Format) -> Result<()> {
    let src = read_source(file)?;
    let root = parse_str(file, &src)?;

    match format {
        Format::Pretty => println!("{:#?}", root),
        Format::Json => println!("{}", serde_json::to_string_pretty(&root)?),
    }
    Ok(())
}
