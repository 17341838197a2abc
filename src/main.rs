//! SSR Render CLI
//!
//! Single-shot mode:
//!   ssr-render [OPTIONS] <entry>
//!
//! Server mode (persistent process, reads from stdin):
//!   ssr-render --server [OPTIONS]
//!
//! Protocol (server mode):
//!   Request (stdin):
//!     app
//!     {"context":{"user":"Alice"},"env":{"APP_ENV":"production"}}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:1234
//!
//!     <p>Hello, Alice!</p><script src="/js/app-client.js"></script>
//!
//!   Error response:
//!     Status:Error
//!     Length:42
//!
//!     server script './app-server.js' does not exist

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use serde_json::Value;
use ssr_render::{
    EmbeddedConfig, EmbeddedEngine, Engine, PathResolver, ProcessEngine, RenderConfig, Renderer,
    ScriptLoad, ScriptPosition,
};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Spawn an external interpreter per render
    Node,
    /// Run in an in-process V8 isolate
    Embedded,
}

/// Render a JavaScript app on the server
#[derive(Debug, Parser)]
#[command(name = "ssr-render", version)]
struct Cli {
    /// Entry to render, resolved to <scripts-dir>/<entry>-server.js
    #[arg(required_unless_present = "server")]
    entry: Option<String>,

    /// Persistent mode: read requests from stdin until EOF
    #[arg(long, conflicts_with = "entry")]
    server: bool,

    /// Directory holding the server bundles
    #[arg(long, env = "SSR_SCRIPTS_DIR", default_value = ".")]
    scripts_dir: PathBuf,

    /// Public path the client bundles are served from
    #[arg(long, default_value = "/js")]
    public_path: String,

    #[arg(long, value_enum, default_value_t = EngineKind::Node)]
    engine: EngineKind,

    /// Interpreter binary for the node engine
    #[arg(long, env = "SSR_NODE_BINARY", default_value = "node")]
    node: PathBuf,

    /// Where the node engine writes script files (default: system temp dir)
    #[arg(long, env = "SSR_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Heap limit for the embedded engine, in MiB
    #[arg(long, default_value_t = 64)]
    max_heap_mb: usize,

    /// Context object as JSON
    #[arg(long)]
    context: Option<String>,

    /// Environment value, KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Markup served when rendering is disabled or fails
    #[arg(long, default_value = "")]
    fallback: String,

    /// Report render failures instead of serving the fallback
    #[arg(long)]
    debug: bool,

    /// Skip rendering and serve the fallback
    #[arg(long)]
    disabled: bool,

    /// Omit the client script tag
    #[arg(long)]
    no_script: bool,

    /// before | after
    #[arg(long, default_value = "after")]
    script_position: ScriptPosition,

    /// sync | defer | async
    #[arg(long, default_value = "sync")]
    script_load: ScriptLoad,
}

/// One server-mode request body (line 2)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Request {
    context: BTreeMap<String, Value>,
    env: BTreeMap<String, Value>,
    fallback: Option<String>,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

impl Cli {
    /// Config shared by every render of this invocation
    fn base_config(&self) -> RenderConfig {
        RenderConfig::new()
            .with_fallback(self.fallback.clone())
            .enabled(!self.disabled)
            .debug(self.debug)
            .with_script(!self.no_script)
            .script_position(self.script_position)
            .script_load(self.script_load)
    }

    fn build_engine(&self) -> Result<Box<dyn Engine>> {
        let engine: Box<dyn Engine> = match self.engine {
            EngineKind::Node => {
                let temp_dir = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
                Box::new(ProcessEngine::new(&self.node, temp_dir))
            }
            EngineKind::Embedded => Box::new(EmbeddedEngine::new(&EmbeddedConfig {
                max_heap_size: Some(self.max_heap_mb * 1024 * 1024),
            })?),
        };
        Ok(engine)
    }
}

/// Run in single-shot mode
fn run_single_shot(cli: &Cli, renderer: &Renderer<dyn Engine, PathResolver>, entry: &str) -> Result<()> {
    let context: BTreeMap<String, Value> = match &cli.context {
        Some(json) => serde_json::from_str(json).map_err(|e| anyhow!("Invalid context JSON: {}", e))?,
        None => BTreeMap::new(),
    };

    let config = cli
        .base_config()
        .with_entry(entry)
        .with_context_map(context)
        .with_env_map(cli.env.iter().cloned());

    let html = renderer.render_html(config)?;
    println!("{}", html);

    Ok(())
}

/// Run in server mode (persistent process, reads requests from stdin)
fn run_server(cli: &Cli, renderer: &Renderer<dyn Engine, PathResolver>) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    info!(engine = ?cli.engine, "server ready, reading from stdin");

    loop {
        let mut entry_line = String::new();
        let mut request_line = String::new();

        // Read entry (line 1)
        let bytes_read = reader.read_line(&mut entry_line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }

        // Read request JSON (line 2)
        reader.read_line(&mut request_line)?;

        let entry = entry_line.trim();
        let request_str = request_line.trim();

        let request: Request = if request_str.is_empty() {
            Request::default()
        } else {
            match serde_json::from_str(request_str) {
                Ok(r) => r,
                Err(e) => {
                    write_response(&mut stdout, false, &format!("Invalid request JSON: {}", e))?;
                    continue;
                }
            }
        };

        let mut config = cli
            .base_config()
            .with_entry(entry)
            .with_context_map(request.context)
            .with_env_map(request.env);
        if let Some(fallback) = request.fallback {
            config = config.with_fallback(fallback);
        }

        match renderer.render_html(config) {
            Ok(html) => write_response(&mut stdout, true, &html)?,
            Err(e) => write_response(&mut stdout, false, &e.to_string())?,
        }
    }

    info!("server shutting down");
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{}", status)?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{}", body)?;
    stdout.flush()?;

    Ok(())
}

// Not async: the embedded engine drives its own event loop per render.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let engine = cli.build_engine()?;
    let resolver = PathResolver::new(&cli.scripts_dir, cli.public_path.clone())
        .with_context(|| format!("Cannot use scripts dir '{}'", cli.scripts_dir.display()))?;
    let renderer = Renderer::new(&*engine, &resolver);

    match cli.entry.as_deref() {
        Some(entry) => run_single_shot(&cli, &renderer, entry),
        None => run_server(&cli, &renderer),
    }
}
