//! Process engine - runs each script in a freshly spawned interpreter.
//!
//! The composed script is written to a uniquely named file in the temp
//! directory, the interpreter is started with that path as its only
//! argument, and stdout becomes the result. The file is removed on every
//! exit path when its handle drops.

use crate::engine::Engine;
use crate::error::EngineError;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::debug;

/// Default dispatch handler: Node's stdout print.
pub const NODE_DISPATCH_HANDLER: &str = "console.log";

/// Random bytes appended to the timestamp in each script file name
const NAME_RAND_BYTES: usize = 12;

/// An [`Engine`] backed by an external interpreter binary (Node by default).
///
/// Holds no per-run state, so one instance can be shared across threads.
/// `run` blocks until the subprocess exits; no timeout is applied.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    temp_dir: PathBuf,
    dispatch_handler: String,
}

impl ProcessEngine {
    /// Create an engine running `program` with script files in `temp_dir`.
    pub fn new(program: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            temp_dir: temp_dir.into(),
            dispatch_handler: NODE_DISPATCH_HANDLER.to_string(),
        }
    }

    /// Override the expression scripts use to print their result.
    pub fn with_dispatch_handler(mut self, handler: impl Into<String>) -> Self {
        self.dispatch_handler = handler.into();
        self
    }

    /// Write `script` to a new `.js` file named from a nanosecond timestamp
    /// plus random bytes. `tempfile` opens it with create-new semantics, so a
    /// name clash between concurrent runs retries instead of overwriting.
    fn script_file(&self, script: &str) -> Result<NamedTempFile, EngineError> {
        let temp_err = |source| EngineError::TempFile {
            dir: self.temp_dir.clone(),
            source,
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix(&format!("ssr-{:x}-", nanos))
            .suffix(".js")
            .rand_bytes(NAME_RAND_BYTES)
            .tempfile_in(&self.temp_dir)
            .map_err(temp_err)?;

        file.write_all(script.as_bytes()).map_err(temp_err)?;
        file.flush().map_err(temp_err)?;

        Ok(file)
    }
}

impl Engine for ProcessEngine {
    fn run(&self, script: &str) -> Result<String, EngineError> {
        let file = self.script_file(script)?;

        debug!(
            program = %self.program.display(),
            script = %file.path().display(),
            bytes = script.len(),
            "spawning script process"
        );

        let output = Command::new(&self.program)
            .arg(file.path())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Exit {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(EngineError::Output)?;
        Ok(strip_final_newline(stdout))
    }

    fn dispatch_handler(&self) -> &str {
        &self.dispatch_handler
    }
}

/// Remove exactly one trailing line terminator (`\n` or `\r\n`).
fn strip_final_newline(mut output: String) -> String {
    if output.ends_with('\n') {
        output.pop();
        if output.ends_with('\r') {
            output.pop();
        }
    }
    output
}
