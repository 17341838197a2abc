//! Error types for engines, resolvers and the render pipeline.
//!
//! Only [`EngineError`] is eligible for fallback substitution. Everything
//! else describes a usage or configuration problem and always reaches the
//! caller.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Failure while executing a composed script.
///
/// Each variant keeps the original failure so callers in debug mode see
/// the real root cause (exit status, stderr, or the interpreter exception).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to write script file in '{}': {source}", dir.display())]
    TempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("script exited with {status}: {}", stderr.trim_end())]
    Exit {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    #[error("script output is not valid UTF-8")]
    Output(#[source] FromUtf8Error),

    #[error("script threw: {0}")]
    Script(#[source] Box<dyn StdError + Send + Sync + 'static>),

    #[error("script exceeded the heap limit of {limit} bytes")]
    HeapLimit { limit: usize },

    #[error("failed to start embedded runtime: {0}")]
    Startup(#[source] io::Error),
}

impl EngineError {
    /// Exit code of a failed subprocess, if the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EngineError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }

    /// Captured stderr of a failed subprocess.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            EngineError::Exit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Failure to map an entry identifier to a script.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no entry configured")]
    MissingEntry,

    #[error("server script '{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("server script '{}' is not readable: {source}", path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("access denied: '{}' is outside the scripts directory", path.display())]
    OutsideRoot { path: PathBuf },

    #[error("invalid scripts directory '{}': {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Unknown value for a string-configured render option.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {option} '{value}', expected one of: {expected}")]
pub struct OptionError {
    pub option: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Failure surfaced by [`Renderer`](crate::Renderer).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to serialize render values: {0}")]
    Serialize(#[from] serde_json::Error),
}
