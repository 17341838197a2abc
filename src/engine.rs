//! The script execution contract shared by both engines.

use crate::error::EngineError;

/// Executes a composed script and hands back what it reported.
///
/// Implementations differ in how a script talks back to the host: a
/// subprocess writes to stdout, an embedded runtime calls a captured
/// global. [`dispatch_handler`](Engine::dispatch_handler) names that
/// channel as a JS expression so composed scripts work on either engine.
pub trait Engine {
    /// Run `script` to completion and return its captured output.
    fn run(&self, script: &str) -> Result<String, EngineError>;

    /// JS expression that, called with one string, reports it to the host.
    fn dispatch_handler(&self) -> &str;
}
