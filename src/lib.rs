//! # SSR Render
//!
//! Server-side rendering by delegating a JavaScript bundle to a script
//! engine and splicing its output into HTML next to a client bootstrap tag.
//!
//! ## Engines
//!
//! - [`ProcessEngine`]: writes the script to a temp file and runs an
//!   external interpreter (Node by default); stdout is the result
//! - [`EmbeddedEngine`]: runs the script in an in-process V8 isolate via
//!   deno_core; whatever the script `print`s is the result
//!
//! ## Script contract
//!
//! Every application script sees a `context` object, a `process.env`
//! object, and a `dispatch(value)` function it must call once with its
//! result. Dispatched JSON comes back as structured data, anything else as
//! text.
//!
//! ## Failure policy
//!
//! Engine failures become the configured fallback, unless debug mode is on,
//! in which case the original error is returned. Resolution failures are
//! always returned.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ssr_render::{PathResolver, ProcessEngine, RenderConfig, Renderer};
//!
//! let engine = ProcessEngine::new("node", std::env::temp_dir());
//! let resolver = PathResolver::new("./dist/server", "/js").unwrap();
//! let renderer = Renderer::new(&engine, &resolver);
//!
//! let html = renderer.render_html(
//!     RenderConfig::new()
//!         .with_entry("app")
//!         .with_context("user", serde_json::json!({ "name": "Alice" }))
//!         .with_env("NODE_ENV", "production")
//!         .with_fallback("<div id=\"app\"></div>"),
//! ).unwrap();
//!
//! println!("{}", html);
//! ```

mod embedded;
mod engine;
mod error;
mod ops;
mod process;
mod renderer;
mod resolver;
pub mod script;

pub use embedded::{EmbeddedConfig, EmbeddedEngine, EMBEDDED_DISPATCH_HANDLER};
pub use engine::Engine;
pub use error::{EngineError, OptionError, RenderError, ResolveError};
pub use process::{ProcessEngine, NODE_DISPATCH_HANDLER};
pub use renderer::{RenderConfig, RenderOutput, Renderer, ScriptLoad, ScriptPosition};
pub use resolver::{PathResolver, Resolver};
