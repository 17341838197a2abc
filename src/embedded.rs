//! Embedded engine - executes scripts inside an in-process V8 isolate.
//!
//! Provides only what a render script needs:
//! - `print` (the dispatch channel, captured as the result)
//! - console.log/info/debug/warn/error (captured, re-emitted as tracing events)
//! - atob, btoa
//! - crypto.randomUUID, crypto.getRandomValues, crypto.subtle.digest
//! - No fs, net, env, or other system access

use crate::engine::Engine;
use crate::error::EngineError;
use crate::ops::{ssr_runtime, ConsoleOutput, OutputBuffer};
use deno_core::{JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dispatch handler for the embedded runtime.
pub const EMBEDDED_DISPATCH_HANDLER: &str = "print";

const CONSOLE_TARGET: &str = "ssr_render::console";

/// Configuration for the embedded runtime
#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024),
        }
    }
}

/// An [`Engine`] running scripts in one long-lived `JsRuntime`.
///
/// The isolate is single-threaded: an `EmbeddedEngine` is neither `Send`
/// nor `Sync`, so concurrent renders need one engine per thread. `run` must
/// not be called from inside an async runtime, since it drives the event
/// loop itself.
pub struct EmbeddedEngine {
    runtime: RefCell<JsRuntime>,
    event_loop: tokio::runtime::Runtime,
    heap_limit: Option<usize>,
    heap_exhausted: Arc<AtomicBool>,
    /// Limit V8 started with, as reported to the near-heap-limit callback
    initial_heap_limit: Arc<AtomicUsize>,
}

impl EmbeddedEngine {
    pub fn new(config: &EmbeddedConfig) -> Result<Self, EngineError> {
        let event_loop = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Startup)?;

        let create_params = config.max_heap_size.map(|max_bytes| {
            deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes)
        });

        let mut runtime = {
            let _guard = event_loop.enter();
            JsRuntime::new(RuntimeOptions {
                extensions: vec![ssr_runtime::init_ops_and_esm()],
                create_params,
                ..Default::default()
            })
        };

        runtime.op_state().borrow_mut().put(ConsoleOutput::default());

        let engine = Self {
            runtime: RefCell::new(runtime),
            event_loop,
            heap_limit: config.max_heap_size,
            heap_exhausted: Arc::new(AtomicBool::new(false)),
            initial_heap_limit: Arc::new(AtomicUsize::new(0)),
        };
        if engine.heap_limit.is_some() {
            engine.watch_heap(&mut engine.runtime.borrow_mut());
        }

        Ok(engine)
    }

    fn watch_heap(&self, runtime: &mut JsRuntime) {
        let isolate = runtime.v8_isolate().thread_safe_handle();
        let exhausted = Arc::clone(&self.heap_exhausted);
        let initial_limit = Arc::clone(&self.initial_heap_limit);

        runtime.add_near_heap_limit_callback(move |current, initial| {
            warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "near heap limit, terminating script"
            );
            exhausted.store(true, Ordering::SeqCst);
            initial_limit.store(initial, Ordering::SeqCst);
            isolate.terminate_execution();
            // Headroom for the termination to unwind instead of aborting.
            // Taken back in `recover_from_heap_limit`.
            current * 2
        });
    }

    /// Make the isolate usable again after a heap-limit termination: clear
    /// the pending termination and shrink the heap back to its initial limit.
    fn recover_from_heap_limit(&self, runtime: &mut JsRuntime) {
        runtime
            .v8_isolate()
            .thread_safe_handle()
            .cancel_terminate_execution();

        let initial = self.initial_heap_limit.load(Ordering::SeqCst);
        runtime.remove_near_heap_limit_callback(initial);
        self.watch_heap(runtime);
    }

    fn execute(&self, runtime: &mut JsRuntime, script: &str) -> Result<(), EngineError> {
        // One function scope per run, so top-level declarations don't
        // survive into the next render on this isolate.
        let wrapped = format!("(function () {{\n{}\n}}).call(globalThis);", script);

        let outcome = match runtime.execute_script("<ssr>", wrapped) {
            Ok(_) => self
                .event_loop
                .block_on(runtime.run_event_loop(PollEventLoopOptions::default())),
            Err(e) => Err(e),
        };

        outcome.map_err(|err| {
            if self.heap_exhausted.swap(false, Ordering::SeqCst) {
                self.recover_from_heap_limit(runtime);
                EngineError::HeapLimit {
                    limit: self.heap_limit.unwrap_or_default(),
                }
            } else {
                EngineError::Script(err.into())
            }
        })
    }
}

impl Engine for EmbeddedEngine {
    fn run(&self, script: &str) -> Result<String, EngineError> {
        let mut runtime = self.runtime.borrow_mut();

        debug!(bytes = script.len(), "executing script in embedded runtime");

        runtime.op_state().borrow_mut().put(OutputBuffer::default());
        let result = self.execute(&mut runtime, script);

        // Capture ends on every path; nothing carries over to the next run
        let output = runtime
            .op_state()
            .borrow_mut()
            .try_take::<OutputBuffer>()
            .unwrap_or_default();
        let console = runtime
            .op_state()
            .borrow_mut()
            .try_take::<ConsoleOutput>()
            .unwrap_or_default();
        runtime.op_state().borrow_mut().put(ConsoleOutput::default());

        log_console(&console);

        result.map(|()| output.0)
    }

    fn dispatch_handler(&self) -> &str {
        EMBEDDED_DISPATCH_HANDLER
    }
}

fn log_console(console: &ConsoleOutput) {
    for line in &console.logs {
        info!(target: CONSOLE_TARGET, "{}", line);
    }
    for line in &console.warns {
        warn!(target: CONSOLE_TARGET, "{}", line);
    }
    for line in &console.errors {
        error!(target: CONSOLE_TARGET, "{}", line);
    }
}
