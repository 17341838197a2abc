//! End-to-end renders through a real Node interpreter.
//!
//! Node is looked up via `SSR_NODE_BINARY`, then `node` on PATH. Each test
//! returns early when it isn't available.

use serde_json::json;
use ssr_render::{
    Engine, EngineError, PathResolver, ProcessEngine, RenderConfig, RenderError, RenderOutput,
    Renderer,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

fn node_binary() -> Option<PathBuf> {
    let candidate = std::env::var_os("SSR_NODE_BINARY")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("node"));

    Command::new(&candidate)
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|_| candidate)
}

macro_rules! require_node {
    () => {
        match node_binary() {
            Some(node) => node,
            None => {
                eprintln!("skipping: node is not available");
                return;
            }
        }
    };
}

struct Fixture {
    scripts: TempDir,
    temp: TempDir,
    engine: ProcessEngine,
}

impl Fixture {
    fn new(node: PathBuf) -> Self {
        let scripts = tempdir().unwrap();
        let temp = tempdir().unwrap();
        let engine = ProcessEngine::new(node, temp.path());
        Self {
            scripts,
            temp,
            engine,
        }
    }

    fn script(&self, entry: &str, body: &str) -> &Self {
        fs::write(self.scripts.path().join(format!("{}-server.js", entry)), body).unwrap();
        self
    }

    fn resolver(&self) -> PathResolver {
        PathResolver::new(self.scripts.path(), "/js").unwrap()
    }

    fn temp_is_empty(&self) -> bool {
        is_empty(self.temp.path())
    }
}

fn is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

const FALLBACK: &str = "<div id=\"app\"></div>";

#[test]
fn runs_a_script_and_returns_its_output() {
    let fixture = Fixture::new(require_node!());

    let out = fixture.engine.run("console.log('Hello, world!')").unwrap();

    assert_eq!(out, "Hello, world!");
    assert!(fixture.temp_is_empty());
}

#[test]
fn invalid_script_is_an_engine_error() {
    let fixture = Fixture::new(require_node!());

    let err = fixture.engine.run("foo.bar.baz()").unwrap_err();

    assert!(matches!(err, EngineError::Exit { .. }));
    assert_eq!(err.exit_code(), Some(1));
    assert!(err.stderr().unwrap().contains("ReferenceError"));
    assert!(fixture.temp_is_empty());
}

#[test]
fn renders_an_app_with_client_script() {
    let fixture = Fixture::new(require_node!());
    fixture.script("app", "dispatch('<p>Hello, world!</p>');\n");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let html = renderer
        .render_html(RenderConfig::new().with_entry("app").debug(true))
        .unwrap();

    assert_eq!(html, "<p>Hello, world!</p><script src=\"/js/app-client.js\"></script>");
}

#[test]
fn dispatched_string_comes_back_exactly() {
    let fixture = Fixture::new(require_node!());
    fixture.script("hello", "dispatch('Hello, world!')");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let out = renderer
        .render(RenderConfig::new().with_entry("hello").debug(true))
        .unwrap();

    assert_eq!(out.as_str(), Some("Hello, world!"));
}

#[test]
fn dispatched_object_comes_back_structured() {
    let fixture = Fixture::new(require_node!());
    fixture.script("data", "dispatch({foo: 'bar'})");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let out = renderer
        .render(RenderConfig::new().with_entry("data").debug(true))
        .unwrap();

    assert_eq!(out, RenderOutput::Json(json!({"foo": "bar"})));
}

#[test]
fn renders_with_context_and_env() {
    let fixture = Fixture::new(require_node!());
    fixture
        .script("app-with-context", "dispatch('<p>Hello, ' + context.user.name + '!</p>')")
        .script(
            "app-with-env",
            "dispatch('<p>Hello, world! Rendered in ' + process.env.APP_ENV + '.</p>')",
        );
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let html = renderer
        .render_html(
            RenderConfig::new()
                .with_entry("app-with-context")
                .with_context("user", json!({"name": "Sebastian"}))
                .debug(true),
        )
        .unwrap();
    assert_eq!(
        html,
        "<p>Hello, Sebastian!</p><script src=\"/js/app-with-context-client.js\"></script>"
    );

    let out = renderer
        .render(
            RenderConfig::new()
                .with_entry("app-with-env")
                .with_env_map([("APP_ENV", "production")])
                .debug(true),
        )
        .unwrap();
    assert_eq!(out.as_str(), Some("<p>Hello, world! Rendered in production.</p>"));
}

#[test]
fn failing_script_serves_fallback() {
    let fixture = Fixture::new(require_node!());
    fixture.script("broken", "throw new Error('render exploded')");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let out = renderer
        .render(RenderConfig::new().with_entry("broken").with_fallback(FALLBACK))
        .unwrap();

    assert_eq!(out, RenderOutput::Text(FALLBACK.to_string()));
    assert!(fixture.temp_is_empty());
}

#[test]
fn failing_script_propagates_in_debug() {
    let fixture = Fixture::new(require_node!());
    fixture.script("broken", "throw new Error('render exploded')");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let err = renderer
        .render(
            RenderConfig::new()
                .with_entry("broken")
                .with_fallback(FALLBACK)
                .debug(true),
        )
        .unwrap_err();

    match err {
        RenderError::Engine(err) => {
            assert_eq!(err.exit_code(), Some(1));
            assert!(err.stderr().unwrap().contains("render exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn concurrent_renders_do_not_cross_talk() {
    let fixture = Fixture::new(require_node!());
    for i in 0..8 {
        fixture.script(&format!("page-{i}"), &format!("dispatch('render-{i}')"));
    }
    let resolver = fixture.resolver();

    std::thread::scope(|scope| {
        for i in 0..8 {
            let engine = &fixture.engine;
            let resolver = &resolver;
            scope.spawn(move || {
                let renderer = Renderer::new(engine, resolver);
                let out = renderer
                    .render(RenderConfig::new().with_entry(format!("page-{i}")).debug(true))
                    .unwrap();
                assert_eq!(out.as_str(), Some(format!("render-{i}").as_str()));
            });
        }
    });

    assert!(fixture.temp_is_empty());
}

#[test]
fn reserved_looking_context_keys_round_trip() {
    let fixture = Fixture::new(require_node!());
    fixture.script(
        "keys",
        "dispatch({context: context, clean: Object.getPrototypeOf(context) === Object.prototype})",
    );
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let context = json!({
        "product": {"constructor": "Acme Corp"},
        "docs": {"prototype": "v2 design"},
        "__proto__": {"admin": true}
    });
    let out = renderer
        .render(
            RenderConfig::new()
                .with_entry("keys")
                .with_context_map(context.as_object().unwrap().clone())
                .debug(true),
        )
        .unwrap();

    assert_eq!(out, RenderOutput::Json(json!({"context": context, "clean": true})));
}

#[test]
fn dispatches_a_context_field_named_constructor() {
    let fixture = Fixture::new(require_node!());
    fixture.script("brand", "dispatch(context.product.constructor)");
    let resolver = fixture.resolver();
    let renderer = Renderer::new(&fixture.engine, &resolver);

    let out = renderer
        .render(
            RenderConfig::new()
                .with_entry("brand")
                .with_context("product", json!({"constructor": "Acme Corp"}))
                .debug(true),
        )
        .unwrap();

    assert_eq!(out.as_str(), Some("Acme Corp"));
}
