//! The render pipeline: compose, execute, interpret, fall back.

use crate::engine::Engine;
use crate::error::{OptionError, RenderError, ResolveError};
use crate::resolver::Resolver;
use crate::script;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Where the client bootstrap tag goes relative to the rendered markup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptPosition {
    Before,
    #[default]
    After,
}

impl FromStr for ScriptPosition {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(ScriptPosition::Before),
            "after" => Ok(ScriptPosition::After),
            other => Err(OptionError {
                option: "script position",
                value: other.to_string(),
                expected: "before, after",
            }),
        }
    }
}

/// Loading attribute of the client bootstrap tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptLoad {
    #[default]
    Sync,
    Defer,
    Async,
}

impl ScriptLoad {
    fn attribute(self) -> Option<&'static str> {
        match self {
            ScriptLoad::Sync => None,
            ScriptLoad::Defer => Some("defer"),
            ScriptLoad::Async => Some("async"),
        }
    }
}

impl FromStr for ScriptLoad {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(ScriptLoad::Sync),
            "defer" => Ok(ScriptLoad::Defer),
            "async" => Ok(ScriptLoad::Async),
            other => Err(OptionError {
                option: "script load strategy",
                value: other.to_string(),
                expected: "sync, defer, async",
            }),
        }
    }
}

/// Everything one render needs, assembled before [`Renderer::render`].
///
/// Context and env keys are unique; setting a key again replaces its value.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    entry: Option<String>,
    context: BTreeMap<String, Value>,
    env: BTreeMap<String, Value>,
    enabled: bool,
    fallback: String,
    debug: bool,
    with_script: bool,
    script_position: ScriptPosition,
    script_load: ScriptLoad,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            entry: None,
            context: BTreeMap::new(),
            env: BTreeMap::new(),
            enabled: true,
            fallback: String::new(),
            debug: false,
            with_script: true,
            script_position: ScriptPosition::default(),
            script_load: ScriptLoad::default(),
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_context_map<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.context
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_env_map<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.env
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// When disabled, nothing is executed and the fallback is returned.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// In debug mode engine failures reach the caller instead of the fallback.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_script(mut self, with_script: bool) -> Self {
        self.with_script = with_script;
        self
    }

    pub fn without_script(self) -> Self {
        self.with_script(false)
    }

    pub fn script_position(mut self, position: ScriptPosition) -> Self {
        self.script_position = position;
        self
    }

    pub fn script_load(mut self, load: ScriptLoad) -> Self {
        self.script_load = load;
        self
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn env(&self) -> &BTreeMap<String, Value> {
        &self.env
    }
}

/// Result of a render: structured data when the engine output parses as
/// JSON, the raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Text(String),
    Json(Value),
}

impl RenderOutput {
    /// Interpret raw engine output. Any valid JSON wins, including a bare
    /// `42` or `true`; only unparsable output stays text.
    pub fn from_raw(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => RenderOutput::Json(value),
            Err(_) => RenderOutput::Text(raw),
        }
    }

    /// The textual content, for text output and JSON strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RenderOutput::Text(text) => Some(text),
            RenderOutput::Json(Value::String(text)) => Some(text),
            RenderOutput::Json(_) => None,
        }
    }

    /// Markup for the page: text and JSON strings as-is, other JSON compact.
    pub fn into_markup(self) -> String {
        match self {
            RenderOutput::Text(text) | RenderOutput::Json(Value::String(text)) => text,
            RenderOutput::Json(value) => value.to_string(),
        }
    }
}

impl fmt::Display for RenderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderOutput::Text(text) | RenderOutput::Json(Value::String(text)) => f.write_str(text),
            RenderOutput::Json(value) => write!(f, "{}", value),
        }
    }
}

/// Runs render configs against an engine and a resolver.
///
/// Holds only borrows, so one engine can back any number of renderers.
pub struct Renderer<'a, E: ?Sized, R: ?Sized> {
    engine: &'a E,
    resolver: &'a R,
}

impl<'a, E, R> Renderer<'a, E, R>
where
    E: Engine + ?Sized,
    R: Resolver + ?Sized,
{
    pub fn new(engine: &'a E, resolver: &'a R) -> Self {
        Self { engine, resolver }
    }

    /// Render `config`.
    ///
    /// Resolution errors always surface. Engine errors surface
    /// in debug mode and become the fallback otherwise.
    pub fn render(&self, config: RenderConfig) -> Result<RenderOutput, RenderError> {
        if !config.enabled {
            debug!("rendering disabled, serving fallback");
            return Ok(RenderOutput::Text(config.fallback));
        }

        let entry = config.entry.as_deref().ok_or(ResolveError::MissingEntry)?;
        let script = self.compose(&config)?;

        match self.engine.run(&script) {
            Ok(raw) => Ok(RenderOutput::from_raw(raw)),
            Err(err) if config.debug => Err(err.into()),
            Err(err) => {
                warn!(entry, error = %err, "render failed, serving fallback");
                Ok(RenderOutput::Text(config.fallback))
            }
        }
    }

    /// Render `config` to markup and splice in the client bootstrap tag.
    pub fn render_html(&self, config: RenderConfig) -> Result<String, RenderError> {
        let tag = self.client_script_tag(&config);
        let position = config.script_position;
        let body = self.render(config)?.into_markup();

        Ok(match (tag, position) {
            (None, _) => body,
            (Some(tag), ScriptPosition::Before) => tag + &body,
            (Some(tag), ScriptPosition::After) => body + &tag,
        })
    }

    /// The full script `render` would hand to the engine.
    pub fn compose(&self, config: &RenderConfig) -> Result<String, RenderError> {
        let entry = config.entry.as_deref().ok_or(ResolveError::MissingEntry)?;
        let application = self.resolver.server_script(entry)?;

        let dispatch = script::dispatch_script(self.engine.dispatch_handler());
        let environment = script::environment_script(&config.env, &config.context)?;
        let composed = script::compose([dispatch.as_str(), environment.as_str(), application.as_str()]);

        debug!(entry, bytes = composed.len(), "composed render script");
        Ok(composed)
    }

    fn client_script_tag(&self, config: &RenderConfig) -> Option<String> {
        if !config.with_script {
            return None;
        }
        let url = self.resolver.client_script_url(config.entry.as_deref()?)?;
        let load = config
            .script_load
            .attribute()
            .map(|attr| format!(" {}", attr))
            .unwrap_or_default();

        Some(format!("<script{} src=\"{}\"></script>", load, escape_attribute(&url)))
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
