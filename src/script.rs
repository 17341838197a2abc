//! Composition of the script handed to an engine.
//!
//! A composed script is three parts joined as separate statements:
//!
//! ```js
//! var dispatch = function (result) { return console.log(JSON.stringify(result)); };
//! var process = globalThis.process || { env: {} };
//! process.env.APP_ENV = "production";
//! var context = JSON.parse("{\"user\":{\"name\":\"Alice\"}}");
//! dispatch('<p>Hello, world!</p>');   // application script
//! ```
//!
//! Application scripts see `dispatch`, `process.env` and `context` the same
//! way on either engine.

use serde_json::Value;
use std::collections::BTreeMap;

const STATEMENT_SEPARATOR: &str = ";\n";

const PROTO_KEY: &str = "__proto__";

/// Defines `dispatch`, forwarding its JSON-serialized argument to `handler`.
pub fn dispatch_script(handler: &str) -> String {
    format!(
        "var dispatch = function (result) {{ return {}(JSON.stringify(result)); }}",
        handler
    )
}

/// Defines `process.env` (one assignment per entry) and the `context` global.
///
/// `context` is always an object, `{}` when empty. It goes through
/// `JSON.parse` so every key, `__proto__` included, lands as an own property.
pub fn environment_script(
    env: &BTreeMap<String, Value>,
    context: &BTreeMap<String, Value>,
) -> Result<String, serde_json::Error> {
    let mut statements = vec!["var process = globalThis.process || { env: {} }".to_string()];

    for (key, value) in env {
        let value = serde_json::to_string(value)?;
        let statement = if key == PROTO_KEY {
            // Plain assignment would hit the prototype setter
            format!(
                "Object.defineProperty(process.env, {}, {{ value: {}, writable: true, enumerable: true, configurable: true }})",
                serde_json::to_string(key)?,
                value
            )
        } else if is_identifier(key) {
            format!("process.env.{} = {}", key, value)
        } else {
            format!("process.env[{}] = {}", serde_json::to_string(key)?, value)
        };
        statements.push(statement);
    }

    let context = serde_json::to_string(context)?;
    statements.push(format!("var context = JSON.parse({})", serde_json::to_string(&context)?));

    Ok(statements.join(STATEMENT_SEPARATOR))
}

/// Join script parts in order as separate statements.
pub fn compose<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .collect::<Vec<_>>()
        .join(STATEMENT_SEPARATOR)
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
