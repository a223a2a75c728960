//! JSON formatting for result documents
//!
//! Documents go through relaxed extended JSON, then the `$oid`/`$date`
//! wrappers are collapsed to plain strings so the output reads like the
//! stored catalog rather than like a wire dump.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};

use super::Output;
use crate::error::Result;

/// JSON formatter with pretty printing support
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn format(&self, output: &Output) -> Result<String> {
        match output {
            Output::Documents(docs) => self.format_documents(docs),
            Output::Document(doc) => self.render(&simplified(doc)),
            Output::Message(msg) => self.render(&Value::String(msg.clone())),
        }
    }

    /// Compact mode writes one document per line; pretty mode one array.
    fn format_documents(&self, docs: &[Document]) -> Result<String> {
        let values: Vec<Value> = docs.iter().map(simplified).collect();
        if self.pretty {
            return self.render(&Value::Array(values));
        }

        let lines = values
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }

    fn render(&self, value: &Value) -> Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(text)
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Convert a document to JSON with BSON wrappers collapsed
pub fn simplified(doc: &Document) -> Value {
    collapse(Bson::Document(doc.clone()).into_relaxed_extjson())
}

fn collapse(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(oid)) = map.get("$oid") {
                    return Value::String(oid.clone());
                }
                if let Some(date) = map.get("$date") {
                    return match date {
                        Value::Object(inner) => inner
                            .get("$numberLong")
                            .cloned()
                            .unwrap_or_else(|| date.clone()),
                        other => other.clone(),
                    };
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, collapse(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(collapse).collect()),
        other => other,
    }
}
