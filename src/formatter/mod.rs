//! Output formatting for command results
//!
//! Results are carried as BSON documents and rendered in the configured
//! format:
//! - JSON (one compact document per line)
//! - pretty-printed JSON
//! - ASCII table

use mongodb::bson::Document;
use serde::Serialize;

use crate::config::{DisplayConfig, OutputFormat};
use crate::error::Result;

pub mod json;
pub mod table;

pub use json::JsonFormatter;
pub use table::TableFormatter;

/// Result of a command, ready to render
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Zero or more result rows
    Documents(Vec<Document>),

    /// A single summary (counts, ids, outcomes)
    Document(Document),

    /// Plain text
    Message(String),
}

impl Output {
    /// Rows from any serializable values, e.g. decoded `Content`s.
    pub fn rows<T: Serialize>(items: &[T]) -> Result<Self> {
        let docs = items
            .iter()
            .map(mongodb::bson::to_document)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Output::Documents(docs))
    }

    pub fn message(text: impl Into<String>) -> Self {
        Output::Message(text.into())
    }
}

/// Main formatter for command output
pub struct Formatter {
    format_type: OutputFormat,
    use_colors: bool,
}

impl Formatter {
    pub fn new(format_type: OutputFormat, use_colors: bool) -> Self {
        Self {
            format_type,
            use_colors,
        }
    }

    pub fn from_config(config: &DisplayConfig) -> Self {
        Self::new(config.format, config.color_output)
    }

    pub fn format_type(&self) -> OutputFormat {
        self.format_type
    }

    /// Format output according to the configured format
    pub fn format(&self, output: &Output) -> Result<String> {
        match self.format_type {
            OutputFormat::Json => JsonFormatter::new(false).format(output),
            OutputFormat::JsonPretty => JsonFormatter::new(true).format(output),
            OutputFormat::Table => TableFormatter::with_colors(self.use_colors).format(output),
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::from_config(&DisplayConfig::default())
    }
}
