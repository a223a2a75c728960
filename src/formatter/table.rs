//! Table formatting for result documents using tabled
//!
//! Columns are the union of all field names, `_id` first and the rest in
//! first-seen order. Long cells wrap instead of being truncated.

use mongodb::bson::{Bson, Document};
use tabled::{
    Table,
    builder::Builder,
    settings::{Alignment, Color, Modify, Style, object::Columns, object::Rows, width::Width},
};

use super::Output;
use crate::error::Result;

/// Maximum width for a single column (characters)
const DEFAULT_MAX_COLUMN_WIDTH: usize = 40;

/// Arrays longer than this show only their length
const INLINE_ARRAY_LIMIT: usize = 4;

/// Table formatter for result documents
pub struct TableFormatter {
    max_column_width: usize,
    style: TableStyle,
    use_colors: bool,
}

/// Available table styles
#[derive(Debug, Clone, Copy)]
pub enum TableStyle {
    Modern,
    Ascii,
    Markdown,
    Psql,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self::with_colors(false)
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self {
            max_column_width: DEFAULT_MAX_COLUMN_WIDTH,
            style: TableStyle::Modern,
            use_colors,
        }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_max_column_width(mut self, width: usize) -> Self {
        self.max_column_width = width;
        self
    }

    pub fn format(&self, output: &Output) -> Result<String> {
        match output {
            Output::Documents(docs) if docs.is_empty() => Ok("(no results)".to_string()),
            Output::Documents(docs) => Ok(self.format_documents(docs)),
            Output::Document(doc) => Ok(self.format_documents(std::slice::from_ref(doc))),
            Output::Message(msg) => Ok(msg.clone()),
        }
    }

    fn format_documents(&self, docs: &[Document]) -> String {
        let fields = extract_field_names(docs);
        if fields.is_empty() {
            return "(no fields)".to_string();
        }

        let mut builder = Builder::default();
        builder.push_record(fields.clone());
        for doc in docs {
            let row: Vec<String> = fields
                .iter()
                .map(|field| doc.get(field).map(format_bson_value).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);

        for i in 0..fields.len() {
            table.with(Modify::new(Columns::new(i..=i)).with(Width::wrap(self.max_column_width)));
        }
        table.with(Modify::new(Rows::first()).with(Alignment::center()));

        if self.use_colors {
            table.modify(Rows::first(), Color::FG_CYAN | Color::BOLD);
        }

        table.to_string()
    }

    fn apply_style(&self, table: &mut Table) {
        match self.style {
            TableStyle::Modern => table.with(Style::modern()),
            TableStyle::Ascii => table.with(Style::ascii()),
            TableStyle::Markdown => table.with(Style::markdown()),
            TableStyle::Psql => table.with(Style::psql()),
        };
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_field_names(docs: &[Document]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for doc in docs {
        for key in doc.keys() {
            if !fields.contains(key) {
                fields.push(key.clone());
            }
        }
    }

    if let Some(pos) = fields.iter().position(|f| f == "_id") {
        let id = fields.remove(pos);
        fields.insert(0, id);
    }
    fields
}

/// Cell text for a BSON value
fn format_bson_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => {
            if f.fract() == 0.0 && f.abs() < 1e10 {
                format!("{f:.1}")
            } else {
                // Averages can carry float noise, e.g. 4.749999999.
                let rounded = (f * 1e4).round() / 1e4;
                rounded.to_string()
            }
        }
        Bson::Boolean(b) => b.to_string(),
        Bson::Null => String::from("null"),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        Bson::Array(items) if items.len() > INLINE_ARRAY_LIMIT => {
            format!("[{} items]", items.len())
        }
        Bson::Array(items) => items
            .iter()
            .map(format_bson_value)
            .collect::<Vec<_>>()
            .join(", "),
        Bson::Document(doc) => {
            let fields: Vec<String> = doc
                .iter()
                .map(|(k, v)| format!("{k}: {}", format_bson_value(v)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        other => other.to_string(),
    }
}
