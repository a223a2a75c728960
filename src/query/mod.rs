//! Filter expressions
//!
//! This module builds immutable filter trees from typed predicates and
//! renders them to MongoDB filter documents:
//! - Comparisons: `eq`, `gt`, `lt`
//! - Logical: `and`
//! - Set membership: `one_of` (`$in`)
//! - Pattern: `regex` (unanchored substring search)
//!
//! Nothing here performs I/O. The in-memory store evaluates the same trees
//! directly, which is what the unit tests rely on.

use mongodb::bson::{Bson, Document, doc};

/// Comparison operator of a `Filter::Compare` node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
}

impl CompareOp {
    fn operator(&self) -> Option<&'static str> {
        match self {
            CompareOp::Eq => None,
            CompareOp::Gt => Some("$gt"),
            CompareOp::Lt => Some("$lt"),
        }
    }
}

/// Filter expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field <op> value`
    Compare {
        field: String,
        op: CompareOp,
        value: Bson,
    },

    /// All children must match. Empty matches every document.
    And(Vec<Filter>),

    /// Field equals one of the values. Empty matches nothing.
    In { field: String, values: Vec<Bson> },

    /// Field contains a match for `pattern`.
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
}

pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Filter {
    compare(field, CompareOp::Eq, value)
}

pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Filter {
    compare(field, CompareOp::Gt, value)
}

pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Filter {
    compare(field, CompareOp::Lt, value)
}

fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Bson>) -> Filter {
    Filter::Compare {
        field: field.into(),
        op,
        value: value.into(),
    }
}

pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::And(filters.into_iter().collect())
}

/// Set membership (`$in`).
pub fn one_of<V: Into<Bson>>(
    field: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Filter {
    Filter::In {
        field: field.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn regex(
    field: impl Into<String>,
    pattern: impl Into<String>,
    case_insensitive: bool,
) -> Filter {
    Filter::Regex {
        field: field.into(),
        pattern: pattern.into(),
        case_insensitive,
    }
}

impl Filter {
    /// Filter that matches every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    /// Render as a MongoDB filter document.
    pub fn to_document(&self) -> Document {
        match self {
            Filter::Compare { field, op, value } => {
                let mut filter = Document::new();
                match op.operator() {
                    None => filter.insert(field.clone(), value.clone()),
                    Some(operator) => {
                        let mut condition = Document::new();
                        condition.insert(operator, value.clone());
                        filter.insert(field.clone(), condition)
                    }
                };
                filter
            }

            Filter::And(children) if children.is_empty() => Document::new(),

            Filter::And(children) => {
                let clauses: Vec<Document> = children.iter().map(Filter::to_document).collect();
                doc! { "$and": clauses }
            }

            Filter::In { field, values } => {
                let mut filter = Document::new();
                filter.insert(field.clone(), doc! { "$in": values.clone() });
                filter
            }

            Filter::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let mut condition = doc! { "$regex": pattern.clone() };
                if *case_insensitive {
                    condition.insert("$options", "i");
                }
                let mut filter = Document::new();
                filter.insert(field.clone(), condition);
                filter
            }
        }
    }
}

/// A `$set` patch: replaces the listed top-level fields wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    set: Document,
}

impl Patch {
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        let mut set = Document::new();
        set.insert(field.into(), value.into());
        Self { set }
    }

    /// Add another field to the same `$set`.
    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Document {
        &self.set
    }

    pub fn to_document(&self) -> Document {
        doc! { "$set": self.set.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fields;

    #[test]
    fn test_gt_filter() {
        let filter = gt(fields::DURATION, 120);
        assert_eq!(filter.to_document(), doc! { "duracion": { "$gt": 120 } });
    }

    #[test]
    fn test_eq_filter_is_plain_match() {
        let filter = eq(fields::TITLE, "Inception");
        assert_eq!(filter.to_document(), doc! { "titulo": "Inception" });
    }

    #[test]
    fn test_recent_series_filter() {
        let filter = and([eq(fields::TYPE, "series"), gt(fields::RELEASE_YEAR, 2015)]);
        assert_eq!(
            filter.to_document(),
            doc! { "$and": [ { "tipo": "series" }, { "estreno": { "$gt": 2015 } } ] }
        );
    }

    #[test]
    fn test_empty_and_matches_everything() {
        assert_eq!(and([]).to_document(), Document::new());
        assert_eq!(Filter::all(), and([]));
    }

    #[test]
    fn test_regex_case_insensitive() {
        let filter = regex(fields::TITLE, "in", true);
        let rendered = filter.to_document();
        let condition = rendered.get_document("titulo").unwrap();
        assert_eq!(condition.get_str("$regex").unwrap(), "in");
        assert_eq!(condition.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_regex_case_sensitive_has_no_options() {
        let rendered = regex(fields::TITLE, "^Dark$", false).to_document();
        let condition = rendered.get_document("titulo").unwrap();
        assert!(!condition.contains_key("$options"));
    }

    #[test]
    fn test_one_of_filter() {
        let filter = one_of(fields::TYPE, ["movie", "series"]);
        assert_eq!(
            filter.to_document(),
            doc! { "tipo": { "$in": ["movie", "series"] } }
        );

        let empty = one_of(fields::TYPE, Vec::<String>::new());
        assert_eq!(empty.to_document(), doc! { "tipo": { "$in": [] } });
    }

    #[test]
    fn test_patch_document() {
        let patch = Patch::set(fields::AVERAGE_RATING, 4.9);
        assert_eq!(
            patch.to_document(),
            doc! { "$set": { "calificacionPromedio": 4.9 } }
        );

        let patch = patch.and_set(fields::DURATION, 150);
        assert_eq!(patch.fields().len(), 2);
    }
}
