//! In-process evaluation of filter trees and pipelines
//!
//! Follows MongoDB semantics for the subset the catalog uses:
//! - A predicate on an array field matches when any element matches
//! - Numbers compare across Int32/Int64/Double
//! - A missing field compares as null for equality and never for `$gt`/`$lt`
//! - `$unwind` drops documents whose field is missing, null or an empty array
//! - `$avg` ignores non-numeric values and yields null when none remain

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use crate::error::{CatalogError, Result};
use crate::pipeline::{Accumulator, AccumulatorOp, GROUP_KEY, Pipeline, SortDirection, Stage};
use crate::query::{CompareOp, Filter};

/// Resolve a dotted path through embedded documents.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Canonical BSON type order used when values of different types meet.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over BSON values (type order first, then value).
pub(crate) fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Array(x), Bson::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let order = compare_values(left, right);
                if order != Ordering::Equal {
                    return order;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (as_f64(a), as_f64(b)) {
            // NaN sorts below every other number.
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| {
                x.is_nan().cmp(&y.is_nan()).reverse()
            }),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Values a predicate is tested against: the field itself, plus each
/// element when it is an array. Missing fields yield nothing.
fn candidates(value: Option<&Bson>) -> Vec<&Bson> {
    let Some(value) = value else {
        return Vec::new();
    };
    match value {
        Bson::Array(items) => {
            let mut all: Vec<&Bson> = items.iter().collect();
            all.push(value);
            all
        }
        other => vec![other],
    }
}

fn equality_matches(value: Option<&Bson>, expected: &Bson) -> bool {
    if value.is_none() {
        return matches!(expected, Bson::Null);
    }
    candidates(value)
        .into_iter()
        .any(|candidate| values_equal(candidate, expected))
}

fn ordering_matches(value: Option<&Bson>, expected: &Bson, wanted: Ordering) -> bool {
    candidates(value).into_iter().any(|candidate| {
        // $gt/$lt only compare within the same type bracket.
        type_rank(candidate) == type_rank(expected)
            && !matches!(candidate, Bson::Array(_))
            && compare_values(candidate, expected) == wanted
    })
}

/// A filter tree with its regexes compiled, ready to test documents.
pub(crate) enum Matcher<'a> {
    Compare {
        field: &'a str,
        op: CompareOp,
        value: &'a Bson,
    },
    And(Vec<Matcher<'a>>),
    In {
        field: &'a str,
        values: &'a [Bson],
    },
    Regex {
        field: &'a str,
        regex: Regex,
    },
}

/// Compile `filter` once per store call; an invalid regex fails here.
pub(crate) fn compile(filter: &Filter) -> Result<Matcher<'_>> {
    Ok(match filter {
        Filter::Compare { field, op, value } => Matcher::Compare {
            field,
            op: *op,
            value,
        },
        Filter::And(children) => {
            Matcher::And(children.iter().map(compile).collect::<Result<_>>()?)
        }
        Filter::In { field, values } => Matcher::In { field, values },
        Filter::Regex {
            field,
            pattern,
            case_insensitive,
        } => {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| {
                    CatalogError::Validation(format!("invalid regex '{pattern}': {e}"))
                })?;
            Matcher::Regex { field, regex }
        }
    })
}

impl Matcher<'_> {
    /// Evaluate against one document.
    pub(crate) fn matches(&self, document: &Document) -> bool {
        match self {
            Matcher::Compare { field, op, value } => {
                let actual = lookup(document, field);
                match op {
                    CompareOp::Eq => equality_matches(actual, value),
                    CompareOp::Gt => ordering_matches(actual, value, Ordering::Greater),
                    CompareOp::Lt => ordering_matches(actual, value, Ordering::Less),
                }
            }
            Matcher::And(children) => children.iter().all(|child| child.matches(document)),
            Matcher::In { field, values } => {
                let actual = lookup(document, field);
                values
                    .iter()
                    .any(|expected| equality_matches(actual, expected))
            }
            Matcher::Regex { field, regex } => candidates(lookup(document, field))
                .into_iter()
                .any(|candidate| match candidate {
                    Bson::String(text) => regex.is_match(text),
                    _ => false,
                }),
        }
    }
}

/// Apply a `$set` patch; returns whether anything changed.
pub(crate) fn apply_set(document: &mut Document, set: &Document) -> bool {
    let mut changed = false;
    for (field, value) in set {
        if document.get(field) != Some(value) {
            document.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Run a validated pipeline over a snapshot of documents.
pub(crate) fn run_pipeline(pipeline: &Pipeline, documents: Vec<Document>) -> Vec<Document> {
    pipeline
        .stages()
        .iter()
        .fold(documents, |documents, stage| match stage {
            Stage::Unwind { field } => unwind(documents, field),
            Stage::Group { key, accumulators } => group(documents, key, accumulators),
            Stage::Sort { field, direction } => sort(documents, field, *direction),
        })
}

fn unwind(documents: Vec<Document>, field: &str) -> Vec<Document> {
    let mut output = Vec::with_capacity(documents.len());
    for document in documents {
        match lookup(&document, field).cloned() {
            None | Some(Bson::Null) => {}
            Some(Bson::Array(items)) => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, field, item);
                    output.push(copy);
                }
            }
            // A non-array value unwinds to itself.
            Some(_) => output.push(document),
        }
    }
    output
}

fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            if let Ok(inner) = document.get_document_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

enum AccumulatorState {
    Average { sum: f64, count: u64 },
    Count(i32),
}

impl AccumulatorState {
    fn new(op: AccumulatorOp) -> Self {
        match op {
            AccumulatorOp::Average => AccumulatorState::Average { sum: 0.0, count: 0 },
            AccumulatorOp::Count => AccumulatorState::Count(0),
        }
    }

    fn add(&mut self, accumulator: &Accumulator, document: &Document) {
        match self {
            AccumulatorState::Average { sum, count } => {
                let value = accumulator
                    .source
                    .as_deref()
                    .and_then(|source| lookup(document, source))
                    .and_then(as_f64);
                if let Some(value) = value {
                    *sum += value;
                    *count += 1;
                }
            }
            AccumulatorState::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Bson {
        match self {
            AccumulatorState::Average { count: 0, .. } => Bson::Null,
            AccumulatorState::Average { sum, count } => Bson::Double(sum / count as f64),
            AccumulatorState::Count(n) => Bson::Int32(n),
        }
    }
}

fn group(documents: Vec<Document>, key: &str, accumulators: &[Accumulator]) -> Vec<Document> {
    // Groups keep first-seen order; an explicit sort stage orders them.
    let mut groups: Vec<(Bson, Vec<AccumulatorState>)> = Vec::new();

    for document in &documents {
        let group_key = lookup(document, key).cloned().unwrap_or(Bson::Null);
        let position = match groups.iter().position(|(k, _)| values_equal(k, &group_key)) {
            Some(position) => position,
            None => {
                let states = accumulators
                    .iter()
                    .map(|a| AccumulatorState::new(a.op))
                    .collect();
                groups.push((group_key, states));
                groups.len() - 1
            }
        };

        for (state, accumulator) in groups[position].1.iter_mut().zip(accumulators) {
            state.add(accumulator, document);
        }
    }

    groups
        .into_iter()
        .map(|(group_key, states)| {
            let mut output = Document::new();
            output.insert(GROUP_KEY, group_key);
            for (accumulator, state) in accumulators.iter().zip(states) {
                output.insert(accumulator.name.clone(), state.finish());
            }
            output
        })
        .collect()
}

fn sort(mut documents: Vec<Document>, field: &str, direction: SortDirection) -> Vec<Document> {
    documents.sort_by(|a, b| {
        let left = lookup(a, field).unwrap_or(&Bson::Null);
        let right = lookup(b, field).unwrap_or(&Bson::Null);
        match direction {
            SortDirection::Ascending => compare_values(left, right),
            SortDirection::Descending => compare_values(right, left),
        }
    });
    documents
}
