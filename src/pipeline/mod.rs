//! Aggregation pipelines
//!
//! Pipelines are inert data: an ordered list of stage descriptors, validated
//! by [`PipelineBuilder::build`] before anything runs. The builder never
//! reorders stages.
//!
//! Supported stages:
//! - `unwind(field)`: one document per array element
//! - `group(key, accumulators)`: `$avg` and count (`$sum: 1`) accumulators
//! - `sort(field, direction)`

use mongodb::bson::{Bson, Document, doc};

use crate::error::{CatalogError, Result};
use crate::model::fields;

/// Key every `$group` output document carries.
pub const GROUP_KEY: &str = "_id";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Accumulator operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    /// Mean of the numeric values of the source field.
    Average,
    /// Number of documents in the group; the source field is ignored.
    Count,
}

/// One named output of a `group` stage
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub name: String,
    pub op: AccumulatorOp,
    pub source: Option<String>,
}

impl Accumulator {
    pub fn new(name: impl Into<String>, op: AccumulatorOp, source: Option<String>) -> Self {
        Self {
            name: name.into(),
            op,
            source,
        }
    }

    pub fn average(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(name, AccumulatorOp::Average, Some(source.into()))
    }

    pub fn count(name: impl Into<String>) -> Self {
        Self::new(name, AccumulatorOp::Count, None)
    }

    fn to_expression(&self) -> Document {
        match (self.op, &self.source) {
            (AccumulatorOp::Average, Some(source)) => doc! { "$avg": field_ref(source) },
            // Rejected by `build`; rendered as a null average for completeness.
            (AccumulatorOp::Average, None) => doc! { "$avg": Bson::Null },
            (AccumulatorOp::Count, _) => doc! { "$sum": 1 },
        }
    }
}

/// A single pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Unwind {
        field: String,
    },
    Group {
        key: String,
        accumulators: Vec<Accumulator>,
    },
    Sort {
        field: String,
        direction: SortDirection,
    },
}

impl Stage {
    pub fn to_document(&self) -> Document {
        match self {
            Stage::Unwind { field } => doc! { "$unwind": field_ref(field) },
            Stage::Group { key, accumulators } => {
                let mut group = doc! { GROUP_KEY: field_ref(key) };
                for accumulator in accumulators {
                    group.insert(accumulator.name.clone(), accumulator.to_expression());
                }
                doc! { "$group": group }
            }
            Stage::Sort { field, direction } => {
                let mut sort = Document::new();
                sort.insert(field.clone(), direction.as_i32());
                doc! { "$sort": sort }
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Stage::Unwind { .. } => "unwind",
            Stage::Group { .. } => "group",
            Stage::Sort { .. } => "sort",
        }
    }
}

/// `$field` reference used inside stage expressions.
fn field_ref(field: &str) -> String {
    format!("${field}")
}

/// Validated, immutable pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Render as the stage documents sent to `aggregate`.
    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

/// Collects stages in caller order
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn unwind(mut self, field: impl Into<String>) -> Self {
        self.stages.push(Stage::Unwind {
            field: field.into(),
        });
        self
    }

    pub fn group(
        mut self,
        key: impl Into<String>,
        accumulators: impl IntoIterator<Item = Accumulator>,
    ) -> Self {
        self.stages.push(Stage::Group {
            key: key.into(),
            accumulators: accumulators.into_iter().collect(),
        });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.stages.push(Stage::Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Validate the stages and freeze them.
    ///
    /// Once a `group` has run only `_id` and the accumulator names exist, so
    /// later stages may reference nothing else.
    pub fn build(self) -> Result<Pipeline> {
        // Fields available to the next stage; `None` means "whatever the
        // input documents carry".
        let mut available: Option<Vec<String>> = None;

        for (position, stage) in self.stages.iter().enumerate() {
            match stage {
                Stage::Unwind { field } | Stage::Sort { field, .. } => {
                    check_field_name(position, stage, field)?;
                    check_available(position, stage, field, available.as_deref())?;
                }
                Stage::Group { key, accumulators } => {
                    check_field_name(position, stage, key)?;
                    check_available(position, stage, key, available.as_deref())?;
                    check_accumulators(position, accumulators, available.as_deref())?;

                    let mut produced = vec![GROUP_KEY.to_string()];
                    produced.extend(accumulators.iter().map(|a| a.name.clone()));
                    available = Some(produced);
                }
            }
        }

        Ok(Pipeline {
            stages: self.stages,
        })
    }
}

fn invalid(position: usize, message: String) -> CatalogError {
    CatalogError::InvalidPipeline(format!("stage {position}: {message}"))
}

fn check_field_name(position: usize, stage: &Stage, field: &str) -> Result<()> {
    if field.is_empty() {
        return Err(invalid(position, format!("{} field is empty", stage.name())));
    }
    if field.starts_with('$') {
        return Err(invalid(
            position,
            format!("{} field '{field}' must be a plain field name", stage.name()),
        ));
    }
    Ok(())
}

fn check_available(
    position: usize,
    stage: &Stage,
    field: &str,
    available: Option<&[String]>,
) -> Result<()> {
    let Some(available) = available else {
        return Ok(());
    };
    let root = field.split('.').next().unwrap_or(field);
    if available.iter().any(|name| name == root) {
        Ok(())
    } else {
        Err(invalid(
            position,
            format!(
                "{} references '{field}', which the preceding group does not produce (available: {})",
                stage.name(),
                available.join(", ")
            ),
        ))
    }
}

fn check_accumulators(
    position: usize,
    accumulators: &[Accumulator],
    available: Option<&[String]>,
) -> Result<()> {
    if accumulators.is_empty() {
        return Err(invalid(position, "group has no accumulators".to_string()));
    }

    let mut seen: Vec<&str> = Vec::with_capacity(accumulators.len());
    for accumulator in accumulators {
        let name = accumulator.name.as_str();
        if name.is_empty() || name.starts_with('$') || name.contains('.') {
            return Err(invalid(
                position,
                format!("invalid accumulator name '{name}'"),
            ));
        }
        if name == GROUP_KEY {
            return Err(invalid(
                position,
                format!("accumulator may not be named '{GROUP_KEY}'"),
            ));
        }
        if seen.contains(&name) {
            return Err(invalid(
                position,
                format!("duplicate accumulator '{name}'"),
            ));
        }
        seen.push(name);

        match (accumulator.op, accumulator.source.as_deref()) {
            (AccumulatorOp::Average, None) => {
                return Err(invalid(
                    position,
                    format!("average accumulator '{name}' needs a source field"),
                ));
            }
            (AccumulatorOp::Average, Some(source)) => {
                if source.is_empty() || source.starts_with('$') {
                    return Err(invalid(
                        position,
                        format!("average accumulator '{name}' has invalid source '{source}'"),
                    ));
                }
                if let Some(available) = available {
                    let root = source.split('.').next().unwrap_or(source);
                    if !available.iter().any(|field| field == root) {
                        return Err(invalid(
                            position,
                            format!(
                                "average accumulator '{name}' reads '{source}', which the preceding group does not produce"
                            ),
                        ));
                    }
                }
            }
            // Count ignores its source entirely.
            (AccumulatorOp::Count, _) => {}
        }
    }
    Ok(())
}

/// Average rating per content type, best first.
pub fn rating_by_type() -> Result<Pipeline> {
    Pipeline::builder()
        .group(
            fields::TYPE,
            [Accumulator::average("averageRating", fields::AVERAGE_RATING)],
        )
        .sort("averageRating", SortDirection::Descending)
        .build()
}

/// Number of titles per genre, most common first.
pub fn count_by_genre() -> Result<Pipeline> {
    Pipeline::builder()
        .unwind(fields::GENRES)
        .group(fields::GENRES, [Accumulator::count("total")])
        .sort("total", SortDirection::Descending)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn assert_invalid(result: Result<Pipeline>) {
        match result {
            Err(CatalogError::InvalidPipeline(_)) => {}
            other => panic!("expected InvalidPipeline, got {other:?}"),
        }
    }

    #[test]
    fn test_rating_by_type_documents() {
        let pipeline = rating_by_type().unwrap();
        assert_eq!(
            pipeline.to_documents(),
            vec![
                doc! { "$group": { "_id": "$tipo", "averageRating": { "$avg": "$calificacionPromedio" } } },
                doc! { "$sort": { "averageRating": -1 } },
            ]
        );
    }

    #[test]
    fn test_count_by_genre_documents() {
        let pipeline = count_by_genre().unwrap();
        assert_eq!(
            pipeline.to_documents(),
            vec![
                doc! { "$unwind": "$genero" },
                doc! { "$group": { "_id": "$genero", "total": { "$sum": 1 } } },
                doc! { "$sort": { "total": -1 } },
            ]
        );
    }

    #[test]
    fn test_stage_order_preserved() {
        let pipeline = Pipeline::builder()
            .sort("estreno", SortDirection::Ascending)
            .unwind("genero")
            .sort("titulo", SortDirection::Descending)
            .build()
            .unwrap();

        let names: Vec<&str> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(names, ["sort", "unwind", "sort"]);
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn test_empty_pipeline_is_valid() {
        let pipeline = assert_ok!(Pipeline::builder().build());
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_average_without_source_rejected() {
        assert_invalid(
            Pipeline::builder()
                .group(
                    "tipo",
                    [Accumulator::new("avg", AccumulatorOp::Average, None)],
                )
                .build(),
        );
    }

    #[test]
    fn test_count_ignores_source() {
        let result = Pipeline::builder()
            .group(
                "tipo",
                [Accumulator::new(
                    "total",
                    AccumulatorOp::Count,
                    Some("anything".to_string()),
                )],
            )
            .build();
        assert_ok!(result);
    }

    #[test]
    fn test_group_needs_accumulators() {
        assert_invalid(
            Pipeline::builder()
                .group("tipo", Vec::<Accumulator>::new())
                .build(),
        );
    }

    #[test]
    fn test_duplicate_and_reserved_accumulator_names() {
        assert_invalid(
            Pipeline::builder()
                .group("tipo", [Accumulator::count("n"), Accumulator::count("n")])
                .build(),
        );
        assert_invalid(
            Pipeline::builder()
                .group("tipo", [Accumulator::count("_id")])
                .build(),
        );
    }

    #[test]
    fn test_sort_after_group_must_use_group_output() {
        assert_invalid(
            Pipeline::builder()
                .group("tipo", [Accumulator::count("total")])
                .sort("estreno", SortDirection::Descending)
                .build(),
        );
        assert_ok!(
            Pipeline::builder()
                .group("tipo", [Accumulator::count("total")])
                .sort("_id", SortDirection::Ascending)
                .build()
        );
    }

    #[test]
    fn test_dollar_prefixed_field_rejected() {
        assert_invalid(Pipeline::builder().unwind("$genero").build());
        assert_invalid(Pipeline::builder().sort("", SortDirection::Ascending).build());
    }
}
