use serde::Serialize;
use std::path::PathBuf;

use crate::batch::{BatchOutcome, QuarantinedRow};
use crate::distribution::{Distribution, Mark, Sentinel};

/// A component's mark in JSON: a number, or the sentinel string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportMark {
    Score(f64),
    NotAttempted(&'static str),
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub id: String,
    pub max: f64,
    pub mark: ReportMark,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub total: f64,
    pub step: f64,
    pub components: Vec<ComponentReport>,
}

impl DistributionReport {
    pub fn new(dist: &Distribution, sentinel: Sentinel) -> Self {
        Self {
            total: dist.total(),
            step: dist.step().value(),
            components: dist
                .entries()
                .iter()
                .map(|a| ComponentReport {
                    id: a.id.to_string(),
                    max: a.max,
                    mark: match a.mark {
                        Mark::Score(v) => ReportMark::Score(v),
                        Mark::NotAttempted => ReportMark::NotAttempted(sentinel.as_str()),
                    },
                })
                .collect(),
        }
    }
}

/// Result of one input file in `split --json`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub input: PathBuf,
    pub processed: usize,
    pub unprocessed: usize,
    pub files: Vec<PathBuf>,
    pub quarantined: Vec<QuarantinedRow>,
}

impl BatchReport {
    pub fn new(input: PathBuf, outcome: &BatchOutcome, files: Vec<PathBuf>) -> Self {
        Self {
            input,
            processed: outcome.processed.len(),
            unprocessed: outcome.unprocessed.len(),
            files,
            quarantined: outcome.quarantined.clone(),
        }
    }
}
