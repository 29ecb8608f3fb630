//! Dataset validation
//!
//! - [`schema`]: column checks and the declarative GWAS header rules
//! - [`files`]: one validator per file kind
//! - [`config`]: the configuration validator tying manifest, inventory and
//!   file validators together
//!
//! Callers choose which checks run with a [`ValidationSelection`].

pub mod config;
pub mod files;
pub mod schema;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::dataset::FileKind;

pub use config::{validate_dataset, ValidationOptions, ValidationReport};

/// A named validation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationStep {
    Config,
    Line,
    Genotype,
    Variant,
    Kinship,
    Population,
    Phenotype,
    Runs,
    Result,
}

impl ValidationStep {
    pub const ALL: [ValidationStep; 9] = [
        ValidationStep::Config,
        ValidationStep::Line,
        ValidationStep::Genotype,
        ValidationStep::Variant,
        ValidationStep::Kinship,
        ValidationStep::Population,
        ValidationStep::Phenotype,
        ValidationStep::Runs,
        ValidationStep::Result,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValidationStep::Config => "config",
            ValidationStep::Line => "line",
            ValidationStep::Genotype => "genotype",
            ValidationStep::Variant => "variant",
            ValidationStep::Kinship => "kinship",
            ValidationStep::Population => "population",
            ValidationStep::Phenotype => "phenotype",
            ValidationStep::Runs => "runs",
            ValidationStep::Result => "result",
        }
    }

    /// The step that covers files of `kind`
    pub fn for_kind(kind: FileKind) -> Self {
        match kind {
            FileKind::Line => ValidationStep::Line,
            FileKind::Genotype => ValidationStep::Genotype,
            FileKind::Variant => ValidationStep::Variant,
            FileKind::Kinship => ValidationStep::Kinship,
            FileKind::PopulationStructure => ValidationStep::Population,
            FileKind::Phenotype => ValidationStep::Phenotype,
            FileKind::GwasRun => ValidationStep::Runs,
            FileKind::GwasResult => ValidationStep::Result,
        }
    }
}

impl fmt::Display for ValidationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValidationStep {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        ValidationStep::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| format!("unknown validation step '{}'", s))
    }
}

/// The set of steps requested for one run, in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationSelection {
    steps: BTreeSet<ValidationStep>,
}

impl ValidationSelection {
    pub fn all() -> Self {
        Self {
            steps: ValidationStep::ALL.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Parse step names. `all` expands to every step; unknown names are logged
    /// and dropped; repeats collapse.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Self {
        let mut steps = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            if name.trim().eq_ignore_ascii_case("all") {
                steps.extend(ValidationStep::ALL);
                continue;
            }
            match name.parse::<ValidationStep>() {
                Ok(step) => {
                    steps.insert(step);
                },
                Err(reason) => warn!(step = name, "Ignoring {}", reason),
            }
        }
        Self { steps }
    }

    pub fn includes(&self, step: ValidationStep) -> bool {
        self.steps.contains(&step)
    }

    pub fn includes_kind(&self, kind: FileKind) -> bool {
        self.includes(ValidationStep::for_kind(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = ValidationStep> + '_ {
        self.steps.iter().copied()
    }
}

impl fmt::Display for ValidationSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.steps().map(ValidationStep::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_every_step() {
        let selection = ValidationSelection::parse(&["all"]);
        assert_eq!(selection, ValidationSelection::all());
        assert_eq!(selection.steps().count(), 9);
    }

    #[test]
    fn test_unknown_steps_dropped_and_duplicates_collapsed() {
        let selection = ValidationSelection::parse(&["variant", "genotpye", "Genotype", "variant"]);
        let steps: Vec<_> = selection.steps().collect();
        assert_eq!(steps, vec![ValidationStep::Genotype, ValidationStep::Variant]);
    }

    #[test]
    fn test_only_unknown_steps_is_empty() {
        let selection = ValidationSelection::parse(&["nope"]);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_every_kind_maps_to_a_step() {
        let selection = ValidationSelection::parse(&["population", "runs"]);
        assert!(selection.includes_kind(FileKind::PopulationStructure));
        assert!(selection.includes_kind(FileKind::GwasRun));
        assert!(!selection.includes_kind(FileKind::GwasResult));
    }

    #[test]
    fn test_display_in_canonical_order() {
        let selection = ValidationSelection::parse(&["result", "config", "line"]);
        assert_eq!(selection.to_string(), "[config, line, result]");
    }
}
