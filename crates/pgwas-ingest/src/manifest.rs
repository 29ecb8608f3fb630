//! Dataset manifest
//!
//! A manifest is a flat JSON object describing one dataset: species identity,
//! population, genotype version, algorithm names, cutoffs and the names of the
//! singleton files that sit next to it. The manifest is first read as a raw key
//! map so that every missing or empty key can be reported in one error, and only
//! then decoded into the typed [`Manifest`].

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ConfigurationError, IngestError, Result};

/// Keys that must be present
pub const REQUIRED_KEYS: &[&str] = &[
    "species_shortname",
    "species_binomial_name",
    "species_subspecies",
    "species_variety",
    "population_name",
    "number_of_chromosomes",
    "genotype_version_assembly_name",
    "genotype_version_annotation_name",
    "reference_genome_line_name",
    "gwas_algorithm_name",
    "imputation_method_name",
    "kinship_algorithm_name",
    "population_structure_algorithm_name",
    "kinship_filename",
    "population_structure_filename",
    "gwas_run_filename",
    "gwas_results_filename",
    "missing_SNP_cutoff_value",
    "missing_line_cutoff_value",
    "minor_allele_frequency_cutoff_value",
    "phenotype_filename",
];

/// Required keys that may legitimately be blank
const NULLABLE_KEYS: &[&str] = &["species_subspecies", "species_variety"];

/// Misspelling accepted for `kinship_algorithm_name` in older manifests
const LEGACY_KINSHIP_ALGORITHM_KEY: &str = "kinship_algortihm_name";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationSpec {
    pub code: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// A field trial or phenotyping run the dataset was grown in
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowoutSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub growout_type: String,
    pub location: LocationSpec,
    /// Derived from the growout name (e.g. `PU09`) when absent
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub species_shortname: String,
    pub species_binomial_name: String,
    pub species_subspecies: Option<String>,
    pub species_variety: Option<String>,
    pub population_name: String,
    pub number_of_chromosomes: u32,
    pub genotype_version_assembly_name: String,
    pub genotype_version_annotation_name: String,
    pub reference_genome_line_name: String,
    pub gwas_algorithm_name: String,
    pub imputation_method_name: String,
    pub kinship_algorithm_name: String,
    pub population_structure_algorithm_name: String,
    pub kinship_filename: String,
    pub population_structure_filename: String,
    pub gwas_run_filenames: Vec<String>,
    pub gwas_results_filenames: Vec<String>,
    pub phenotype_filenames: Vec<String>,
    pub missing_snp_cutoff_value: f64,
    pub missing_line_cutoff_value: f64,
    pub minor_allele_frequency_cutoff_value: f64,
    pub lines_filename: String,
    pub published: Option<bool>,
    pub owner: Option<String>,
    pub growouts: Vec<GrowoutSpec>,
}

impl Manifest {
    /// Read and check a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IngestError::file_not_found(path));
        }
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Parsed manifest JSON");
        Self::from_value(value)
    }

    /// Check a manifest already decoded into JSON
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut raw) = value else {
            return Err(ConfigurationError::Malformed(
                "manifest must be a JSON object".to_string(),
            )
            .into());
        };

        if !raw.contains_key("kinship_algorithm_name") {
            if let Some(legacy) = raw.remove(LEGACY_KINSHIP_ALGORITHM_KEY) {
                warn!(
                    key = LEGACY_KINSHIP_ALGORITHM_KEY,
                    "Manifest uses legacy key spelling; prefer 'kinship_algorithm_name'"
                );
                raw.insert("kinship_algorithm_name".to_string(), legacy);
            }
        }

        check_required(&raw)?;
        decode(&raw)
    }

    /// `chr1`, `chr2`, ... for every chromosome in the dataset
    pub fn chromosome_names(&self) -> Vec<String> {
        chromosome_names(self.number_of_chromosomes)
    }
}

pub fn chromosome_names(count: u32) -> Vec<String> {
    (1..=count).map(|i| format!("chr{}", i)).collect()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Aggregate missing keys first, then empty ones
fn check_required(raw: &Map<String, Value>) -> Result<()> {
    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| !raw.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigurationError::MissingKeys(missing).into());
    }

    let empty: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| !NULLABLE_KEYS.contains(*key))
        .filter(|key| raw.get(**key).is_some_and(is_empty))
        .map(|key| key.to_string())
        .collect();
    if !empty.is_empty() {
        return Err(ConfigurationError::EmptyKeys(empty).into());
    }

    Ok(())
}

/// Typed decoding; every invalid value is collected before failing
fn decode(raw: &Map<String, Value>) -> Result<Manifest> {
    let mut problems = Vec::new();

    let mut text = |key: &str| -> String {
        match raw.get(key).and_then(scalar_text) {
            Some(s) => s,
            None => {
                problems.push(format!("'{}' must be a string", key));
                String::new()
            },
        }
    };

    let species_shortname = text("species_shortname");
    let species_binomial_name = text("species_binomial_name");
    let population_name = text("population_name");
    let genotype_version_assembly_name = text("genotype_version_assembly_name");
    let genotype_version_annotation_name = text("genotype_version_annotation_name");
    let reference_genome_line_name = text("reference_genome_line_name");
    let gwas_algorithm_name = text("gwas_algorithm_name");
    let imputation_method_name = text("imputation_method_name");
    let kinship_algorithm_name = text("kinship_algorithm_name");
    let population_structure_algorithm_name = text("population_structure_algorithm_name");
    let kinship_filename = text("kinship_filename");
    let population_structure_filename = text("population_structure_filename");

    let species_subspecies = optional_text(raw.get("species_subspecies"));
    let species_variety = optional_text(raw.get("species_variety"));

    let number_of_chromosomes = match raw.get("number_of_chromosomes").and_then(positive_int) {
        Some(n) => n,
        None => {
            problems.push("'number_of_chromosomes' must be a positive integer".to_string());
            0
        },
    };

    let mut cutoff = |key: &str| -> f64 {
        match raw.get(key).and_then(number) {
            Some(n) => n,
            None => {
                problems.push(format!("'{}' must be numeric", key));
                0.0
            },
        }
    };
    let missing_snp_cutoff_value = cutoff("missing_SNP_cutoff_value");
    let missing_line_cutoff_value = cutoff("missing_line_cutoff_value");
    let minor_allele_frequency_cutoff_value = cutoff("minor_allele_frequency_cutoff_value");

    let mut filenames = |key: &str| -> Vec<String> {
        match raw.get(key).and_then(string_or_list) {
            Some(list) => list,
            None => {
                problems.push(format!("'{}' must be a filename or a list of filenames", key));
                Vec::new()
            },
        }
    };
    let phenotype_filenames = filenames("phenotype_filename");
    let gwas_run_filenames = filenames("gwas_run_filename");
    let gwas_results_filenames = filenames("gwas_results_filename");

    let lines_filename = raw
        .get("lines_filename")
        .and_then(optional_text_ref)
        .unwrap_or_else(|| format!("chr1_{}.012.indv", species_shortname));

    let published = raw.get("published").and_then(Value::as_bool);
    let owner = optional_text(raw.get("owner"));

    let growouts = match raw.get("growouts") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match serde_json::from_value::<Vec<GrowoutSpec>>(value.clone()) {
            Ok(list) => list,
            Err(e) => {
                problems.push(format!("'growouts' is not a list of growouts: {}", e));
                Vec::new()
            },
        },
    };

    if !problems.is_empty() {
        return Err(ConfigurationError::InvalidValues(problems).into());
    }

    Ok(Manifest {
        species_shortname,
        species_binomial_name,
        species_subspecies,
        species_variety,
        population_name,
        number_of_chromosomes,
        genotype_version_assembly_name,
        genotype_version_annotation_name,
        reference_genome_line_name,
        gwas_algorithm_name,
        imputation_method_name,
        kinship_algorithm_name,
        population_structure_algorithm_name,
        kinship_filename,
        population_structure_filename,
        gwas_run_filenames,
        gwas_results_filenames,
        phenotype_filenames,
        missing_snp_cutoff_value,
        missing_line_cutoff_value,
        minor_allele_frequency_cutoff_value,
        lines_filename,
        published,
        owner,
        growouts,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value.and_then(optional_text_ref)
}

fn optional_text_ref(value: &Value) -> Option<String> {
    scalar_text(value).filter(|s| !s.is_empty())
}

fn positive_int(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn string_or_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.trim().to_string()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => None,
    }
}
