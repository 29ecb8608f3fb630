//! Error taxonomy for validation and import

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use pgwas_common::CommonError;
use thiserror::Error;

use crate::dataset::FileKind;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Insert-or-skip produced no row and the follow-up lookup found none either
    #[error("Could not resolve {entity} identity for {key}")]
    IdentityResolution { entity: &'static str, key: String },

    #[error("Bulk variant load failed for {}: {source}", path.display())]
    BulkLoad {
        path: PathBuf,
        #[source]
        source: Box<IngestError>,
    },

    /// A unique constraint rejected an insert that has no conflict handling
    #[error("Duplicate {table} row: {key}")]
    Duplicate { table: &'static str, key: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Import cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Invalid column pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl IngestError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn identity(entity: &'static str, key: impl Into<String>) -> Self {
        Self::IdentityResolution {
            entity,
            key: key.into(),
        }
    }

    pub fn bulk_load(path: impl Into<PathBuf>, source: IngestError) -> Self {
        Self::BulkLoad {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Problems with the dataset manifest. Each variant carries every offending key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Manifest is missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("Manifest has empty values for required keys: {}", .0.join(", "))]
    EmptyKeys(Vec<String>),

    #[error("Manifest has invalid values: {}", .0.join("; "))]
    InvalidValues(Vec<String>),

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// Structural rule a file can violate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    ColumnCount,
    Distinct,
    IntConvertible,
    FloatConvertible,
    AllowedValues,
    HeaderName,
    RowCount,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::ColumnCount => "column count",
            Rule::Distinct => "distinct values",
            Rule::IntConvertible => "integer-convertible",
            Rule::FloatConvertible => "float-convertible",
            Rule::AllowedValues => "allowed values",
            Rule::HeaderName => "header name",
            Rule::RowCount => "row count",
        };
        f.write_str(name)
    }
}

/// One failed check within a file
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule: Rule,
    pub column: Option<String>,
    /// Zero-based data row, header excluded
    pub row: Option<usize>,
    pub value: Option<String>,
    pub detail: String,
}

impl Violation {
    pub fn new(rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            column: None,
            row: None,
            value: None,
            detail: detail.into(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.rule)?;
        if let Some(column) = &self.column {
            write!(f, " column '{}'", column)?;
        }
        if let Some(row) = self.row {
            write!(f, " row {}", row)?;
        }
        if let Some(value) = &self.value {
            write!(f, " value '{}'", value)?;
        }
        write!(f, ": {}", self.detail)
    }
}

const MAX_REPORTED_VIOLATIONS: usize = 20;

/// All violations found in one file
#[derive(Error, Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub path: PathBuf,
    pub kind: FileKind,
    pub violations: Vec<Violation>,
}

impl SchemaError {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind, violations: Vec<Violation>) -> Self {
        Self {
            path: path.into(),
            kind,
            violations,
        }
    }

    pub fn has_rule(&self, rule: Rule) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file {} failed validation with {} violation(s)",
            self.kind,
            self.path.display(),
            self.violations.len()
        )?;
        for violation in self.violations.iter().take(MAX_REPORTED_VIOLATIONS) {
            write!(f, "\n  {}", violation)?;
        }
        if self.violations.len() > MAX_REPORTED_VIOLATIONS {
            write!(
                f,
                "\n  ... and {} more",
                self.violations.len() - MAX_REPORTED_VIOLATIONS
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_listed_in_one_message() {
        let err = ConfigurationError::MissingKeys(vec![
            "species_shortname".into(),
            "population_name".into(),
            "kinship_filename".into(),
        ]);
        let message = err.to_string();
        assert!(message.contains("species_shortname"));
        assert!(message.contains("population_name"));
        assert!(message.contains("kinship_filename"));
    }

    #[test]
    fn test_schema_error_names_path_and_rule() {
        let err = SchemaError::new(
            "/data/chr1_maize.012",
            FileKind::Genotype,
            vec![Violation::new(Rule::AllowedValues, "allele call outside {-1, 0, 1, 2}")
                .column("3")
                .row(0)
                .value("3")],
        );
        let message = err.to_string();
        assert!(message.contains("/data/chr1_maize.012"));
        assert!(message.contains("[allowed values] column '3' row 0 value '3'"));
        assert!(err.has_rule(Rule::AllowedValues));
        assert!(!err.has_rule(Rule::Distinct));
    }

    #[test]
    fn test_schema_error_truncates_long_reports() {
        let violations = (0..25)
            .map(|i| Violation::new(Rule::Distinct, "duplicate").row(i))
            .collect();
        let err = SchemaError::new("lines.indv", FileKind::Line, violations);
        assert!(err.to_string().contains("... and 5 more"));
    }

    #[test]
    fn test_bulk_load_wraps_source() {
        let err = IngestError::bulk_load("chr1.012.pos", IngestError::Cancelled);
        assert!(err.to_string().contains("chr1.012.pos"));
        assert!(matches!(err, IngestError::BulkLoad { .. }));
    }
}
