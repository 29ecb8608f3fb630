//! Per-kind file validators
//!
//! Each validator reads one file, runs every check for its kind and raises a
//! single [`SchemaError`] listing all violations found.

use std::path::{Path, PathBuf};

use pgwas_common::table::{Delimiter, Table};
use regex::Regex;
use tracing::{debug, error};

use super::schema::{
    check_allowed_ints, check_column_count, check_distinct, check_float, check_int, ColumnRules,
};
use crate::dataset::FileKind;
use crate::error::{IngestError, Result, Rule, SchemaError, Violation};

/// Allele calls of a `.012` matrix
pub const ALLELE_CODES: &[i64] = &[-1, 0, 1, 2];

/// Accepted spellings of the line identity column (prefix, case-insensitive)
const IDENTITY_HEADER_PATTERN: &str = r"(?i)^(genotype|pedigree|line|taxa)";

fn finish(path: &Path, kind: FileKind, violations: Vec<Violation>) -> Result<()> {
    if violations.is_empty() {
        debug!(path = %path.display(), kind = %kind, "File passed validation");
        return Ok(());
    }
    error!(
        path = %path.display(),
        kind = %kind,
        violations = violations.len(),
        "Error encountered while validating"
    );
    Err(SchemaError::new(path, kind, violations).into())
}

fn identity_header() -> Result<Regex> {
    Ok(Regex::new(IDENTITY_HEADER_PATTERN)?)
}

/// One column of distinct line names
pub fn validate_lines(path: &Path) -> Result<()> {
    let table = Table::read(path, Delimiter::Comma, false)?;

    let mut violations = check_column_count(&table, 1);
    if violations.is_empty() {
        violations.extend(check_distinct(&table, 0, "line_name"));
    }
    finish(path, FileKind::Line, violations)
}

/// Tab-separated `chr` and `pos`, positions distinct
pub fn validate_variants(path: &Path) -> Result<()> {
    let table = Table::read(path, Delimiter::Tab, false)?;

    let mut violations = check_column_count(&table, 2);
    if violations.is_empty() {
        violations.extend(check_int(&table, 0, "chr"));
        violations.extend(check_int(&table, 1, "pos"));
        violations.extend(check_distinct(&table, 1, "pos"));
    }
    finish(path, FileKind::Variant, violations)
}

/// Companion position file of a genotype matrix (`chr1_maize.012` -> `chr1_maize.012.pos`)
pub fn positions_path(genotype_path: &Path) -> PathBuf {
    let mut name = genotype_path.as_os_str().to_os_string();
    name.push(".pos");
    PathBuf::from(name)
}

/// Genotype matrix: a distinct integer row index followed by one allele call per
/// variant position. The column count comes from the `.pos` companion file;
/// `expected_rows`, when known, is the number of lines in the line list.
pub fn validate_genotypes(path: &Path, expected_rows: Option<usize>) -> Result<()> {
    let pos_path = positions_path(path);
    if !pos_path.is_file() {
        return Err(IngestError::file_not_found(pos_path));
    }
    let positions = Table::read(&pos_path, Delimiter::Tab, false)?.row_count();
    let table = Table::read(path, Delimiter::Tab, false)?;

    let mut violations = check_column_count(&table, positions + 1);
    if let Some(expected) = expected_rows {
        if table.row_count() != expected {
            violations.push(Violation::new(
                Rule::RowCount,
                format!(
                    "expected one row per line ({}), found {}",
                    expected,
                    table.row_count()
                ),
            ));
        }
    }

    violations.extend(check_int(&table, 0, "row_number"));
    violations.extend(check_distinct(&table, 0, "row_number"));
    for column in 1..table.column_count() {
        let name = format!("pos_{}", column - 1);
        violations.extend(check_int(&table, column, &name));
        violations.extend(check_allowed_ints(&table, column, &name, ALLELE_CODES));
    }

    finish(path, FileKind::Genotype, violations)
}

/// Shared shape of phenotype, kinship and population structure matrices:
/// an identity column of line names followed by numeric columns.
fn validate_line_matrix(
    path: &Path,
    kind: FileKind,
    require_identity_header: bool,
    require_distinct: bool,
) -> Result<()> {
    let mut table = Table::read(path, Delimiter::Comma, true)?;
    let mut violations = Vec::new();

    let first = table.headers().first().cloned().unwrap_or_default();
    let header_ok = identity_header()?.is_match(&first) || (!require_identity_header && first.is_empty());
    if !header_ok {
        violations.push(
            Violation::new(
                Rule::HeaderName,
                "first column must be one of genotype, pedigree, line, taxa",
            )
            .column(first.clone())
            .value(first),
        );
    }
    table.rename_column(0, "line_name");

    violations.extend(check_column_count(&table, table.column_count()));
    if require_distinct {
        violations.extend(check_distinct(&table, 0, "line_name"));
    }
    for column in 1..table.column_count() {
        let name = table.headers()[column].clone();
        violations.extend(check_float(&table, column, &name));
    }

    finish(path, kind, violations)
}

/// Line names may repeat: a line can have several measurements
pub fn validate_phenotypes(path: &Path) -> Result<()> {
    validate_line_matrix(path, FileKind::Phenotype, true, false)
}

pub fn validate_kinship(path: &Path) -> Result<()> {
    validate_line_matrix(path, FileKind::Kinship, false, true)
}

pub fn validate_population_structure(path: &Path) -> Result<()> {
    validate_line_matrix(path, FileKind::PopulationStructure, false, true)
}

fn validate_by_rules(path: &Path, kind: FileKind, rules: ColumnRules) -> Result<()> {
    let table = Table::read(path, Delimiter::Comma, true)?;
    let mut violations = check_column_count(&table, table.column_count());
    violations.extend(rules.apply(&table));
    finish(path, kind, violations)
}

pub fn validate_gwas_runs(path: &Path) -> Result<()> {
    validate_by_rules(path, FileKind::GwasRun, ColumnRules::gwas_runs()?)
}

pub fn validate_gwas_results(path: &Path) -> Result<()> {
    validate_by_rules(path, FileKind::GwasResult, ColumnRules::gwas_results()?)
}
