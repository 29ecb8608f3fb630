//! Typed readers for the dataset files
//!
//! Parsers assume the file already passed validation but still report bad
//! cells as [`SchemaError`]s rather than panicking.

use std::path::Path;

use chrono::Datelike;
use pgwas_common::table::{Delimiter, Table};
use pgwas_common::CommonError;

use crate::dataset::FileKind;
use crate::error::{Result, Rule, SchemaError, Violation};
use crate::validation::schema::{is_missing, parse_int_like};

/// Stored value of a missing phenotype measurement
pub const MISSING_VALUE: &str = "NaN";

fn bad_cell(path: &Path, kind: FileKind, rule: Rule, column: &str, row: usize, value: &str) -> SchemaError {
    SchemaError::new(
        path,
        kind,
        vec![Violation::new(rule, "cannot be parsed")
            .column(column)
            .row(row)
            .value(value)],
    )
}

/// Line names, one per line; blank lines skipped
pub fn parse_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| CommonError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Positions (second column) of a `.012.pos` file, in file order
pub fn parse_variant_positions(path: &Path) -> Result<Vec<i64>> {
    let table = Table::read(path, Delimiter::Tab, false)?;
    table
        .column(1)
        .enumerate()
        .map(|(row, cell)| {
            let cell = cell.unwrap_or_default();
            parse_int_like(cell)
                .ok_or_else(|| bad_cell(path, FileKind::Variant, Rule::IntConvertible, "pos", row, cell).into())
        })
        .collect()
}

/// Allele calls of a `.012` matrix, one row per line, index column dropped
pub fn parse_genotypes(path: &Path) -> Result<Vec<Vec<i32>>> {
    let table = Table::read(path, Delimiter::Tab, false)?;
    let mut rows = Vec::with_capacity(table.row_count());
    for (row, cells) in table.rows().iter().enumerate() {
        let mut calls = Vec::with_capacity(cells.len().saturating_sub(1));
        for (column, cell) in cells.iter().enumerate().skip(1) {
            let call = parse_int_like(cell)
                .and_then(|c| i32::try_from(c).ok())
                .ok_or_else(|| {
                    bad_cell(
                        path,
                        FileKind::Genotype,
                        Rule::IntConvertible,
                        &format!("pos_{}", column - 1),
                        row,
                        cell,
                    )
                })?;
            calls.push(call);
        }
        rows.push(calls);
    }
    Ok(rows)
}

/// Phenotype file: one row per measured line, one column per trait
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeMatrix {
    pub traits: Vec<String>,
    /// Line name and one value per trait, missing values as [`MISSING_VALUE`]
    pub rows: Vec<(String, Vec<String>)>,
}

pub fn parse_phenotype_matrix(path: &Path) -> Result<PhenotypeMatrix> {
    let table = Table::read(path, Delimiter::Comma, true)?;
    let traits: Vec<String> = table.headers().iter().skip(1).cloned().collect();

    let rows = table
        .rows()
        .iter()
        .map(|cells| {
            let line = cells.first().cloned().unwrap_or_default();
            let values = (1..=traits.len())
                .map(|i| match cells.get(i) {
                    Some(v) if !is_missing(v) => v.clone(),
                    _ => MISSING_VALUE.to_string(),
                })
                .collect();
            (line, values)
        })
        .collect();

    Ok(PhenotypeMatrix { traits, rows })
}

/// What identifies a GWAS run within a run or result file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GwasRunKey {
    pub trait_name: String,
    pub nsnps: Option<i64>,
    pub nlines: Option<i64>,
}

/// Optional integer cell: absent column or missing value is `None`
fn optional_int(
    table: &Table,
    kind: FileKind,
    row: usize,
    column: Option<usize>,
    name: &str,
) -> Result<Option<i64>> {
    let Some(cell) = column.and_then(|c| table.cell(row, c)) else {
        return Ok(None);
    };
    if is_missing(cell) {
        return Ok(None);
    }
    parse_int_like(cell)
        .map(Some)
        .ok_or_else(|| bad_cell(table.path(), kind, Rule::IntConvertible, name, row, cell).into())
}

fn optional_float(
    table: &Table,
    kind: FileKind,
    row: usize,
    column: Option<usize>,
    name: &str,
) -> Result<Option<f64>> {
    let Some(cell) = column.and_then(|c| table.cell(row, c)) else {
        return Ok(None);
    };
    if is_missing(cell) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| bad_cell(table.path(), kind, Rule::FloatConvertible, name, row, cell).into())
}

fn required_column(table: &Table, kind: FileKind, name: &str) -> Result<usize> {
    table.column_index(name).ok_or_else(|| {
        SchemaError::new(
            table.path(),
            kind,
            vec![Violation::new(Rule::HeaderName, format!("required column '{}' is missing", name))],
        )
        .into()
    })
}

fn run_key(table: &Table, kind: FileKind, row: usize, columns: &RunColumns) -> Result<GwasRunKey> {
    Ok(GwasRunKey {
        trait_name: table.cell(row, columns.trait_name).unwrap_or_default().to_string(),
        nsnps: optional_int(table, kind, row, columns.nsnps, "nSNPs")?,
        nlines: optional_int(table, kind, row, columns.nlines, "nLines")?,
    })
}

struct RunColumns {
    trait_name: usize,
    nsnps: Option<usize>,
    nlines: Option<usize>,
}

impl RunColumns {
    fn locate(table: &Table, kind: FileKind) -> Result<Self> {
        Ok(Self {
            trait_name: required_column(table, kind, "trait")?,
            nsnps: table.column_index("nSNPs"),
            nlines: table.column_index("nLines"),
        })
    }
}

/// Distinct runs of a run (or result) file in first-seen order
pub fn parse_unique_runs(path: &Path) -> Result<Vec<GwasRunKey>> {
    let table = Table::read(path, Delimiter::Comma, true)?;
    let columns = RunColumns::locate(&table, FileKind::GwasRun)?;

    let mut runs: Vec<GwasRunKey> = Vec::new();
    for row in 0..table.row_count() {
        let key = run_key(&table, FileKind::GwasRun, row, &columns)?;
        if !runs.contains(&key) {
            runs.push(key);
        }
    }
    Ok(runs)
}

/// One row of a GWAS result file
#[derive(Debug, Clone, PartialEq)]
pub struct GwasResultRow {
    pub run: GwasRunKey,
    /// Chromosome name as stored, e.g. `chr4`
    pub chromosome: String,
    pub basepair: i64,
    pub pval: Option<f64>,
    pub cofactor: Option<f64>,
    pub order: Option<i64>,
    pub null_pval: Option<f64>,
    pub model_added_pval: Option<f64>,
    pub model: Option<String>,
    pub pcs: Option<Vec<i32>>,
}

/// `4_217880534` -> (`4`, `217880534`)
fn split_snp(snp: &str) -> Option<(&str, &str)> {
    snp.trim().split_once('_')
}

pub fn parse_gwas_results(path: &Path) -> Result<Vec<GwasResultRow>> {
    const KIND: FileKind = FileKind::GwasResult;
    let table = Table::read(path, Delimiter::Comma, true)?;
    let run_columns = RunColumns::locate(&table, KIND)?;

    let snp = table.column_index("SNP");
    let chromosome = table.first_column_of(&["chr", "chrom"]);
    let basepair = table.first_column_of(&["bp", "basepair", "pos"]);
    if basepair.is_none() && snp.is_none() {
        return Err(SchemaError::new(
            path,
            KIND,
            vec![Violation::new(
                Rule::HeaderName,
                "cannot identify a basepair column (bp, basepair, pos or SNP)",
            )],
        )
        .into());
    }
    if chromosome.is_none() && snp.is_none() {
        return Err(SchemaError::new(
            path,
            KIND,
            vec![Violation::new(
                Rule::HeaderName,
                "cannot identify a chromosome column (chr, chrom or SNP)",
            )],
        )
        .into());
    }

    let pval = table.column_index("pval");
    let cofactor = table.column_index("cofactor");
    let order = table.column_index("order");
    let null_pval = table.column_index("nullPval");
    let model_added_pval = table.column_index("modelAddedPval");
    let model = table.column_index("model");
    let pcs = table.column_index("PCs");

    let mut results = Vec::with_capacity(table.row_count());
    for row in 0..table.row_count() {
        let snp_parts = snp.and_then(|c| table.cell(row, c)).and_then(split_snp);

        let chromosome_cell = match chromosome {
            Some(c) => table.cell(row, c).unwrap_or_default(),
            None => snp_parts.map(|(chr, _)| chr).unwrap_or_default(),
        };
        let basepair_cell = match basepair {
            Some(c) => table.cell(row, c).unwrap_or_default(),
            None => snp_parts.map(|(_, pos)| pos).unwrap_or_default(),
        };
        let basepair = parse_int_like(basepair_cell).ok_or_else(|| {
            bad_cell(path, KIND, Rule::IntConvertible, "basepair", row, basepair_cell)
        })?;

        let pcs = match pcs.and_then(|c| table.cell(row, c)) {
            Some(cell) if !is_missing(cell) => Some(
                cell.split(':')
                    .map(|pc| pc.trim().parse::<i32>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| bad_cell(path, KIND, Rule::IntConvertible, "PCs", row, cell))?,
            ),
            _ => None,
        };

        results.push(GwasResultRow {
            run: run_key(&table, KIND, row, &run_columns)?,
            chromosome: format!("chr{}", chromosome_cell.trim()),
            basepair,
            pval: optional_float(&table, KIND, row, pval, "pval")?,
            cofactor: optional_float(&table, KIND, row, cofactor, "cofactor")?,
            order: optional_int(&table, KIND, row, order, "order")?,
            null_pval: optional_float(&table, KIND, row, null_pval, "nullPval")?,
            model_added_pval: optional_float(&table, KIND, row, model_added_pval, "modelAddedPval")?,
            model: model
                .and_then(|c| table.cell(row, c))
                .filter(|m| !is_missing(m))
                .map(str::to_string),
            pcs,
        });
    }
    Ok(results)
}

/// Four-digit year of a location-year code such as `PU09`. Two-digit years
/// after `current_year`'s last two digits belong to the 1900s.
pub fn growout_name_to_year_at(code: &str, current_year: i32) -> Option<i32> {
    let code = code.trim();
    if code.chars().count() < 4 {
        return None;
    }
    let suffix: String = code.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
    if !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = suffix.parse().ok()?;
    if yy > current_year.rem_euclid(100) {
        Some(1900 + yy)
    } else {
        Some(2000 + yy)
    }
}

pub fn growout_name_to_year(code: &str) -> Option<i32> {
    growout_name_to_year_at(code, chrono::Local::now().year())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::test_support::{write, write_dataset};

    #[test]
    fn test_parse_lines_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lines.indv", "B73\n\nMo17 \r\nOh43\n");
        let lines = parse_lines(&dir.path().join("lines.indv")).unwrap();
        assert_eq!(lines, vec!["B73", "Mo17", "Oh43"]);
    }

    #[test]
    fn test_parse_positions_and_genotypes() {
        let dir = write_dataset();
        let positions = parse_variant_positions(&dir.path().join("chr1_maize.012.pos")).unwrap();
        assert_eq!(positions, vec![400, 500, 600]);

        let genotypes = parse_genotypes(&dir.path().join("chr2_maize.012")).unwrap();
        assert_eq!(genotypes, vec![vec![0, 1], vec![2, 2], vec![1, -1]]);
    }

    #[test]
    fn test_phenotype_missing_values_normalised() {
        let dir = write_dataset();
        let matrix = parse_phenotype_matrix(&dir.path().join("phenotypes.csv")).unwrap();
        assert_eq!(matrix.traits, vec!["weight", "height"]);
        assert_eq!(matrix.rows[0], ("B73".to_string(), vec!["1.5".to_string(), "NaN".to_string()]));
        assert_eq!(matrix.rows[2].1[0], "NaN");
        assert_eq!(matrix.rows[1].1[1], "120");
    }

    #[test]
    fn test_unique_runs_first_seen_order() {
        let dir = write_dataset();
        let runs = parse_unique_runs(&dir.path().join("runs.csv")).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].trait_name, "weight");
        assert_eq!(runs[1].trait_name, "height");
        assert_eq!(runs[0].nsnps, Some(5));
    }

    #[test]
    fn test_runs_without_counts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "runs.csv", "trait,pval\nweight,0.1\nweight,0.2\n");
        let runs = parse_unique_runs(&dir.path().join("runs.csv")).unwrap();
        assert_eq!(
            runs,
            vec![GwasRunKey {
                trait_name: "weight".into(),
                nsnps: None,
                nlines: None,
            }]
        );
    }

    #[test]
    fn test_gwas_results_columns() {
        let dir = write_dataset();
        let rows = parse_gwas_results(&dir.path().join("results.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].chromosome, "chr1");
        assert_eq!(rows[0].basepair, 400);
        assert_eq!(rows[0].pval, Some(0.0034));
        assert_eq!(rows[0].pcs, Some(vec![1, 2, 3]));
        assert_eq!(rows[1].pcs, None);
        assert_eq!(rows[1].run.trait_name, "height");
        assert_eq!(rows[1].model, None);
    }

    #[test]
    fn test_gwas_results_position_from_snp_id() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "results.csv",
            "SNP,pval,model,trait,nSNPs,nLines\n4_217880534,0.00000000346,MaxCof,As75,31,229\n",
        );
        let rows = parse_gwas_results(&dir.path().join("results.csv")).unwrap();
        assert_eq!(rows[0].chromosome, "chr4");
        assert_eq!(rows[0].basepair, 217880534);
        assert_eq!(rows[0].model.as_deref(), Some("MaxCof"));
        assert_eq!(rows[0].run.nlines, Some(229));
    }

    #[test]
    fn test_gwas_results_without_position_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "results.csv", "chr,pval,trait\n1,0.1,weight\n");
        let err = parse_gwas_results(&dir.path().join("results.csv")).unwrap_err();
        match err {
            IngestError::Schema(e) => assert!(e.has_rule(Rule::HeaderName)),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_growout_year_pivot() {
        assert_eq!(growout_name_to_year_at("PU09", 2026), Some(2009));
        assert_eq!(growout_name_to_year_at("NY26", 2026), Some(2026));
        assert_eq!(growout_name_to_year_at("NY99", 2026), Some(1999));
        assert_eq!(growout_name_to_year_at(" FL06 ", 2026), Some(2006));
        assert_eq!(growout_name_to_year_at("PU9", 2026), None);
        assert_eq!(growout_name_to_year_at("PUxx", 2026), None);
    }
}
