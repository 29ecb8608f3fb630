//! Column checks over delimited tables
//!
//! Checks return violations instead of failing so that a validator can run all
//! of them over a file and raise a single [`SchemaError`](crate::error::SchemaError).

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Rule, Violation};
use pgwas_common::table::Table;

/// Integer-like cell: an integer literal, an integral float such as `2.0`, or
/// an underscore-joined id such as the `4_217880534` SNP names.
pub fn parse_int_like(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    if let Ok(f) = value.parse::<f64>() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return Some(f as i64);
        }
        return None;
    }
    let digits: String = value.chars().filter(|c| *c != '_').collect();
    if value.contains('_')
        && !value.starts_with('_')
        && !value.ends_with('_')
        && !value.contains("__")
    {
        return digits.parse::<i64>().ok();
    }
    None
}

/// Blank cells and `NA`/`NaN` are missing measurements
pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("na") || value.eq_ignore_ascii_case("nan")
}

/// Float-like cell; missing measurements count as NaN
pub fn parse_float_like(value: &str) -> Option<f64> {
    if is_missing(value) {
        return Some(f64::NAN);
    }
    value.trim().parse::<f64>().ok()
}

/// Rows whose field count differs from `expected`
pub fn check_column_count(table: &Table, expected: usize) -> Vec<Violation> {
    table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| row.len() != expected)
        .map(|(i, row)| {
            Violation::new(
                Rule::ColumnCount,
                format!("expected {} columns, found {}", expected, row.len()),
            )
            .row(i)
        })
        .collect()
}

/// Every repeated value after its first occurrence
pub fn check_distinct(table: &Table, column: usize, name: &str) -> Vec<Violation> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut violations = Vec::new();
    for (i, cell) in table.column(column).enumerate() {
        let Some(cell) = cell else { continue };
        if let Some(first) = seen.insert(cell, i) {
            violations.push(
                Violation::new(Rule::Distinct, format!("duplicate of row {}", first))
                    .column(name)
                    .row(i)
                    .value(cell),
            );
        }
    }
    violations
}

pub fn check_int(table: &Table, column: usize, name: &str) -> Vec<Violation> {
    check_cells(table, column, name, Rule::IntConvertible, |cell| {
        parse_int_like(cell).is_some()
    })
}

pub fn check_float(table: &Table, column: usize, name: &str) -> Vec<Violation> {
    check_cells(table, column, name, Rule::FloatConvertible, |cell| {
        parse_float_like(cell).is_some()
    })
}

/// Integer cells outside `allowed`; non-integers are left to [`check_int`]
pub fn check_allowed_ints(table: &Table, column: usize, name: &str, allowed: &[i64]) -> Vec<Violation> {
    check_cells(table, column, name, Rule::AllowedValues, |cell| {
        parse_int_like(cell).is_none_or(|n| allowed.contains(&n))
    })
}

fn check_cells(
    table: &Table,
    column: usize,
    name: &str,
    rule: Rule,
    accept: impl Fn(&str) -> bool,
) -> Vec<Violation> {
    table
        .column(column)
        .enumerate()
        .filter_map(|(i, cell)| {
            let cell = cell?;
            if accept(cell) {
                None
            } else {
                Some(
                    Violation::new(rule, format!("value is not {}", rule))
                        .column(name)
                        .row(i)
                        .value(cell),
                )
            }
        })
        .collect()
}

/// Type check applied to a column selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCheck {
    Int,
    Float,
}

#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub pattern: Regex,
    pub check: ColumnCheck,
}

/// A declarative `header pattern -> check` table.
///
/// Every rule whose pattern matches a header applies to that column; columns
/// matching no rule pass unchecked.
#[derive(Debug, Clone)]
pub struct ColumnRules {
    rules: Vec<ColumnRule>,
}

/// p-value columns: `pval`, `pvalue`, `nullPval`, ...
const PVALUE_PATTERN: &str = r"(?i)^(null)?pval(ue)?";

impl ColumnRules {
    pub fn new(rules: Vec<ColumnRule>) -> Self {
        Self { rules }
    }

    /// GWAS run files: integer columns are matched by prefix
    pub fn gwas_runs() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            ColumnRule {
                pattern: Regex::new(r"(?i)^(SNP|chr|chrom|pos|nSNPs)")?,
                check: ColumnCheck::Int,
            },
            ColumnRule {
                pattern: Regex::new(PVALUE_PATTERN)?,
                check: ColumnCheck::Float,
            },
        ]))
    }

    /// GWAS result files: integer columns must match the whole header
    pub fn gwas_results() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            ColumnRule {
                pattern: Regex::new(r"(?i)^(SNP|chr|chrom|pos|nSNPs)$")?,
                check: ColumnCheck::Int,
            },
            ColumnRule {
                pattern: Regex::new(PVALUE_PATTERN)?,
                check: ColumnCheck::Float,
            },
        ]))
    }

    pub fn checks_for(&self, header: &str) -> Vec<ColumnCheck> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(header))
            .map(|rule| rule.check)
            .collect()
    }

    /// Apply the rules to every column of a headed table
    pub fn apply(&self, table: &Table) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (index, header) in table.headers().iter().enumerate() {
            for check in self.checks_for(header) {
                violations.extend(match check {
                    ColumnCheck::Int => check_int(table, index, header),
                    ColumnCheck::Float => check_float(table, index, header),
                });
            }
        }
        violations
    }
}
