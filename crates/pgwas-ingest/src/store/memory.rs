//! In-process identity store
//!
//! Mirrors the unique constraints of the PostgreSQL schema so conflict
//! suppression, lookups and duplicate variant rejection behave the same way.
//! Used for `--dry-run` imports and throughout the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::{EntityTable, IdentityQuery, IdentityStore, InsertStatement, SqlValue};
use crate::error::{IngestError, Result};
use crate::models::{Entity, Id, Variant};

/// Columns of each table's unique constraint
fn natural_key(table: EntityTable) -> &'static [&'static str] {
    match table {
        EntityTable::Species => &["shortname", "binomial", "subspecies", "variety"],
        EntityTable::Population => &["population_name", "population_species"],
        EntityTable::Chromosome => &["chromosome_name", "chromosome_species"],
        EntityTable::Line => &["line_name", "line_population"],
        EntityTable::GenotypeVersion => &[
            "genotype_version_assembly_name",
            "genotype_version_annotation_name",
            "reference_genome",
            "genotype_version_population",
        ],
        EntityTable::Genotype => &[
            "genotype_line",
            "genotype_chromosome",
            "genotype_genotype_version",
        ],
        EntityTable::Variant => &["variant_species", "variant_chromosome", "variant_pos"],
        EntityTable::Trait => &["trait_name"],
        EntityTable::Phenotype => &["phenotype_line", "phenotype_trait", "phenotype_value"],
        EntityTable::KinshipAlgorithm => &["kinship_algorithm"],
        EntityTable::PopulationStructureAlgorithm => &["population_structure_algorithm"],
        EntityTable::GwasAlgorithm => &["gwas_algorithm"],
        EntityTable::ImputationMethod => &["imputation_method"],
        EntityTable::Kinship => &["kinship_algorithm", "kinship_file_path"],
        EntityTable::PopulationStructure => &[
            "population_structure_algorithm",
            "population_structure_file_path",
        ],
        EntityTable::GwasRun => &[
            "gwas_run_trait",
            "nsnps",
            "nlines",
            "gwas_run_gwas_algorithm",
            "gwas_run_genotype_version",
            "missing_snp_cutoff_value",
            "missing_line_cutoff_value",
            "minor_allele_frequency_cutoff_value",
            "gwas_run_imputation_method",
            "gwas_run_kinship",
            "gwas_run_population_structure",
        ],
        EntityTable::GwasResult => &[],
        EntityTable::Location => &["code"],
        EntityTable::GrowoutType => &["growout_type"],
        EntityTable::Growout => &["growout_name"],
    }
}

/// Unique index on `lower(phenotype_value)`
fn folds_case(table: EntityTable, column: &str) -> bool {
    table == EntityTable::Phenotype && column == "phenotype_value"
}

static NULL: SqlValue = SqlValue::Null;

#[derive(Debug, Clone)]
struct Row {
    id: Id,
    values: Vec<(&'static str, SqlValue)>,
}

impl Row {
    fn get(&self, column: &str) -> &SqlValue {
        self.values
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
            .unwrap_or(&NULL)
    }
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<EntityTable, Vec<Row>>,
    next_id: HashMap<EntityTable, Id>,
}

impl Tables {
    fn find(&self, query: &IdentityQuery) -> Option<Id> {
        self.rows.get(&query.table).and_then(|rows| {
            rows.iter()
                .find(|row| query.key.iter().all(|k| k.matches(row.get(k.column))))
                .map(|row| row.id)
        })
    }

    /// Id of an existing row sharing `insert`'s natural key. NULLs compare equal,
    /// matching `NULLS NOT DISTINCT`.
    fn conflict(&self, insert: &InsertStatement) -> Option<Id> {
        let key = natural_key(insert.table);
        if key.is_empty() {
            return None;
        }
        let candidate = Row {
            id: 0,
            values: insert.columns.clone(),
        };
        self.rows.get(&insert.table).and_then(|rows| {
            rows.iter()
                .find(|row| {
                    key.iter().all(|column| {
                        match (row.get(column), candidate.get(column)) {
                            (SqlValue::Text(a), SqlValue::Text(b))
                                if folds_case(insert.table, column) =>
                            {
                                a.to_lowercase() == b.to_lowercase()
                            },
                            (a, b) => a == b,
                        }
                    })
                })
                .map(|row| row.id)
        })
    }

    fn push(&mut self, insert: &InsertStatement) -> Id {
        let next = self.next_id.entry(insert.table).or_insert(1);
        let id = *next;
        *next += 1;
        self.rows.entry(insert.table).or_default().push(Row {
            id,
            values: insert.columns.clone(),
        });
        id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn row_count(&self, table: EntityTable) -> usize {
        self.tables().rows.get(&table).map_or(0, Vec::len)
    }

    /// Value of `column` in the row with `id`
    pub fn value(&self, table: EntityTable, id: Id, column: &str) -> Option<SqlValue> {
        self.tables()
            .rows
            .get(&table)
            .and_then(|rows| rows.iter().find(|row| row.id == id))
            .map(|row| row.get(column).clone())
    }

    /// Stored variant positions for a species and chromosome, ascending
    pub fn variant_positions(&self, species: Id, chromosome: Id) -> Vec<i64> {
        let tables = self.tables();
        let mut positions: Vec<i64> = tables
            .rows
            .get(&EntityTable::Variant)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.get("variant_species") == &SqlValue::Int(species)
                            && row.get("variant_chromosome") == &SqlValue::Int(chromosome)
                    })
                    .filter_map(|row| match row.get("variant_pos") {
                        SqlValue::Int(pos) => Some(*pos),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        positions.sort_unstable();
        positions
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_id(&self, query: &IdentityQuery) -> Result<Option<Id>> {
        Ok(self.tables().find(query))
    }

    async fn insert_ignoring_conflict(&self, insert: &InsertStatement) -> Result<Option<Id>> {
        let mut tables = self.tables();
        if tables.conflict(insert).is_some() {
            debug!(table = %insert.table, params = %insert.params(), "Insert suppressed by conflict");
            return Ok(None);
        }
        Ok(Some(tables.push(insert)))
    }

    async fn insert(&self, insert: &InsertStatement) -> Result<Id> {
        let mut tables = self.tables();
        if tables.conflict(insert).is_some() {
            return Err(IngestError::Duplicate {
                table: insert.table.name(),
                key: insert.params(),
            });
        }
        Ok(tables.push(insert))
    }

    /// All-or-nothing like a single COPY
    async fn append_variants(&self, variants: &[Variant]) -> Result<u64> {
        let mut tables = self.tables();
        let mut seen = HashSet::with_capacity(variants.len());
        for variant in variants {
            let insert = variant.insert();
            if !seen.insert(*variant) || tables.conflict(&insert).is_some() {
                return Err(IngestError::Duplicate {
                    table: EntityTable::Variant.name(),
                    key: insert.params(),
                });
            }
        }
        for variant in variants {
            tables.push(&variant.insert());
        }
        Ok(variants.len() as u64)
    }

    async fn truncate_all(&self) -> Result<()> {
        let mut tables = self.tables();
        tables.rows.clear();
        tables.next_id.clear();
        Ok(())
    }
}
