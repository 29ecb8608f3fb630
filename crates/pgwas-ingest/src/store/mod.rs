//! Identity stores
//!
//! The resolver talks to the database only through [`IdentityStore`]: look up
//! an id by natural key, insert while ignoring natural-key conflicts, insert
//! unconditionally, and bulk-append variants. [`PgStore`] is the PostgreSQL
//! implementation; [`MemoryStore`] keeps the same tables in process for dry
//! runs and tests.
//!
//! Statements are described as data ([`IdentityQuery`], [`InsertStatement`])
//! rather than SQL strings so both stores can honour them.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Id, Variant};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Tables of the relational schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityTable {
    Species,
    Population,
    Chromosome,
    Line,
    GenotypeVersion,
    Genotype,
    Variant,
    Trait,
    Phenotype,
    KinshipAlgorithm,
    PopulationStructureAlgorithm,
    GwasAlgorithm,
    ImputationMethod,
    Kinship,
    PopulationStructure,
    GwasRun,
    GwasResult,
    Location,
    GrowoutType,
    Growout,
}

impl EntityTable {
    pub const ALL: [EntityTable; 20] = [
        EntityTable::Species,
        EntityTable::Population,
        EntityTable::Chromosome,
        EntityTable::Line,
        EntityTable::GenotypeVersion,
        EntityTable::Genotype,
        EntityTable::Variant,
        EntityTable::Trait,
        EntityTable::Phenotype,
        EntityTable::KinshipAlgorithm,
        EntityTable::PopulationStructureAlgorithm,
        EntityTable::GwasAlgorithm,
        EntityTable::ImputationMethod,
        EntityTable::Kinship,
        EntityTable::PopulationStructure,
        EntityTable::GwasRun,
        EntityTable::GwasResult,
        EntityTable::Location,
        EntityTable::GrowoutType,
        EntityTable::Growout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityTable::Species => "species",
            EntityTable::Population => "population",
            EntityTable::Chromosome => "chromosome",
            EntityTable::Line => "line",
            EntityTable::GenotypeVersion => "genotype_version",
            EntityTable::Genotype => "genotype",
            EntityTable::Variant => "variant",
            EntityTable::Trait => "trait",
            EntityTable::Phenotype => "phenotype",
            EntityTable::KinshipAlgorithm => "kinship_algorithm",
            EntityTable::PopulationStructureAlgorithm => "population_structure_algorithm",
            EntityTable::GwasAlgorithm => "gwas_algorithm",
            EntityTable::ImputationMethod => "imputation_method",
            EntityTable::Kinship => "kinship",
            EntityTable::PopulationStructure => "population_structure",
            EntityTable::GwasRun => "gwas_run",
            EntityTable::GwasResult => "gwas_result",
            EntityTable::Location => "location",
            EntityTable::GrowoutType => "growout_type",
            EntityTable::Growout => "growout",
        }
    }

    /// Serial identity column, `<table>_id`
    pub fn id_column(self) -> String {
        format!("{}_id", self.name())
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntArray(Vec<i32>),
    Null,
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::text)
    }

    pub fn opt_int(value: Option<i64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Int)
    }

    pub fn opt_float(value: Option<f64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Float)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::IntArray(v) => {
                let items: Vec<String> = v.iter().map(i32::to_string).collect();
                write!(f, "{{{}}}", items.join(","))
            },
            SqlValue::Null => f.write_str("NULL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    /// Compare `LOWER(column)` with `LOWER(value)`
    CaseInsensitive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyColumn {
    pub column: &'static str,
    pub value: SqlValue,
    pub mode: MatchMode,
}

impl KeyColumn {
    /// Whether a stored value satisfies this key column. `Null` only matches `Null`.
    pub fn matches(&self, stored: &SqlValue) -> bool {
        match (&self.value, stored, self.mode) {
            (SqlValue::Null, stored, _) => stored.is_null(),
            (SqlValue::Text(a), SqlValue::Text(b), MatchMode::CaseInsensitive) => {
                a.to_lowercase() == b.to_lowercase()
            },
            (wanted, stored, _) => wanted == stored,
        }
    }
}

/// `SELECT <id> FROM <table> WHERE <key columns> LIMIT 1`
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityQuery {
    pub table: EntityTable,
    pub key: Vec<KeyColumn>,
}

impl IdentityQuery {
    pub fn new(table: EntityTable) -> Self {
        Self {
            table,
            key: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &'static str, value: SqlValue) -> Self {
        self.key.push(KeyColumn {
            column,
            value,
            mode: MatchMode::Exact,
        });
        self
    }

    pub fn eq_ignore_case(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.key.push(KeyColumn {
            column,
            value: SqlValue::Text(value.into()),
            mode: MatchMode::CaseInsensitive,
        });
        self
    }

    /// Natural key as a hashable value; case-insensitive text is folded
    pub fn cache_key(&self) -> IdentityKey {
        let parts = self
            .key
            .iter()
            .map(|k| {
                let part = match (&k.value, k.mode) {
                    (SqlValue::Text(t), MatchMode::CaseInsensitive) => KeyPart::Text(t.to_lowercase()),
                    (SqlValue::Text(t), MatchMode::Exact) => KeyPart::Text(t.clone()),
                    (SqlValue::Int(v), _) => KeyPart::Int(*v),
                    (SqlValue::Float(v), _) => KeyPart::Float(v.to_bits()),
                    (SqlValue::IntArray(v), _) => KeyPart::IntArray(v.clone()),
                    (SqlValue::Null, _) => KeyPart::Null,
                };
                (k.column, part)
            })
            .collect();
        IdentityKey {
            table: self.table,
            parts,
        }
    }
}

impl fmt::Display for IdentityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .key
            .iter()
            .map(|k| match (k.mode, &k.value) {
                (MatchMode::CaseInsensitive, SqlValue::Text(t)) => {
                    format!("lower({})='{}'", k.column, t.to_lowercase())
                },
                _ => format!("{}={}", k.column, k.value),
            })
            .collect();
        write!(f, "{}({})", self.table, parts.join(", "))
    }
}

/// Key column value in hashable form, floats compared by bit pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Int(i64),
    Float(u64),
    Text(String),
    IntArray(Vec<i32>),
    Null,
}

/// Identity cache key: table plus typed key column values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    table: EntityTable,
    parts: Vec<(&'static str, KeyPart)>,
}

/// `INSERT INTO <table> (<columns>) VALUES (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: EntityTable,
    pub columns: Vec<(&'static str, SqlValue)>,
}

impl InsertStatement {
    pub fn new(table: EntityTable) -> Self {
        Self {
            table,
            columns: Vec::new(),
        }
    }

    pub fn value(mut self, column: &'static str, value: SqlValue) -> Self {
        self.columns.push((column, value));
        self
    }

    /// Statement shape without values, e.g. `INSERT INTO trait (trait_name)`
    pub fn shape(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|(c, _)| *c).collect();
        format!("INSERT INTO {} ({})", self.table, names.join(", "))
    }

    pub fn params(&self) -> String {
        let values: Vec<String> = self.columns.iter().map(|(_, v)| v.to_string()).collect();
        values.join(", ")
    }
}

/// Database capability used by the resolver and the bulk loader
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Id of the row matching `query`, if any
    async fn find_id(&self, query: &IdentityQuery) -> Result<Option<Id>>;

    /// Insert unless a row with the same natural key exists; `None` when the
    /// insert was suppressed by a conflict
    async fn insert_ignoring_conflict(&self, insert: &InsertStatement) -> Result<Option<Id>>;

    /// Plain insert for rows without a natural key
    async fn insert(&self, insert: &InsertStatement) -> Result<Id>;

    /// Append variants in one bulk operation without conflict detection
    async fn append_variants(&self, variants: &[Variant]) -> Result<u64>;

    /// Remove every imported row
    async fn truncate_all(&self) -> Result<()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_null_key_matches_only_null() {
        let key = KeyColumn {
            column: "nsnps",
            value: SqlValue::Null,
            mode: MatchMode::Exact,
        };
        assert!(key.matches(&SqlValue::Null));
        assert!(!key.matches(&SqlValue::Int(5)));
    }

    #[test]
    fn test_case_insensitive_key() {
        let query = IdentityQuery::new(EntityTable::Phenotype).eq_ignore_case("phenotype_value", "nan");
        assert!(query.key[0].matches(&SqlValue::text("NaN")));
        assert!(!query.key[0].matches(&SqlValue::text("1.5")));
    }

    #[test]
    fn test_cache_key_folds_case() {
        let a = IdentityQuery::new(EntityTable::Phenotype)
            .eq("phenotype_line", SqlValue::Int(1))
            .eq_ignore_case("phenotype_value", "NaN");
        let b = IdentityQuery::new(EntityTable::Phenotype)
            .eq("phenotype_line", SqlValue::Int(1))
            .eq_ignore_case("phenotype_value", "nan");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_keeps_quoted_text_apart() {
        let joined = IdentityQuery::new(EntityTable::Location)
            .eq("country", SqlValue::text("US', state='IA"))
            .eq("state", SqlValue::text("MN"));
        let split = IdentityQuery::new(EntityTable::Location)
            .eq("country", SqlValue::text("US"))
            .eq("state", SqlValue::text("IA', state='MN"));
        assert_eq!(joined.to_string(), "location(country='US', state='IA', state='MN')");
        assert_eq!(joined.to_string(), split.to_string());
        assert_ne!(joined.cache_key(), split.cache_key());
    }

    #[test]
    fn test_cache_key_separates_null_from_text() {
        let null = IdentityQuery::new(EntityTable::Species).eq("subspecies", SqlValue::Null);
        let text = IdentityQuery::new(EntityTable::Species).eq("subspecies", SqlValue::text("NULL"));
        assert_ne!(null.cache_key(), text.cache_key());
    }

    #[test]
    fn test_insert_shape_and_params() {
        let insert = InsertStatement::new(EntityTable::Trait)
            .value("trait_name", SqlValue::text("weight"));
        assert_eq!(insert.shape(), "INSERT INTO trait (trait_name)");
        assert_eq!(insert.params(), "'weight'");
    }

    #[test]
    fn test_id_column() {
        assert_eq!(EntityTable::GwasRun.id_column(), "gwas_run_id");
        assert_eq!(EntityTable::Line.id_column(), "line_id");
    }
}
