//! Typed entity records
//!
//! One struct per table. [`Entity`] maps a record onto the natural-key lookup
//! and the insert statement the resolver runs for it.

use crate::store::{EntityTable, IdentityQuery, InsertStatement, SqlValue};

/// Database serial id
pub type Id = i64;

/// A record with a natural key
pub trait Entity {
    const TABLE: EntityTable;

    /// Lookup of an existing row with the same natural key
    fn identity(&self) -> IdentityQuery;

    /// Insert of this record
    fn insert(&self) -> InsertStatement;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub shortname: String,
    pub binomial: String,
    pub subspecies: Option<String>,
    pub variety: Option<String>,
}

impl Entity for Species {
    const TABLE: EntityTable = EntityTable::Species;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("shortname", SqlValue::text(&self.shortname))
            .eq("binomial", SqlValue::text(&self.binomial))
            .eq("subspecies", SqlValue::opt_text(self.subspecies.as_deref()))
            .eq("variety", SqlValue::opt_text(self.variety.as_deref()))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("shortname", SqlValue::text(&self.shortname))
            .value("binomial", SqlValue::text(&self.binomial))
            .value("subspecies", SqlValue::opt_text(self.subspecies.as_deref()))
            .value("variety", SqlValue::opt_text(self.variety.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub name: String,
    pub species: Id,
}

impl Entity for Population {
    const TABLE: EntityTable = EntityTable::Population;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("population_name", SqlValue::text(&self.name))
            .eq("population_species", SqlValue::Int(self.species))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("population_name", SqlValue::text(&self.name))
            .value("population_species", SqlValue::Int(self.species))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    pub name: String,
    pub species: Id,
}

impl Entity for Chromosome {
    const TABLE: EntityTable = EntityTable::Chromosome;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("chromosome_name", SqlValue::text(&self.name))
            .eq("chromosome_species", SqlValue::Int(self.species))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("chromosome_name", SqlValue::text(&self.name))
            .value("chromosome_species", SqlValue::Int(self.species))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub name: String,
    pub population: Id,
}

impl Entity for Line {
    const TABLE: EntityTable = EntityTable::Line;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("line_name", SqlValue::text(&self.name))
            .eq("line_population", SqlValue::Int(self.population))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("line_name", SqlValue::text(&self.name))
            .value("line_population", SqlValue::Int(self.population))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeVersion {
    pub assembly_name: String,
    pub annotation_name: String,
    /// Line id of the reference genome
    pub reference_genome: Id,
    pub population: Id,
}

impl Entity for GenotypeVersion {
    const TABLE: EntityTable = EntityTable::GenotypeVersion;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("genotype_version_assembly_name", SqlValue::text(&self.assembly_name))
            .eq("genotype_version_annotation_name", SqlValue::text(&self.annotation_name))
            .eq("reference_genome", SqlValue::Int(self.reference_genome))
            .eq("genotype_version_population", SqlValue::Int(self.population))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("genotype_version_assembly_name", SqlValue::text(&self.assembly_name))
            .value("genotype_version_annotation_name", SqlValue::text(&self.annotation_name))
            .value("reference_genome", SqlValue::Int(self.reference_genome))
            .value("genotype_version_population", SqlValue::Int(self.population))
    }
}

/// Allele calls of one line on one chromosome
#[derive(Debug, Clone, PartialEq)]
pub struct Genotype {
    pub line: Id,
    pub chromosome: Id,
    pub calls: Vec<i32>,
    pub genotype_version: Id,
}

impl Entity for Genotype {
    const TABLE: EntityTable = EntityTable::Genotype;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("genotype_line", SqlValue::Int(self.line))
            .eq("genotype_chromosome", SqlValue::Int(self.chromosome))
            .eq("genotype_genotype_version", SqlValue::Int(self.genotype_version))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("genotype_line", SqlValue::Int(self.line))
            .value("genotype_chromosome", SqlValue::Int(self.chromosome))
            .value("genotype", SqlValue::IntArray(self.calls.clone()))
            .value("genotype_genotype_version", SqlValue::Int(self.genotype_version))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    pub species: Id,
    pub chromosome: Id,
    pub position: i64,
}

impl Entity for Variant {
    const TABLE: EntityTable = EntityTable::Variant;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("variant_species", SqlValue::Int(self.species))
            .eq("variant_chromosome", SqlValue::Int(self.chromosome))
            .eq("variant_pos", SqlValue::Int(self.position))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("variant_species", SqlValue::Int(self.species))
            .value("variant_chromosome", SqlValue::Int(self.chromosome))
            .value("variant_pos", SqlValue::Int(self.position))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
    pub name: String,
}

impl Entity for Trait {
    const TABLE: EntityTable = EntityTable::Trait;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE).eq("trait_name", SqlValue::text(&self.name))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE).value("trait_name", SqlValue::text(&self.name))
    }
}

/// One measurement; the value is kept as text and compared case-insensitively
#[derive(Debug, Clone, PartialEq)]
pub struct Phenotype {
    pub line: Id,
    pub trait_id: Id,
    pub value: String,
}

impl Entity for Phenotype {
    const TABLE: EntityTable = EntityTable::Phenotype;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("phenotype_line", SqlValue::Int(self.line))
            .eq("phenotype_trait", SqlValue::Int(self.trait_id))
            .eq_ignore_case("phenotype_value", &self.value)
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("phenotype_line", SqlValue::Int(self.line))
            .value("phenotype_trait", SqlValue::Int(self.trait_id))
            .value("phenotype_value", SqlValue::text(&self.value))
    }
}

/// Name-only lookup tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    KinshipAlgorithm,
    PopulationStructureAlgorithm,
    GwasAlgorithm,
    ImputationMethod,
    GrowoutType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub kind: LookupKind,
    pub name: String,
}

impl Lookup {
    pub fn new(kind: LookupKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    fn table(&self) -> EntityTable {
        match self.kind {
            LookupKind::KinshipAlgorithm => EntityTable::KinshipAlgorithm,
            LookupKind::PopulationStructureAlgorithm => EntityTable::PopulationStructureAlgorithm,
            LookupKind::GwasAlgorithm => EntityTable::GwasAlgorithm,
            LookupKind::ImputationMethod => EntityTable::ImputationMethod,
            LookupKind::GrowoutType => EntityTable::GrowoutType,
        }
    }

    /// The name column carries the table's own name
    fn column(&self) -> &'static str {
        self.table().name()
    }

    pub fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(self.table()).eq(self.column(), SqlValue::text(&self.name))
    }

    pub fn insert(&self) -> InsertStatement {
        InsertStatement::new(self.table()).value(self.column(), SqlValue::text(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kinship {
    pub algorithm: Id,
    pub file_path: String,
}

impl Entity for Kinship {
    const TABLE: EntityTable = EntityTable::Kinship;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("kinship_algorithm", SqlValue::Int(self.algorithm))
            .eq("kinship_file_path", SqlValue::text(&self.file_path))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("kinship_algorithm", SqlValue::Int(self.algorithm))
            .value("kinship_file_path", SqlValue::text(&self.file_path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationStructure {
    pub algorithm: Id,
    pub file_path: String,
}

impl Entity for PopulationStructure {
    const TABLE: EntityTable = EntityTable::PopulationStructure;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE)
            .eq("population_structure_algorithm", SqlValue::Int(self.algorithm))
            .eq("population_structure_file_path", SqlValue::text(&self.file_path))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("population_structure_algorithm", SqlValue::Int(self.algorithm))
            .value("population_structure_file_path", SqlValue::text(&self.file_path))
    }
}

/// Every column is part of the identity: runs differing in any field are distinct
#[derive(Debug, Clone, PartialEq)]
pub struct GwasRun {
    pub trait_id: Id,
    pub nsnps: Option<i64>,
    pub nlines: Option<i64>,
    pub gwas_algorithm: Id,
    pub genotype_version: Id,
    pub missing_snp_cutoff_value: f64,
    pub missing_line_cutoff_value: f64,
    pub minor_allele_frequency_cutoff_value: f64,
    pub imputation_method: Id,
    pub kinship: Id,
    pub population_structure: Id,
}

impl GwasRun {
    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("gwas_run_trait", SqlValue::Int(self.trait_id)),
            ("nsnps", SqlValue::opt_int(self.nsnps)),
            ("nlines", SqlValue::opt_int(self.nlines)),
            ("gwas_run_gwas_algorithm", SqlValue::Int(self.gwas_algorithm)),
            ("gwas_run_genotype_version", SqlValue::Int(self.genotype_version)),
            ("missing_snp_cutoff_value", SqlValue::Float(self.missing_snp_cutoff_value)),
            ("missing_line_cutoff_value", SqlValue::Float(self.missing_line_cutoff_value)),
            (
                "minor_allele_frequency_cutoff_value",
                SqlValue::Float(self.minor_allele_frequency_cutoff_value),
            ),
            ("gwas_run_imputation_method", SqlValue::Int(self.imputation_method)),
            ("gwas_run_kinship", SqlValue::Int(self.kinship)),
            ("gwas_run_population_structure", SqlValue::Int(self.population_structure)),
        ]
    }
}

impl Entity for GwasRun {
    const TABLE: EntityTable = EntityTable::GwasRun;

    fn identity(&self) -> IdentityQuery {
        self.columns()
            .into_iter()
            .fold(IdentityQuery::new(Self::TABLE), |q, (column, value)| q.eq(column, value))
    }

    fn insert(&self) -> InsertStatement {
        self.columns()
            .into_iter()
            .fold(InsertStatement::new(Self::TABLE), |s, (column, value)| s.value(column, value))
    }
}

/// One association result; has no natural key and is always inserted
#[derive(Debug, Clone, PartialEq)]
pub struct GwasResult {
    pub chromosome: Id,
    pub basepair: i64,
    pub gwas_run: Id,
    pub pval: Option<f64>,
    pub cofactor: Option<f64>,
    pub order: Option<i64>,
    pub null_pval: Option<f64>,
    pub model_added_pval: Option<f64>,
    pub model: Option<String>,
    pub pcs: Option<Vec<i32>>,
}

impl GwasResult {
    pub fn insert(&self) -> InsertStatement {
        InsertStatement::new(EntityTable::GwasResult)
            .value("gwas_result_chromosome", SqlValue::Int(self.chromosome))
            .value("basepair", SqlValue::Int(self.basepair))
            .value("gwas_result_gwas_run", SqlValue::Int(self.gwas_run))
            .value("pval", SqlValue::opt_float(self.pval))
            .value("cofactor", SqlValue::opt_float(self.cofactor))
            .value("_order", SqlValue::opt_int(self.order))
            .value("null_pval", SqlValue::opt_float(self.null_pval))
            .value("model_added_pval", SqlValue::opt_float(self.model_added_pval))
            .value("model", SqlValue::opt_text(self.model.as_deref()))
            .value(
                "pcs",
                self.pcs.clone().map_or(SqlValue::Null, SqlValue::IntArray),
            )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub code: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl Entity for Location {
    const TABLE: EntityTable = EntityTable::Location;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE).eq("code", SqlValue::text(&self.code))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("country", SqlValue::opt_text(self.country.as_deref()))
            .value("state", SqlValue::opt_text(self.state.as_deref()))
            .value("city", SqlValue::opt_text(self.city.as_deref()))
            .value("code", SqlValue::text(&self.code))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Growout {
    pub name: String,
    pub population: Id,
    pub location: Id,
    pub year: Option<i32>,
    pub growout_type: Id,
}

impl Entity for Growout {
    const TABLE: EntityTable = EntityTable::Growout;

    fn identity(&self) -> IdentityQuery {
        IdentityQuery::new(Self::TABLE).eq("growout_name", SqlValue::text(&self.name))
    }

    fn insert(&self) -> InsertStatement {
        InsertStatement::new(Self::TABLE)
            .value("growout_name", SqlValue::text(&self.name))
            .value("growout_population", SqlValue::Int(self.population))
            .value("growout_location", SqlValue::Int(self.location))
            .value("year", SqlValue::opt_int(self.year.map(i64::from)))
            .value("growout_growout_type", SqlValue::Int(self.growout_type))
    }
}
