//! File loaders
//!
//! Each loader parses one file and resolves its records through the
//! [`Resolver`] one at a time, in file order. The first failing record aborts
//! the file; rows resolved before it stay committed.

use std::path::Path;

use tracing::{debug, info};

use crate::dataset::FileKind;
use crate::error::{IngestError, Result, Rule, SchemaError, Violation};
use crate::models::{Genotype, GwasResult, GwasRun, Id, Phenotype};
use crate::parsers::{self, GwasRunKey};
use crate::progress::create_progress_bar;
use crate::resolver::Resolver;

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::file_not_found(path))
    }
}

/// Identities shared by every run of one dataset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParameters {
    pub gwas_algorithm: Id,
    pub genotype_version: Id,
    pub missing_snp_cutoff_value: f64,
    pub missing_line_cutoff_value: f64,
    pub minor_allele_frequency_cutoff_value: f64,
    pub imputation_method: Id,
    pub kinship: Id,
    pub population_structure: Id,
}

impl RunParameters {
    pub fn run(&self, trait_id: Id, key: &GwasRunKey) -> GwasRun {
        GwasRun {
            trait_id,
            nsnps: key.nsnps,
            nlines: key.nlines,
            gwas_algorithm: self.gwas_algorithm,
            genotype_version: self.genotype_version,
            missing_snp_cutoff_value: self.missing_snp_cutoff_value,
            missing_line_cutoff_value: self.missing_line_cutoff_value,
            minor_allele_frequency_cutoff_value: self.minor_allele_frequency_cutoff_value,
            imputation_method: self.imputation_method,
            kinship: self.kinship,
            population_structure: self.population_structure,
        }
    }
}

/// Lines of a line list, in file order
pub async fn lines_from_file(resolver: &Resolver, path: &Path, population: Id) -> Result<Vec<(String, Id)>> {
    require_file(path)?;
    let names = parsers::parse_lines(path)?;
    let pb = create_progress_bar(names.len() as u64, "Lines", resolver.options().show_progress);

    let mut lines = Vec::with_capacity(names.len());
    for name in names {
        let id = resolver.line(&name, population).await?;
        lines.push((name, id));
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(path = %path.display(), lines = lines.len(), "Resolved lines");
    Ok(lines)
}

/// Traits named by a phenotype file's header
pub async fn traits_from_phenotype_file(resolver: &Resolver, path: &Path) -> Result<Vec<(String, Id)>> {
    require_file(path)?;
    let matrix = parsers::parse_phenotype_matrix(path)?;

    let mut traits = Vec::with_capacity(matrix.traits.len());
    for name in matrix.traits {
        let id = resolver.trait_(&name).await?;
        traits.push((name, id));
    }
    info!(path = %path.display(), traits = traits.len(), "Resolved traits");
    Ok(traits)
}

/// Phenotype measurements; lines missing from the line list are created
pub async fn phenotypes_from_file(resolver: &Resolver, path: &Path, population: Id) -> Result<Vec<Id>> {
    require_file(path)?;
    let matrix = parsers::parse_phenotype_matrix(path)?;

    let mut trait_ids = Vec::with_capacity(matrix.traits.len());
    for name in &matrix.traits {
        trait_ids.push(resolver.trait_(name).await?);
    }

    let pb = create_progress_bar(
        (matrix.rows.len() * trait_ids.len()) as u64,
        "Phenotypes",
        resolver.options().show_progress,
    );
    let mut ids = Vec::new();
    for (line_name, values) in &matrix.rows {
        let line = resolver.line(line_name, population).await?;
        for (trait_id, value) in trait_ids.iter().zip(values) {
            let phenotype = Phenotype {
                line,
                trait_id: *trait_id,
                value: value.clone(),
            };
            ids.push(resolver.phenotype(&phenotype).await?);
            pb.inc(1);
        }
    }
    pb.finish_and_clear();

    info!(path = %path.display(), phenotypes = ids.len(), "Resolved phenotypes");
    Ok(ids)
}

/// Genotype rows of one chromosome, paired in order with `line_ids`
pub async fn genotypes_from_file(
    resolver: &Resolver,
    path: &Path,
    line_ids: &[Id],
    chromosome: Id,
    genotype_version: Id,
) -> Result<Vec<Id>> {
    require_file(path)?;
    let rows = parsers::parse_genotypes(path)?;
    if rows.len() != line_ids.len() {
        return Err(SchemaError::new(
            path,
            FileKind::Genotype,
            vec![Violation::new(
                Rule::RowCount,
                format!(
                    "expected one row per line ({}), found {}",
                    line_ids.len(),
                    rows.len()
                ),
            )],
        )
        .into());
    }

    let pb = create_progress_bar(rows.len() as u64, "Genotypes", resolver.options().show_progress);
    let mut ids = Vec::with_capacity(rows.len());
    for (line, calls) in line_ids.iter().zip(rows) {
        let genotype = Genotype {
            line: *line,
            chromosome,
            calls,
            genotype_version,
        };
        ids.push(resolver.genotype(&genotype).await?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(path = %path.display(), genotypes = ids.len(), "Resolved genotypes");
    Ok(ids)
}

/// Distinct runs of a run file
pub async fn gwas_runs_from_file(resolver: &Resolver, path: &Path, params: &RunParameters) -> Result<Vec<Id>> {
    require_file(path)?;
    let keys = parsers::parse_unique_runs(path)?;

    let mut ids = Vec::with_capacity(keys.len());
    for key in &keys {
        let trait_id = resolver.trait_(&key.trait_name).await?;
        ids.push(resolver.gwas_run(&params.run(trait_id, key)).await?);
    }
    info!(path = %path.display(), runs = ids.len(), "Resolved GWAS runs");
    Ok(ids)
}

/// Result rows; their trait, run and chromosome must already exist
pub async fn gwas_results_from_file(
    resolver: &Resolver,
    path: &Path,
    species: Id,
    params: &RunParameters,
) -> Result<Vec<Id>> {
    require_file(path)?;
    let rows = parsers::parse_gwas_results(path)?;

    let pb = create_progress_bar(rows.len() as u64, "GWAS results", resolver.options().show_progress);
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let trait_id = resolver.find_trait(&row.run.trait_name).await?;
        let gwas_run = resolver.find_gwas_run(&params.run(trait_id, &row.run)).await?;
        debug!(gwas_run, trait_name = %row.run.trait_name, "Found run");
        let chromosome = resolver.find_chromosome(&row.chromosome, species).await?;

        let result = GwasResult {
            chromosome,
            basepair: row.basepair,
            gwas_run,
            pval: row.pval,
            cofactor: row.cofactor,
            order: row.order,
            null_pval: row.null_pval,
            model_added_pval: row.model_added_pval,
            model: row.model,
            pcs: row.pcs,
        };
        ids.push(resolver.gwas_result(&result).await?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(path = %path.display(), results = ids.len(), "Inserted GWAS results");
    Ok(ids)
}
