//! Import pipeline
//!
//! Runs the phases of an import in a fixed order, each completing before the
//! next starts:
//!
//! 1. experiment design: species, population, chromosomes, lines, reference
//!    line, genotype version, traits
//! 2. pipeline design: GWAS algorithm, imputation method, kinship and
//!    population structure algorithms
//! 3. experiment collect: phenotypes, genotypes, variants (bulk loader)
//! 4. pipeline collect: kinship, population structure, GWAS runs and results
//! 5. field design: locations, growout types and growouts from the manifest
//!
//! [`Importer::validate_and_run`] validates the dataset before anything is
//! written.

use std::fmt;

use tracing::{error, info};

use crate::bulk::BulkVariantLoader;
use crate::dataset::DatasetContext;
use crate::error::{IngestError, Result};
use crate::loaders::{self, RunParameters};
use crate::models::{GenotypeVersion, Growout, Id, Location, Species};
use crate::parsers::growout_name_to_year;
use crate::resolver::Resolver;
use crate::validation::{validate_dataset, ValidationOptions, ValidationReport, ValidationSelection};

/// What one import resolved or wrote
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub species: Id,
    pub population: Id,
    pub chromosomes: usize,
    pub lines: usize,
    pub traits: usize,
    pub phenotypes: usize,
    pub genotypes: usize,
    pub variants_inserted: u64,
    pub variants_skipped: usize,
    pub gwas_runs: usize,
    pub gwas_results: usize,
    pub growouts: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chromosomes, {} lines, {} traits, {} phenotypes, {} genotypes, \
             {} new variants ({} already present), {} GWAS runs, {} GWAS results, {} growouts",
            self.chromosomes,
            self.lines,
            self.traits,
            self.phenotypes,
            self.genotypes,
            self.variants_inserted,
            self.variants_skipped,
            self.gwas_runs,
            self.gwas_results,
            self.growouts
        )
    }
}

/// Identities created by the experiment design phase
#[derive(Debug, Clone)]
struct Experiment {
    species: Id,
    population: Id,
    chromosomes: Vec<(String, Id)>,
    lines: Vec<(String, Id)>,
    genotype_version: Id,
}

/// Identities created by the pipeline design phase
#[derive(Debug, Clone, Copy)]
struct Pipeline {
    gwas_algorithm: Id,
    imputation_method: Id,
    kinship_algorithm: Id,
    population_structure_algorithm: Id,
}

pub struct Importer {
    resolver: Resolver,
}

impl Importer {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Validate the selected files, then import. Nothing is written when
    /// validation fails.
    pub async fn validate_and_run(
        &self,
        ctx: &DatasetContext,
        selection: &ValidationSelection,
    ) -> Result<(ValidationReport, ImportSummary)> {
        let options = ValidationOptions {
            skip_genotype_validation: self.resolver.options().skip_genotype_validation,
        };
        let report = validate_dataset(ctx, selection, options)?;
        let summary = self.run(ctx).await?;
        Ok((report, summary))
    }

    pub async fn run(&self, ctx: &DatasetContext) -> Result<ImportSummary> {
        info!(
            species = %ctx.manifest.species_shortname,
            population = %ctx.manifest.population_name,
            dir = %ctx.working_dir.display(),
            "Starting import"
        );
        let mut summary = ImportSummary::default();

        let experiment = self.experiment_design(ctx, &mut summary).await?;
        let pipeline = self.pipeline_design(ctx).await?;
        self.experiment_collect(ctx, &experiment, &mut summary).await?;
        self.pipeline_collect(ctx, &experiment, pipeline, &mut summary).await?;
        self.field_design(ctx, &experiment, &mut summary).await?;

        info!(%summary, "Import finished");
        Ok(summary)
    }

    async fn experiment_design(&self, ctx: &DatasetContext, summary: &mut ImportSummary) -> Result<Experiment> {
        let manifest = &ctx.manifest;
        let r = &self.resolver;

        let species = r
            .species(&Species {
                shortname: manifest.species_shortname.clone(),
                binomial: manifest.species_binomial_name.clone(),
                subspecies: manifest.species_subspecies.clone(),
                variety: manifest.species_variety.clone(),
            })
            .await?;
        let population = r.population(&manifest.population_name, species).await?;
        let chromosomes = r
            .chromosomes_for_species(species, manifest.number_of_chromosomes)
            .await?;
        let lines = loaders::lines_from_file(r, &ctx.inventory.lines, population).await?;

        let reference_genome = match r.find_line(&manifest.reference_genome_line_name, population).await? {
            Some(id) => id,
            None => {
                error!(
                    line = %manifest.reference_genome_line_name,
                    population,
                    "Reference genome line is not part of the population"
                );
                return Err(IngestError::identity(
                    "line",
                    format!("{} in population {}", manifest.reference_genome_line_name, population),
                ));
            },
        };

        let genotype_version = r
            .genotype_version(&GenotypeVersion {
                assembly_name: manifest.genotype_version_assembly_name.clone(),
                annotation_name: manifest.genotype_version_annotation_name.clone(),
                reference_genome,
                population,
            })
            .await?;

        let mut traits = 0;
        for path in &ctx.inventory.phenotypes {
            traits += loaders::traits_from_phenotype_file(r, path).await?.len();
        }

        summary.species = species;
        summary.population = population;
        summary.chromosomes = chromosomes.len();
        summary.lines = lines.len();
        summary.traits = traits;
        info!(species, population, genotype_version, "Experiment design complete");

        Ok(Experiment {
            species,
            population,
            chromosomes,
            lines,
            genotype_version,
        })
    }

    async fn pipeline_design(&self, ctx: &DatasetContext) -> Result<Pipeline> {
        let manifest = &ctx.manifest;
        let r = &self.resolver;

        let pipeline = Pipeline {
            gwas_algorithm: r.gwas_algorithm(&manifest.gwas_algorithm_name).await?,
            imputation_method: r.imputation_method(&manifest.imputation_method_name).await?,
            kinship_algorithm: r.kinship_algorithm(&manifest.kinship_algorithm_name).await?,
            population_structure_algorithm: r
                .population_structure_algorithm(&manifest.population_structure_algorithm_name)
                .await?,
        };
        info!(?pipeline, "Pipeline design complete");
        Ok(pipeline)
    }

    async fn experiment_collect(
        &self,
        ctx: &DatasetContext,
        experiment: &Experiment,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let r = &self.resolver;

        for path in &ctx.inventory.phenotypes {
            summary.phenotypes += loaders::phenotypes_from_file(r, path, experiment.population)
                .await?
                .len();
        }

        let line_ids: Vec<Id> = experiment.lines.iter().map(|(_, id)| *id).collect();
        for (number, (name, chromosome)) in (1u32..).zip(&experiment.chromosomes) {
            let (genotype_path, _) = ctx
                .chromosome_files(number)
                .ok_or_else(|| IngestError::identity("chromosome", name.clone()))?;
            summary.genotypes += loaders::genotypes_from_file(
                r,
                genotype_path,
                &line_ids,
                *chromosome,
                experiment.genotype_version,
            )
            .await?
            .len();
        }

        let loader = BulkVariantLoader::new(r);
        for (number, (name, chromosome)) in (1u32..).zip(&experiment.chromosomes) {
            let (_, variant_path) = ctx
                .chromosome_files(number)
                .ok_or_else(|| IngestError::identity("chromosome", name.clone()))?;
            let report = loader.load(variant_path, experiment.species, *chromosome).await?;
            summary.variants_inserted += report.inserted;
            summary.variants_skipped += report.skipped;
        }

        info!(
            phenotypes = summary.phenotypes,
            genotypes = summary.genotypes,
            variants = summary.variants_inserted,
            "Experiment collection complete"
        );
        Ok(())
    }

    async fn pipeline_collect(
        &self,
        ctx: &DatasetContext,
        experiment: &Experiment,
        pipeline: Pipeline,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let r = &self.resolver;
        let manifest = &ctx.manifest;

        let kinship_path = &ctx.inventory.kinship;
        let structure_path = &ctx.inventory.population_structure;
        for path in [kinship_path, structure_path] {
            if !path.is_file() {
                return Err(IngestError::file_not_found(path));
            }
        }
        let kinship = r
            .kinship(pipeline.kinship_algorithm, &kinship_path.display().to_string())
            .await?;
        let population_structure = r
            .population_structure(
                pipeline.population_structure_algorithm,
                &structure_path.display().to_string(),
            )
            .await?;

        let params = RunParameters {
            gwas_algorithm: pipeline.gwas_algorithm,
            genotype_version: experiment.genotype_version,
            missing_snp_cutoff_value: manifest.missing_snp_cutoff_value,
            missing_line_cutoff_value: manifest.missing_line_cutoff_value,
            minor_allele_frequency_cutoff_value: manifest.minor_allele_frequency_cutoff_value,
            imputation_method: pipeline.imputation_method,
            kinship,
            population_structure,
        };

        for path in &ctx.inventory.gwas_runs {
            summary.gwas_runs += loaders::gwas_runs_from_file(r, path, &params).await?.len();
        }
        for path in &ctx.inventory.gwas_results {
            summary.gwas_results +=
                loaders::gwas_results_from_file(r, path, experiment.species, &params)
                    .await?
                    .len();
        }

        info!(
            kinship,
            population_structure,
            runs = summary.gwas_runs,
            results = summary.gwas_results,
            "Pipeline collection complete"
        );
        Ok(())
    }

    async fn field_design(
        &self,
        ctx: &DatasetContext,
        experiment: &Experiment,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let r = &self.resolver;

        for spec in &ctx.manifest.growouts {
            let location = r
                .location(&Location {
                    code: spec.location.code.clone(),
                    city: spec.location.city.clone(),
                    state: spec.location.state.clone(),
                    country: spec.location.country.clone(),
                })
                .await?;
            let growout_type = r.growout_type(&spec.growout_type).await?;
            let year = spec.year.or_else(|| growout_name_to_year(&spec.name));

            r.growout(&Growout {
                name: spec.name.clone(),
                population: experiment.population,
                location,
                year,
                growout_type,
            })
            .await?;
            summary.growouts += 1;
        }
        Ok(())
    }
}
