//! Configuration validator
//!
//! Turns a manifest into a checked [`DatasetContext`] and then validates the
//! selected files: every selected file must exist before any content check runs.

use std::path::{Path, PathBuf};

use pgwas_common::table::{Delimiter, Table};
use tracing::{error, info, warn};

use super::files;
use super::{ValidationSelection, ValidationStep};
use crate::dataset::{DatasetContext, FileKind};
use crate::error::{IngestError, Result};
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Trust genotype matrices without reading them. Only set on request.
    pub skip_genotype_validation: bool,
}

/// What a validation pass looked at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub validated: Vec<(FileKind, PathBuf)>,
    pub skipped: Vec<(FileKind, PathBuf)>,
}

/// Read a manifest and resolve its files against `working_dir`, defaulting to
/// the directory that holds the manifest. The directory is made absolute so
/// stored file paths do not depend on where the import was started from.
pub fn load_context(manifest_path: &Path, working_dir: Option<&Path>) -> Result<DatasetContext> {
    let manifest = Manifest::from_path(manifest_path)?;
    let dir = match working_dir {
        Some(dir) => dir.to_path_buf(),
        None => manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    Ok(DatasetContext::new(manifest, absolute_dir(&dir)?))
}

/// Canonical form of an existing directory, otherwise the lexically absolute path
fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    match dir.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(_) => Ok(std::path::absolute(dir)?),
    }
}

/// Validate the files of `ctx` selected by `selection`
pub fn validate_dataset(
    ctx: &DatasetContext,
    selection: &ValidationSelection,
    options: ValidationOptions,
) -> Result<ValidationReport> {
    if selection.includes(ValidationStep::Config) {
        info!(
            species = %ctx.manifest.species_shortname,
            chromosomes = ctx.manifest.number_of_chromosomes,
            "Manifest contains every required key"
        );
    }

    let selected: Vec<(FileKind, &Path)> = ctx
        .inventory
        .files()
        .into_iter()
        .filter(|(kind, _)| selection.includes_kind(*kind))
        .collect();

    let missing: Vec<&Path> = selected
        .iter()
        .filter(|(_, path)| !path.is_file())
        .map(|(_, path)| *path)
        .collect();
    for path in &missing {
        error!(path = %path.display(), "Required file not found");
    }
    if let Some(first) = missing.first() {
        return Err(IngestError::file_not_found(*first));
    }

    info!(
        steps = %selection,
        files = selected.len(),
        "Found all files for the selected validation steps; validating contents"
    );

    let expected_rows = line_count(&ctx.inventory.lines)?;
    let mut report = ValidationReport::default();

    for (kind, path) in selected {
        match kind {
            FileKind::Line => files::validate_lines(path)?,
            FileKind::Variant => files::validate_variants(path)?,
            FileKind::Genotype if options.skip_genotype_validation => {
                warn!(path = %path.display(), "Skipping genotype validation as requested");
                report.skipped.push((kind, path.to_path_buf()));
                continue;
            },
            FileKind::Genotype => files::validate_genotypes(path, expected_rows)?,
            FileKind::Kinship => files::validate_kinship(path)?,
            FileKind::PopulationStructure => files::validate_population_structure(path)?,
            FileKind::Phenotype => files::validate_phenotypes(path)?,
            FileKind::GwasRun => files::validate_gwas_runs(path)?,
            FileKind::GwasResult => files::validate_gwas_results(path)?,
        }
        report.validated.push((kind, path.to_path_buf()));
    }

    info!(
        validated = report.validated.len(),
        skipped = report.skipped.len(),
        "Input files appear to be valid"
    );
    Ok(report)
}

/// Number of names in the line list; `None` when there is no line list to
/// compare against. A line list that exists but cannot be read is an error.
fn line_count(path: &Path) -> Result<Option<usize>> {
    if !path.is_file() {
        return Ok(None);
    }
    let table = Table::read(path, Delimiter::Comma, false).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to read line list");
        e
    })?;
    Ok(Some(table.row_count()))
}
