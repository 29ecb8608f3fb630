//! Dataset context and file inventory
//!
//! [`DatasetContext`] is built once from a checked manifest and the directory
//! holding the dataset files. It is immutable for the rest of a run and never
//! holds a database handle; the store is passed to the import phases separately.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;

/// The kinds of input file a dataset is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileKind {
    Line,
    Genotype,
    Variant,
    Kinship,
    PopulationStructure,
    Phenotype,
    GwasRun,
    GwasResult,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Line => "line",
            FileKind::Genotype => "genotype",
            FileKind::Variant => "variant",
            FileKind::Kinship => "kinship",
            FileKind::PopulationStructure => "population structure",
            FileKind::Phenotype => "phenotype",
            FileKind::GwasRun => "GWAS run",
            FileKind::GwasResult => "GWAS result",
        };
        f.write_str(name)
    }
}

/// Concrete paths of every file the manifest refers to
#[derive(Debug, Clone, PartialEq)]
pub struct FileInventory {
    pub lines: PathBuf,
    pub kinship: PathBuf,
    pub population_structure: PathBuf,
    pub phenotypes: Vec<PathBuf>,
    pub gwas_runs: Vec<PathBuf>,
    pub gwas_results: Vec<PathBuf>,
    /// `chr{i}_{shortname}.012`, index 0 is chromosome 1
    pub genotypes: Vec<PathBuf>,
    /// `chr{i}_{shortname}.012.pos`, index 0 is chromosome 1
    pub variants: Vec<PathBuf>,
}

impl FileInventory {
    pub fn from_manifest(manifest: &Manifest, dir: &Path) -> Self {
        let short = &manifest.species_shortname;
        let per_chromosome = |suffix: &str| -> Vec<PathBuf> {
            manifest
                .chromosome_names()
                .iter()
                .map(|chr| dir.join(format!("{}_{}{}", chr, short, suffix)))
                .collect()
        };
        let all = |names: &[String]| -> Vec<PathBuf> { names.iter().map(|n| dir.join(n)).collect() };

        Self {
            lines: dir.join(&manifest.lines_filename),
            kinship: dir.join(&manifest.kinship_filename),
            population_structure: dir.join(&manifest.population_structure_filename),
            phenotypes: all(&manifest.phenotype_filenames),
            gwas_runs: all(&manifest.gwas_run_filenames),
            gwas_results: all(&manifest.gwas_results_filenames),
            genotypes: per_chromosome(".012"),
            variants: per_chromosome(".012.pos"),
        }
    }

    /// Every file paired with its kind, in validation order
    pub fn files(&self) -> Vec<(FileKind, &Path)> {
        let mut files: Vec<(FileKind, &Path)> = vec![(FileKind::Line, self.lines.as_path())];
        files.extend(self.genotypes.iter().map(|p| (FileKind::Genotype, p.as_path())));
        files.extend(self.variants.iter().map(|p| (FileKind::Variant, p.as_path())));
        files.push((FileKind::Kinship, self.kinship.as_path()));
        files.push((FileKind::PopulationStructure, self.population_structure.as_path()));
        files.extend(self.phenotypes.iter().map(|p| (FileKind::Phenotype, p.as_path())));
        files.extend(self.gwas_runs.iter().map(|p| (FileKind::GwasRun, p.as_path())));
        files.extend(self.gwas_results.iter().map(|p| (FileKind::GwasResult, p.as_path())));
        files
    }
}

#[derive(Debug, Clone)]
pub struct DatasetContext {
    pub manifest: Manifest,
    pub working_dir: PathBuf,
    pub inventory: FileInventory,
}

impl DatasetContext {
    pub fn new(manifest: Manifest, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let inventory = FileInventory::from_manifest(&manifest, &working_dir);
        Self {
            manifest,
            working_dir,
            inventory,
        }
    }

    pub fn chromosome_names(&self) -> Vec<String> {
        self.manifest.chromosome_names()
    }

    /// Genotype and variant paths for one chromosome, numbered from 1
    pub fn chromosome_files(&self, number: u32) -> Option<(&Path, &Path)> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        let genotype = self.inventory.genotypes.get(index)?;
        let variant = self.inventory.variants.get(index)?;
        Some((genotype.as_path(), variant.as_path()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::sample_manifest_json;

    fn context() -> DatasetContext {
        let manifest = Manifest::from_value(sample_manifest_json()).unwrap();
        DatasetContext::new(manifest, "/data/maize282")
    }

    #[test]
    fn test_per_chromosome_paths() {
        let ctx = context();
        assert_eq!(
            ctx.inventory.genotypes,
            vec![
                PathBuf::from("/data/maize282/chr1_maize.012"),
                PathBuf::from("/data/maize282/chr2_maize.012"),
            ]
        );
        assert_eq!(
            ctx.inventory.variants[1],
            PathBuf::from("/data/maize282/chr2_maize.012.pos")
        );
        assert_eq!(
            ctx.inventory.lines,
            PathBuf::from("/data/maize282/chr1_maize.012.indv")
        );
    }

    #[test]
    fn test_files_in_validation_order() {
        let ctx = context();
        let kinds: Vec<FileKind> = ctx.inventory.files().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                FileKind::Line,
                FileKind::Genotype,
                FileKind::Genotype,
                FileKind::Variant,
                FileKind::Variant,
                FileKind::Kinship,
                FileKind::PopulationStructure,
                FileKind::Phenotype,
                FileKind::GwasRun,
                FileKind::GwasResult,
            ]
        );
    }

    #[test]
    fn test_chromosome_files_lookup() {
        let ctx = context();
        let (geno, pos) = ctx.chromosome_files(2).unwrap();
        assert!(geno.ends_with("chr2_maize.012"));
        assert!(pos.ends_with("chr2_maize.012.pos"));
        assert!(ctx.chromosome_files(0).is_none());
        assert!(ctx.chromosome_files(3).is_none());
    }
}
