//! Shared fixtures for unit tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;

pub fn sample_manifest_json() -> Value {
    json!({
        "species_shortname": "maize",
        "species_binomial_name": "Zea mays",
        "species_subspecies": "",
        "species_variety": null,
        "population_name": "Maize282",
        "number_of_chromosomes": 2,
        "genotype_version_assembly_name": "B73 RefGen_v4",
        "genotype_version_annotation_name": "AGPv4",
        "reference_genome_line_name": "B73",
        "gwas_algorithm_name": "MLMM",
        "imputation_method_name": "impute to major allele",
        "kinship_algorithm_name": "VanRaden",
        "population_structure_algorithm_name": "Eigenstrat",
        "kinship_filename": "kinship.csv",
        "population_structure_filename": "population_structure.csv",
        "gwas_run_filename": "runs.csv",
        "gwas_results_filename": "results.csv",
        "missing_SNP_cutoff_value": 0.85,
        "missing_line_cutoff_value": 0.85,
        "minor_allele_frequency_cutoff_value": 0.05,
        "phenotype_filename": ["phenotypes.csv"]
    })
}

pub fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// A complete, valid two-chromosome dataset matching [`sample_manifest_json`]
pub fn write_dataset() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    write(d, "manifest.json", &sample_manifest_json().to_string());
    write(d, "chr1_maize.012.indv", "B73\nMo17\nOh43\n");
    write(d, "chr1_maize.012", "0\t0\t1\t2\n1\t2\t2\t0\n2\t-1\t0\t1\n");
    write(d, "chr1_maize.012.pos", "1\t400\n1\t500\n1\t600\n");
    write(d, "chr2_maize.012", "0\t0\t1\n1\t2\t2\n2\t1\t-1\n");
    write(d, "chr2_maize.012.pos", "2\t100\n2\t250\n");
    write(
        d,
        "kinship.csv",
        ",B73,Mo17,Oh43\nB73,1.0,0.2,0.1\nMo17,0.2,1.0,0.3\nOh43,0.1,0.3,1.0\n",
    );
    write(
        d,
        "population_structure.csv",
        "Pedigree,V1,V2\nB73,0.9,0.1\nMo17,0.2,0.8\nOh43,0.5,0.5\n",
    );
    write(
        d,
        "phenotypes.csv",
        "Pedigree,weight,height\nB73,1.5,NaN\nMo17,2.0,120\nOh43,NA,110\n",
    );
    write(d, "runs.csv", "trait,nSNPs,nLines\nweight,5,3\nheight,5,3\nweight,5,3\n");
    write(
        d,
        "results.csv",
        "SNP,chr,pos,pval,trait,nSNPs,nLines,PCs\n\
         1_400,1,400,0.0034,weight,5,3,1:2:3\n\
         2_250,2,250,0.5,height,5,3,NA\n",
    );

    dir
}
