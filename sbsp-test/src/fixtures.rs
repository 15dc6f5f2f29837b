//! Test fixtures and data generators

use anyhow::Result;
use sbsp_core::{GenomeInfo, GenomeInfoList};
use std::path::{Path, PathBuf};

/// Deterministic assembly-style names: `GCF_000000001.1`, ...
pub fn genome_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("GCF_{:09}.1", i)).collect()
}

pub fn genomes(n: usize) -> Vec<GenomeInfo> {
    genome_names(n).into_iter().map(GenomeInfo::new).collect()
}

/// Genomes whose `ancestor` attribute cycles through `ancestors`
pub fn genomes_with_ancestors(n: usize, ancestors: &[&str]) -> Vec<GenomeInfo> {
    genome_names(n)
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let genome = GenomeInfo::new(name);
            match ancestors.get(i % ancestors.len().max(1)) {
                Some(ancestor) => genome.with_attribute("ancestor", *ancestor),
                None => genome,
            }
        })
        .collect()
}

/// Write a genome list CSV and return its path
pub fn write_genome_list(path: &Path, genomes: &[GenomeInfo]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    GenomeInfoList::new(genomes.to_vec()).to_file(path)?;
    Ok(path.to_path_buf())
}

/// Create a placeholder target database file under `dir`
pub fn write_database(dir: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, format!("# target database {}\n", name))?;
    Ok(path)
}
