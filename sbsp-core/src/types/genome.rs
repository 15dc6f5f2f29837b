//! Genome descriptors and genome list files

use crate::{SbspError, SbspResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Attribute naming a genome's ancestor clade
pub const ANCESTOR_ATTRIBUTE: &str = "ancestor";

/// One genome of a genome list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeInfo {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl GenomeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn ancestor(&self) -> Option<&str> {
        self.attribute(ANCESTOR_ATTRIBUTE).filter(|a| !a.is_empty())
    }
}

/// Ordered list of genomes, read from and written to CSV with a `name` column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeInfoList {
    genomes: Vec<GenomeInfo>,
}

impl GenomeInfoList {
    pub fn new(genomes: Vec<GenomeInfo>) -> Self {
        Self { genomes }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SbspResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            SbspError::NotFound(format!("genome list {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> SbspResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let name_column = headers
            .iter()
            .position(|h| h == "name")
            .ok_or_else(|| SbspError::Parse("genome list has no 'name' column".to_string()))?;

        let mut genomes = Vec::new();
        let mut names = HashSet::new();
        for record in csv_reader.records() {
            let record = record?;
            let name = record.get(name_column).unwrap_or_default();
            if name.is_empty() {
                return Err(SbspError::Parse(format!(
                    "genome list row {} has an empty name",
                    genomes.len() + 1
                )));
            }
            if !names.insert(name.to_string()) {
                return Err(SbspError::Parse(format!(
                    "genome list names {} more than once",
                    name
                )));
            }

            let attributes = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(i, (_, value))| *i != name_column && !value.is_empty())
                .map(|(_, (key, value))| (key.to_string(), value.to_string()))
                .collect();

            genomes.push(GenomeInfo {
                name: name.to_string(),
                attributes,
            });
        }

        Ok(Self { genomes })
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> SbspResult<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: std::io::Write>(&self, writer: W) -> SbspResult<()> {
        let keys: BTreeSet<&str> = self
            .genomes
            .iter()
            .flat_map(|g| g.attributes.keys().map(String::as_str))
            .collect();

        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["name"];
        header.extend(keys.iter().copied());
        csv_writer.write_record(&header)?;

        for genome in &self.genomes {
            let mut row = vec![genome.name.as_str()];
            row.extend(keys.iter().map(|k| genome.attribute(k).unwrap_or("")));
            csv_writer.write_record(&row)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.genomes.iter().map(|g| g.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenomeInfo> {
        self.genomes.iter()
    }

    pub fn into_vec(self) -> Vec<GenomeInfo> {
        self.genomes
    }
}

impl From<Vec<GenomeInfo>> for GenomeInfoList {
    fn from(genomes: Vec<GenomeInfo>) -> Self {
        Self::new(genomes)
    }
}

impl<'a> IntoIterator for &'a GenomeInfoList {
    type Item = &'a GenomeInfo;
    type IntoIter = std::slice::Iter<'a, GenomeInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.genomes.iter()
    }
}
