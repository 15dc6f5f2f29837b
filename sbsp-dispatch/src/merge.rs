//! Merge strategies over completed chunk outputs
//!
//! Every merger rewrites its destination from scratch, so merging the same
//! outputs twice produces the same result.

use sbsp_core::{SbspError, SbspResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Consolidated result of one dispatch round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergedOutput {
    /// The chunk outputs themselves, in chunk order
    Files(Vec<PathBuf>),
    /// A single consolidated file
    File(PathBuf),
}

impl MergedOutput {
    pub fn empty() -> Self {
        MergedOutput::Files(Vec::new())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            MergedOutput::Files(paths) => paths.clone(),
            MergedOutput::File(path) => vec![path.clone()],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MergedOutput::Files(paths) if paths.is_empty())
    }
}

pub trait Merger: Send + Sync {
    fn merge(&self, outputs: &[PathBuf]) -> SbspResult<MergedOutput>;

    fn name(&self) -> &str;
}

/// Passes the output list through unchanged
#[derive(Debug, Clone, Default)]
pub struct IdentityMerger;

impl Merger for IdentityMerger {
    fn merge(&self, outputs: &[PathBuf]) -> SbspResult<MergedOutput> {
        Ok(MergedOutput::Files(outputs.to_vec()))
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Stream-appends row-oriented outputs into one file
#[derive(Debug, Clone)]
pub struct ConcatMerger {
    destination: PathBuf,
    header: bool,
}

impl ConcatMerger {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            header: false,
        }
    }

    /// Keep the first non-empty chunk's header line and drop it from later chunks
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Append `source` to `writer`; returns whether any line was written
    fn append(&self, source: &Path, writer: &mut impl Write, skip_first: bool) -> SbspResult<bool> {
        let mut reader = BufReader::new(File::open(source)?);
        let mut line = String::new();
        let mut first = true;
        let mut wrote = false;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if first {
                first = false;
                if skip_first {
                    continue;
                }
            }
            writer.write_all(line.as_bytes())?;
            if !line.ends_with('\n') {
                writer.write_all(b"\n")?;
            }
            wrote = true;
        }
        Ok(wrote)
    }
}

impl Merger for ConcatMerger {
    fn merge(&self, outputs: &[PathBuf]) -> SbspResult<MergedOutput> {
        if outputs.iter().any(|p| p == &self.destination) {
            return Err(SbspError::Merge(format!(
                "merge destination {} is also a chunk output",
                self.destination.display()
            )));
        }
        if let Some(parent) = self.destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&self.destination).map_err(|e| {
            SbspError::Merge(format!("cannot create {}: {}", self.destination.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        let mut header_seen = false;

        for output in outputs {
            if !output.exists() {
                warn!("Chunk output {} is missing, skipping", output.display());
                continue;
            }
            let skip_first = self.header && header_seen;
            let non_empty = self.append(output, &mut writer, skip_first)?;
            header_seen |= non_empty;
        }
        writer.flush()?;

        debug!(
            "Concatenated {} outputs into {}",
            outputs.len(),
            self.destination.display()
        );
        Ok(MergedOutput::File(self.destination.clone()))
    }

    fn name(&self) -> &str {
        "concat"
    }
}

/// Writes the output paths one per line into a summary file
#[derive(Debug, Clone)]
pub struct ListFileMerger {
    destination: PathBuf,
}

impl ListFileMerger {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

impl Merger for ListFileMerger {
    fn merge(&self, outputs: &[PathBuf]) -> SbspResult<MergedOutput> {
        let lines: Vec<String> = outputs
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        sbsp_utils::write_list_file(&self.destination, &lines)
            .map_err(|e| SbspError::Merge(format!("{:#}", e)))?;
        Ok(MergedOutput::File(self.destination.clone()))
    }

    fn name(&self) -> &str {
        "list-file"
    }
}
