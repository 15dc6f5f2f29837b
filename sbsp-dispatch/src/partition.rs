//! Partition strategies
//!
//! A splitter maps a [`WorkBundle`] and a desired chunk count to an ordered
//! sequence of [`Chunk`]s. Only one list argument is partitioned; every other
//! argument is copied unchanged into each chunk.

use crate::bundle::{ArgValue, Chunk, WorkBundle};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub trait Splitter: Send + Sync {
    /// Split `bundle` into at most `desired` chunks (at least one when there is input)
    fn split(&self, bundle: &WorkBundle, desired: usize) -> Vec<Chunk>;

    fn name(&self) -> &str;
}

/// Sizes of `min(desired, total)` contiguous slices differing by at most one
///
/// Earlier slices receive the remainder.
pub fn partition_sizes(total: usize, desired: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    let count = desired.clamp(1, total);
    let base = total / count;
    let extra = total % count;
    (0..count)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Partition `bundle.args[key]`, copying all other arguments into each chunk
fn split_on(bundle: &WorkBundle, key: &str, desired: usize) -> Vec<Chunk> {
    let entities = match bundle.arg(key) {
        Some(ArgValue::List(values)) => values,
        Some(ArgValue::Value(_)) => {
            warn!("Malformed bundle: argument {} is not a list, nothing to dispatch", key);
            return Vec::new();
        }
        None => {
            warn!("Malformed bundle: missing argument {}, nothing to dispatch", key);
            return Vec::new();
        }
    };

    if entities.is_empty() {
        debug!("Argument {} is empty, nothing to dispatch", key);
        return Vec::new();
    }

    let template = bundle.output_template();
    let mut chunks = Vec::new();
    let mut start = 0;
    for (index, size) in partition_sizes(entities.len(), desired).into_iter().enumerate() {
        let mut args: BTreeMap<String, ArgValue> = bundle.args().clone();
        args.insert(
            key.to_string(),
            ArgValue::List(entities[start..start + size].to_vec()),
        );
        chunks.push(Chunk {
            index,
            args,
            output: template.render(index),
        });
        start += size;
    }

    debug!(
        "Split {} entities of {} into {} chunks",
        entities.len(),
        key,
        chunks.len()
    );
    chunks
}

/// Divides one list argument evenly across chunks, preserving order
#[derive(Debug, Clone)]
pub struct ListSplitter {
    key: String,
}

impl ListSplitter {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Splitter for ListSplitter {
    fn split(&self, bundle: &WorkBundle, desired: usize) -> Vec<Chunk> {
        split_on(bundle, &self.key, desired)
    }

    fn name(&self) -> &str {
        "list"
    }
}

/// Partitions the query side and replicates the target into every chunk
#[derive(Debug, Clone)]
pub struct GroupSplitter {
    query: String,
    target: String,
}

impl GroupSplitter {
    pub fn new(query: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            target: target.into(),
        }
    }
}

impl Splitter for GroupSplitter {
    fn split(&self, bundle: &WorkBundle, desired: usize) -> Vec<Chunk> {
        if bundle.arg(&self.target).is_none() {
            warn!(
                "Malformed bundle: missing target argument {}, nothing to dispatch",
                self.target
            );
            return Vec::new();
        }
        if self.query == self.target {
            warn!("Malformed bundle: query and target are both {}", self.query);
            return Vec::new();
        }
        split_on(bundle, &self.query, desired)
    }

    fn name(&self) -> &str {
        "group"
    }
}
