//! Core types shared across SBSP crates

pub mod environment;
pub mod genome;

pub use environment::Environment;
pub use genome::{GenomeInfo, GenomeInfoList, ANCESTOR_ATTRIBUTE};
