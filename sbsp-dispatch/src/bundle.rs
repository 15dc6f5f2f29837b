//! Work bundles and the chunks they are partitioned into

use sbsp_core::{SbspError, SbspResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PLACEHOLDER: &str = "{}";

/// Value of one named bundle argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// Entities that may be partitioned across chunks
    List(Vec<String>),
    /// Copied unchanged into every chunk
    Value(String),
}

impl ArgValue {
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ArgValue::List(values) => Some(values),
            ArgValue::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&str> {
        match self {
            ArgValue::Value(value) => Some(value),
            ArgValue::List(_) => None,
        }
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        ArgValue::List(values)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Value(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Value(value)
    }
}

/// Path template with exactly one `{}` placeholder for the chunk index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputTemplate(String);

impl OutputTemplate {
    pub fn new(template: impl Into<String>) -> SbspResult<Self> {
        let template = template.into();
        match template.matches(PLACEHOLDER).count() {
            1 => Ok(Self(template)),
            0 => Err(SbspError::Partition(format!(
                "output template {:?} has no {{}} placeholder",
                template
            ))),
            n => Err(SbspError::Partition(format!(
                "output template {:?} has {} placeholders, expected one",
                template, n
            ))),
        }
    }

    /// Template rooted under `dir`, e.g. `<dir>/orthologs_{}.csv`
    pub fn in_dir(dir: &Path, file_template: &str) -> SbspResult<Self> {
        Self::new(dir.join(file_template).to_string_lossy().into_owned())
    }

    pub fn render(&self, index: usize) -> PathBuf {
        PathBuf::from(self.0.replacen(PLACEHOLDER, &index.to_string(), 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OutputTemplate {
    type Error = SbspError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OutputTemplate> for String {
    fn from(template: OutputTemplate) -> Self {
        template.0
    }
}

/// Input of one dispatch round
///
/// Immutable once built; splitters only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBundle {
    args: BTreeMap<String, ArgValue>,
    output: OutputTemplate,
}

impl WorkBundle {
    pub fn new(output: OutputTemplate) -> Self {
        Self {
            args: BTreeMap::new(),
            output,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_list<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.with_arg(key, ArgValue::List(values))
    }

    pub fn arg(&self, key: &str) -> Option<&ArgValue> {
        self.args.get(key)
    }

    pub fn args(&self) -> &BTreeMap<String, ArgValue> {
        &self.args
    }

    pub fn output_template(&self) -> &OutputTemplate {
        &self.output
    }
}

/// One partition of a [`WorkBundle`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub args: BTreeMap<String, ArgValue>,
    pub output: PathBuf,
}

impl Chunk {
    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.args.get(key).and_then(ArgValue::as_list)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(ArgValue::as_value)
    }

    /// Keys of the list arguments, in key order
    pub fn list_keys(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .filter(|(_, v)| matches!(v, ArgValue::List(_)))
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_template_requires_one_placeholder() {
        assert!(OutputTemplate::new("/out/orthologs.csv").is_err());
        assert!(OutputTemplate::new("/out/{}/orthologs_{}.csv").is_err());

        let template = OutputTemplate::new("/out/orthologs_{}.csv").unwrap();
        assert_eq!(template.render(3), PathBuf::from("/out/orthologs_3.csv"));
    }

    #[test]
    fn test_template_deserialization_validates() {
        let ok: Result<OutputTemplate, _> = serde_json::from_str("\"a_{}\"");
        assert!(ok.is_ok());
        let bad: Result<OutputTemplate, _> = serde_json::from_str("\"a\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_arg_value_untagged_json() {
        let bundle = WorkBundle::new(OutputTemplate::new("o_{}").unwrap())
            .with_list("pf_q_list", ["g1", "g2"])
            .with_arg("pf_t_db", "/db/archaea");

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["args"]["pf_q_list"], serde_json::json!(["g1", "g2"]));
        assert_eq!(json["args"]["pf_t_db"], serde_json::json!("/db/archaea"));

        let back: WorkBundle = serde_json::from_value(json).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn test_chunk_accessors() {
        let mut args = BTreeMap::new();
        args.insert("genomes".to_string(), ArgValue::List(vec!["a".into()]));
        args.insert("db".to_string(), ArgValue::Value("/db".into()));
        let chunk = Chunk {
            index: 0,
            args,
            output: PathBuf::from("o_0"),
        };

        assert_eq!(chunk.list("genomes"), Some(&["a".to_string()][..]));
        assert_eq!(chunk.list("db"), None);
        assert_eq!(chunk.value("db"), Some("/db"));
        assert_eq!(chunk.list_keys().collect::<Vec<_>>(), vec!["genomes"]);
    }
}
