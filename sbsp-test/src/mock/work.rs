//! Work function writing one line to the chunk output

use anyhow::Result;
use sbsp_dispatch::work::shell_quote;
use sbsp_dispatch::{Chunk, CommandSpec, WorkArgs, WorkContext, WorkFn};

/// Writes a single line to `chunk.output`
///
/// The line is the fixed text if one was given, otherwise the chunk's list
/// entries joined by commas.
#[derive(Debug, Clone, Default)]
pub struct LineWork {
    line: Option<String>,
}

impl LineWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(line: impl Into<String>) -> Self {
        Self {
            line: Some(line.into()),
        }
    }

    fn line_for(&self, chunk: &Chunk) -> String {
        match &self.line {
            Some(line) => line.clone(),
            None => chunk
                .args
                .values()
                .filter_map(|v| v.as_list())
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl WorkFn for LineWork {
    fn run(&self, _ctx: &WorkContext, chunk: &Chunk, _args: &WorkArgs) -> Result<()> {
        if let Some(parent) = chunk.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&chunk.output, format!("{}\n", self.line_for(chunk)))?;
        Ok(())
    }

    fn command(
        &self,
        _ctx: &WorkContext,
        chunk: &Chunk,
        _args: &WorkArgs,
    ) -> Result<Option<CommandSpec>> {
        let script = format!(
            "printf '%s\\n' {} > {}",
            shell_quote(&self.line_for(chunk)),
            shell_quote(&chunk.output.to_string_lossy())
        );
        Ok(Some(CommandSpec::new("sh").arg("-c").arg(script)))
    }

    fn name(&self) -> &str {
        "line"
    }
}
