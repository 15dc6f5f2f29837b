//! Work functions executed once per chunk
//!
//! A work function never returns its result in memory: it writes to the
//! chunk's declared output path and reports only success or failure.

use crate::bundle::Chunk;
use anyhow::{bail, Context, Result};
use sbsp_core::{Environment, SbspError, SbspResult};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Keyword arguments passed unchanged to every chunk
pub type WorkArgs = BTreeMap<String, String>;

pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

/// Where a chunk runs and which environment it sees
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub environment: Environment,
    /// The chunk's private working directory
    pub workdir: PathBuf,
    /// Serialized chunk (`chunk.json`) inside `workdir`
    pub manifest: PathBuf,
}

impl WorkContext {
    /// Per-chunk list file written for list argument `key`
    pub fn list_file(&self, key: &str) -> PathBuf {
        list_file_path(&self.workdir, key)
    }
}

pub fn list_file_path(workdir: &Path, key: &str) -> PathBuf {
    workdir.join(format!("{}.list", key))
}

/// Out-of-process form of a work function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Single shell line with every word quoted
    pub fn to_shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|w| shell_quote(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

pub trait WorkFn: Send + Sync {
    /// Run in-process for one chunk
    fn run(&self, ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs) -> Result<()>;

    /// Command line for isolated or cluster execution, if this work has one
    ///
    /// `Err` means the work has a command form that could not be built for
    /// this chunk.
    fn command(
        &self,
        _ctx: &WorkContext,
        _chunk: &Chunk,
        _args: &WorkArgs,
    ) -> Result<Option<CommandSpec>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "work"
    }
}

/// Closure-backed work function
pub struct FnWork<F> {
    name: String,
    func: F,
}

impl<F> FnWork<F>
where
    F: Fn(&WorkContext, &Chunk, &WorkArgs) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> WorkFn for FnWork<F>
where
    F: Fn(&WorkContext, &Chunk, &WorkArgs) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs) -> Result<()> {
        (self.func)(ctx, chunk, args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// External program invoked from an argv template
///
/// Placeholders: `{output}`, `{workdir}`, `{manifest}`, `{index}`,
/// `{list:KEY}` (path of the chunk's list file) and `{arg:KEY}` (a chunk
/// value argument, else a keyword argument).
#[derive(Debug, Clone)]
pub struct CommandWork {
    name: String,
    template: Vec<String>,
}

impl CommandWork {
    pub fn new(name: impl Into<String>, template: Vec<String>) -> SbspResult<Self> {
        if template.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(SbspError::Configuration(
                "command template needs a program".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            template,
        })
    }

    pub fn render(&self, ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs) -> Result<CommandSpec> {
        let mut words = Vec::with_capacity(self.template.len());
        for word in &self.template {
            words.push(render_word(word, ctx, chunk, args)?);
        }
        let mut words = words.into_iter();
        let program = words.next().unwrap_or_default();
        Ok(CommandSpec {
            program,
            args: words.collect(),
        })
    }
}

fn render_word(word: &str, ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs) -> Result<String> {
    let mut rendered = String::with_capacity(word.len());
    let mut rest = word;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .with_context(|| format!("unterminated placeholder in {:?}", word))?;
        rendered.push_str(&resolve_placeholder(&after[..close], ctx, chunk, args)?);
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

fn resolve_placeholder(
    token: &str,
    ctx: &WorkContext,
    chunk: &Chunk,
    args: &WorkArgs,
) -> Result<String> {
    let value = match token.split_once(':') {
        None => match token {
            "output" => chunk.output.to_string_lossy().into_owned(),
            "workdir" => ctx.workdir.to_string_lossy().into_owned(),
            "manifest" => ctx.manifest.to_string_lossy().into_owned(),
            "index" => chunk.index.to_string(),
            _ => bail!("unknown placeholder {{{}}}", token),
        },
        Some(("list", key)) => {
            if chunk.list(key).is_none() {
                bail!("chunk has no list argument {}", key);
            }
            ctx.list_file(key).to_string_lossy().into_owned()
        }
        Some(("arg", key)) => match chunk.value(key).or_else(|| args.get(key).map(String::as_str)) {
            Some(value) => value.to_string(),
            None => bail!("no argument {} for placeholder", key),
        },
        Some(_) => bail!("unknown placeholder {{{}}}", token),
    };
    Ok(value)
}

impl WorkFn for CommandWork {
    fn run(&self, ctx: &WorkContext, chunk: &Chunk, args: &WorkArgs) -> Result<()> {
        let spec = self.render(ctx, chunk, args)?;
        let stdout = File::create(ctx.workdir.join(STDOUT_LOG))?;
        let stderr = File::create(ctx.workdir.join(STDERR_LOG))?;

        let status = spec
            .to_command()
            .current_dir(&ctx.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .with_context(|| format!("Failed to start {}", spec.program))?;

        if !status.success() {
            bail!("{} exited with {}", spec.program, status);
        }
        Ok(())
    }

    fn command(
        &self,
        ctx: &WorkContext,
        chunk: &Chunk,
        args: &WorkArgs,
    ) -> Result<Option<CommandSpec>> {
        self.render(ctx, chunk, args).map(Some)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
