// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Script templates.
//!
//! A template is plain shell text with `{{ ... }}` placeholders. A
//! placeholder is either a name or a call to a registered template function:
//!
//! ```text
//! FastTree -nt {{ args }} {{ alignment }} > {{ prefix(alignment) }}_ft.treefile
//! VeryFastTree -threads {{ threads_above(alignment, 14) }} {{ alignment }} > out.treefile
//! ```
//!
//! Names resolve against the explicit [`TaskContext`] (`task.cpus`,
//! `task.memory`, `task.process`, `task.tag`, `task.id`, `task.work_dir`),
//! the task's ext args (`args`, inserted verbatim), runtime params
//! (`params.<key>`) and the task's input slots (staged file names). Anything
//! else fails rendering with [`TemplateError::UnresolvedPlaceholder`].
//!
//! Functions are looked up in a [`TemplateFunctions`] registry so that
//! data-dependent decisions, such as picking a thread count from the number
//! of sequences in an alignment, live in one named place instead of inside
//! each process's script.

use crate::config::consts::DEFAULT_THREAD_THRESHOLD;
use crate::errors::TemplateError;
use crate::process::{Artifact, Params, TaskContext};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Expr),
}

/// Parsed placeholder expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name(String),
    Call { function: String, args: Vec<ExprArg> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprArg {
    Name(String),
    Number(i64),
    Text(String),
}

/// A parsed, immutable script or tag template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ScriptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl ScriptTemplate {
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut rest = source.as_str();
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated { offset: offset + start })?;
            segments.push(Segment::Placeholder(parse_expr(after_open[..end].trim())?));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { source, segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Expr> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(expr) => Some(expr),
            Segment::Literal(_) => None,
        })
    }

    /// Check every placeholder against the names and functions that will be
    /// available at render time, without touching any input data.
    pub fn check(
        &self,
        is_known_name: impl Fn(&str) -> bool,
        functions: &TemplateFunctions,
    ) -> Result<(), TemplateError> {
        for expr in self.placeholders() {
            match expr {
                Expr::Name(name) => {
                    if !is_known_name(name) {
                        return Err(TemplateError::UnresolvedPlaceholder { name: name.clone() });
                    }
                }
                Expr::Call { function, args } => {
                    if !functions.contains(function) {
                        return Err(TemplateError::UnknownFunction {
                            name: function.clone(),
                        });
                    }
                    for arg in args {
                        if let ExprArg::Name(name) = arg {
                            if !is_known_name(name) {
                                return Err(TemplateError::UnresolvedPlaceholder {
                                    name: name.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn render(&self, scope: &RenderScope<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(Expr::Name(name)) => {
                    let value = scope
                        .lookup(name)
                        .ok_or_else(|| TemplateError::UnresolvedPlaceholder { name: name.clone() })?;
                    out.push_str(&value);
                }
                Segment::Placeholder(Expr::Call { function, args }) => {
                    out.push_str(&scope.call(function, args)?);
                }
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for ScriptTemplate {
    type Error = TemplateError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::parse(source)
    }
}

fn parse_expr(inner: &str) -> Result<Expr, TemplateError> {
    let malformed = |reason: &str| TemplateError::Malformed {
        expression: inner.to_string(),
        reason: reason.to_string(),
    };

    match inner.find('(') {
        None => {
            if is_identifier(inner) {
                Ok(Expr::Name(inner.to_string()))
            } else {
                Err(malformed("expected a name or a function call"))
            }
        }
        Some(open) => {
            let function = inner[..open].trim();
            if !is_identifier(function) {
                return Err(malformed("invalid function name"));
            }
            let body = inner[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| malformed("missing closing parenthesis"))?;
            let args = split_args(body)
                .map_err(|reason| malformed(&reason))?
                .into_iter()
                .map(|raw| parse_arg(&raw).map_err(|reason| malformed(&reason)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call {
                function: function.to_string(),
                args,
            })
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn split_args(body: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => args.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string argument".into());
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current);
    }
    Ok(args.into_iter().map(|a| a.trim().to_string()).collect())
}

fn parse_arg(raw: &str) -> Result<ExprArg, String> {
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return Ok(ExprArg::Text(raw[1..raw.len() - 1].to_string()));
    }
    if let Ok(number) = raw.parse::<i64>() {
        return Ok(ExprArg::Number(number));
    }
    if is_identifier(raw) {
        return Ok(ExprArg::Name(raw.to_string()));
    }
    Err(format!("invalid argument '{}'", raw))
}

/// Names every task can use regardless of its inputs.
pub fn is_context_name(name: &str) -> bool {
    matches!(
        name,
        "args"
            | "task.cpus"
            | "task.memory"
            | "task.memory_mb"
            | "task.process"
            | "task.tag"
            | "task.id"
            | "task.work_dir"
    )
}

/// Quote `value` for a POSIX shell unless it is made only of safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Everything a template can see while rendering.
pub struct RenderScope<'a> {
    pub context: &'a TaskContext,
    pub inputs: &'a BTreeMap<String, Vec<Artifact>>,
    pub params: &'a Params,
    pub functions: &'a TemplateFunctions,
}

impl RenderScope<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        let ctx = self.context;
        match name {
            "args" => return Some(ctx.ext_args.clone()),
            "task.cpus" => return Some(ctx.cpus.to_string()),
            "task.memory" => return Some(ctx.memory.as_gb().to_string()),
            "task.memory_mb" => return Some(ctx.memory.as_mb().to_string()),
            "task.process" => return Some(shell_quote(&ctx.process)),
            "task.tag" => return Some(shell_quote(ctx.tag.as_deref().unwrap_or_default())),
            "task.id" => return Some(shell_quote(&ctx.task_id)),
            "task.work_dir" => return Some(shell_quote(&ctx.work_dir.to_string_lossy())),
            _ => {}
        }
        if let Some(key) = name.strip_prefix("params.") {
            return self
                .params
                .get(key)
                .and_then(yaml_scalar)
                .map(|v| shell_quote(&v));
        }
        self.inputs.get(name).map(|artifacts| {
            artifacts
                .iter()
                .map(|a| shell_quote(&a.staged_name()))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    fn call(&self, function: &str, args: &[ExprArg]) -> Result<String, TemplateError> {
        let implementation =
            self.functions
                .get(function)
                .ok_or_else(|| TemplateError::UnknownFunction {
                    name: function.to_string(),
                })?;

        let resolved = args
            .iter()
            .map(|arg| match arg {
                ExprArg::Number(n) => Ok(TemplateArg::Number(*n)),
                ExprArg::Text(t) => Ok(TemplateArg::Text(t.clone())),
                ExprArg::Name(name) => match self.inputs.get(name) {
                    Some(artifacts) => Ok(TemplateArg::Artifacts(artifacts)),
                    None => self
                        .lookup(name)
                        .map(TemplateArg::Text)
                        .ok_or_else(|| TemplateError::UnresolvedPlaceholder { name: name.clone() }),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        implementation
            .call(&resolved, self.context)
            .map_err(|reason| TemplateError::FunctionFailed {
                function: function.to_string(),
                reason,
            })
    }
}

/// Argument handed to a template function.
#[derive(Debug)]
pub enum TemplateArg<'a> {
    Artifacts(&'a [Artifact]),
    Number(i64),
    Text(String),
}

impl<'a> TemplateArg<'a> {
    fn artifacts(&self) -> Result<&'a [Artifact], String> {
        match self {
            TemplateArg::Artifacts(artifacts) => Ok(artifacts),
            other => Err(format!("expected an input slot, got {:?}", other)),
        }
    }
}

/// A named, data-aware helper callable from templates.
pub trait TemplateFunction: Send + Sync {
    fn call(&self, args: &[TemplateArg<'_>], context: &TaskContext) -> Result<String, String>;
}

/// Registry of template functions by name.
#[derive(Clone)]
pub struct TemplateFunctions(HashMap<String, Arc<dyn TemplateFunction>>);

impl TemplateFunctions {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// `record_count`, `threads_above`, `prefix` and `basename`.
    pub fn builtin() -> Self {
        let mut functions = Self::empty();
        functions.register("record_count", Arc::new(RecordCount));
        functions.register("threads_above", Arc::new(ThreadsAbove));
        functions.register("prefix", Arc::new(Prefix));
        functions.register("basename", Arc::new(Basename));
        functions
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn TemplateFunction>) {
        self.0.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TemplateFunction>> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl Default for TemplateFunctions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for TemplateFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.0.keys().collect();
        names.sort();
        f.debug_struct("TemplateFunctions")
            .field("functions", &names)
            .finish()
    }
}

/// Number of FASTA records (header lines starting with `>`) in a file.
pub fn count_fasta_records(path: &Path) -> std::io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if line?.starts_with('>') {
            count += 1;
        }
    }
    Ok(count)
}

fn total_records(artifacts: &[Artifact]) -> Result<usize, String> {
    let mut total = 0;
    for artifact in artifacts {
        let path = artifact
            .path()
            .ok_or_else(|| "record counting needs file inputs".to_string())?;
        total += count_fasta_records(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    }
    Ok(total)
}

/// Thread count for tools that crash on tiny alignments when run in
/// parallel: the full allocation when `records > threshold`, otherwise 1.
pub fn threads_for_records(records: usize, threshold: usize, cpus: usize) -> usize {
    if records > threshold {
        cpus.max(1)
    } else {
        1
    }
}

struct RecordCount;

impl TemplateFunction for RecordCount {
    fn call(&self, args: &[TemplateArg<'_>], _context: &TaskContext) -> Result<String, String> {
        let [slot] = args else {
            return Err("record_count(slot) takes exactly one argument".into());
        };
        Ok(total_records(slot.artifacts()?)?.to_string())
    }
}

struct ThreadsAbove;

impl TemplateFunction for ThreadsAbove {
    fn call(&self, args: &[TemplateArg<'_>], context: &TaskContext) -> Result<String, String> {
        let (slot, threshold) = match args {
            [slot] => (slot, DEFAULT_THREAD_THRESHOLD),
            [slot, TemplateArg::Number(n)] if *n >= 0 => (slot, *n as usize),
            _ => return Err("threads_above(slot[, threshold]) expects a slot and a non-negative threshold".into()),
        };
        let records = total_records(slot.artifacts()?)?;
        Ok(threads_for_records(records, threshold, context.cpus).to_string())
    }
}

struct Prefix;

impl TemplateFunction for Prefix {
    fn call(&self, args: &[TemplateArg<'_>], _context: &TaskContext) -> Result<String, String> {
        let [slot] = args else {
            return Err("prefix(slot) takes exactly one argument".into());
        };
        let first = slot
            .artifacts()?
            .first()
            .ok_or_else(|| "prefix() of an empty input".to_string())?;
        Ok(shell_quote(&identifying_prefix(&first.staged_name())))
    }
}

/// Text before the first `_`, or the name without its last extension.
pub fn identifying_prefix(file_name: &str) -> String {
    match file_name.split_once('_') {
        Some((prefix, _)) if !prefix.is_empty() => prefix.to_string(),
        _ => Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string()),
    }
}

struct Basename;

impl TemplateFunction for Basename {
    fn call(&self, args: &[TemplateArg<'_>], _context: &TaskContext) -> Result<String, String> {
        let (slot, suffix) = match args {
            [slot] => (slot, ""),
            [slot, TemplateArg::Text(suffix)] => (slot, suffix.as_str()),
            _ => return Err("basename(slot[, 'suffix']) expects a slot and a quoted suffix".into()),
        };
        let first = slot
            .artifacts()?
            .first()
            .ok_or_else(|| "basename() of an empty input".to_string())?;
        let name = first.staged_name();
        let trimmed = name.strip_suffix(suffix).unwrap_or(&name);
        Ok(shell_quote(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Memory;
    use std::io::Write;
    use std::path::PathBuf;

    fn context(cpus: usize) -> TaskContext {
        TaskContext {
            task_id: "tree@speciesA_T1".into(),
            process: "FASTTREE".into(),
            tag: Some("speciesA".into()),
            cpus,
            memory: Memory::from_gb(36),
            work_dir: PathBuf::from("/work/tree"),
            ext_args: "-gtr -nt".into(),
        }
    }

    fn fasta_with(records: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("speciesA_")
            .suffix(".fa")
            .tempfile()
            .unwrap();
        for i in 0..records {
            writeln!(file, ">seq{}\nACGTACGT", i).unwrap();
        }
        file
    }

    fn render(template: &str, inputs: &BTreeMap<String, Vec<Artifact>>, cpus: usize) -> Result<String, TemplateError> {
        let ctx = context(cpus);
        let params: Params = serde_yaml::from_str("outgroup: 'Homo sapiens'\nbootstraps: 100").unwrap();
        let functions = TemplateFunctions::builtin();
        let scope = RenderScope {
            context: &ctx,
            inputs,
            params: &params,
            functions: &functions,
        };
        ScriptTemplate::parse(template)?.render(&scope)
    }

    #[test]
    fn test_parse_segments() {
        let template = ScriptTemplate::parse("mafft --thread {{ task.cpus }} {{args}} {{ fasta }}").unwrap();
        let names: Vec<_> = template.placeholders().cloned().collect();
        assert_eq!(
            names,
            vec![
                Expr::Name("task.cpus".into()),
                Expr::Name("args".into()),
                Expr::Name("fasta".into())
            ]
        );
    }

    #[test]
    fn test_parse_call_arguments() {
        let template = ScriptTemplate::parse("{{ basename(fasta, '_mafft.fa') }} {{ threads_above(aln, 14) }}").unwrap();
        let exprs: Vec<_> = template.placeholders().cloned().collect();
        assert_eq!(
            exprs[0],
            Expr::Call {
                function: "basename".into(),
                args: vec![ExprArg::Name("fasta".into()), ExprArg::Text("_mafft.fa".into())]
            }
        );
        assert_eq!(
            exprs[1],
            Expr::Call {
                function: "threads_above".into(),
                args: vec![ExprArg::Name("aln".into()), ExprArg::Number(14)]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ScriptTemplate::parse("echo {{ fasta").unwrap_err(),
            TemplateError::Unterminated { offset: 5 }
        );
        assert!(matches!(
            ScriptTemplate::parse("{{ not a name }}").unwrap_err(),
            TemplateError::Malformed { .. }
        ));
        assert!(matches!(
            ScriptTemplate::parse("{{ prefix(fasta }}").unwrap_err(),
            TemplateError::Malformed { .. }
        ));
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let out = render("echo ${HOME} $(date) {{ task.cpus }}", &BTreeMap::new(), 4).unwrap();
        assert_eq!(out, "echo ${HOME} $(date) 4");
    }

    #[test]
    fn test_render_context_params_and_args() {
        let out = render(
            "FastTree {{ args }} -boot {{ params.bootstraps }} -o {{ params.outgroup }} # {{ task.process }} {{ task.memory }}",
            &BTreeMap::new(),
            2,
        )
        .unwrap();
        assert_eq!(out, "FastTree -gtr -nt -boot 100 -o 'Homo sapiens' # FASTTREE 36");
    }

    #[test]
    fn test_unresolved_placeholder() {
        let err = render("echo {{ missing }}", &BTreeMap::new(), 1).unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedPlaceholder { name: "missing".into() });

        let err = render("echo {{ params.missing }}", &BTreeMap::new(), 1).unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedPlaceholder { name: "params.missing".into() });
    }

    #[test]
    fn test_unknown_function() {
        let err = render("{{ shout(fasta) }}", &BTreeMap::new(), 1).unwrap_err();
        assert_eq!(err, TemplateError::UnknownFunction { name: "shout".into() });
    }

    #[test]
    fn test_inputs_render_as_staged_names() {
        let inputs = BTreeMap::from([(
            "fasta".to_string(),
            vec![
                Artifact::file("/data/sets/speciesA_proteins.fa"),
                Artifact::file("/data/sets/odd name.fa"),
            ],
        )]);
        let out = render("cat {{ fasta }}", &inputs, 1).unwrap();
        assert_eq!(out, "cat speciesA_proteins.fa 'odd name.fa'");
    }

    #[test]
    fn test_threads_above_boundary() {
        for (records, expected) in [(14, "1"), (15, "8")] {
            let file = fasta_with(records);
            let inputs = BTreeMap::from([("aln".to_string(), vec![Artifact::file(file.path())])]);
            let out = render("{{ threads_above(aln) }}", &inputs, 8).unwrap();
            assert_eq!(out, expected, "records = {}", records);
        }
    }

    #[test]
    fn test_threads_for_records_is_monotonic() {
        let mut previous = 0;
        for records in 0..40 {
            let threads = threads_for_records(records, DEFAULT_THREAD_THRESHOLD, 8);
            assert!(threads >= previous);
            previous = threads;
        }
        assert_eq!(threads_for_records(0, 14, 0), 1);
    }

    #[test]
    fn test_record_count_and_prefix() {
        let file = fasta_with(10);
        let inputs = BTreeMap::from([("fasta".to_string(), vec![Artifact::file(file.path())])]);
        let out = render("{{ record_count(fasta) }} {{ prefix(fasta) }}", &inputs, 1).unwrap();
        assert_eq!(out, "10 speciesA");
    }

    #[test]
    fn test_record_count_of_missing_file_fails() {
        let inputs = BTreeMap::from([(
            "fasta".to_string(),
            vec![Artifact::file("/definitely/not/here.fa")],
        )]);
        let err = render("{{ record_count(fasta) }}", &inputs, 1).unwrap_err();
        assert!(matches!(err, TemplateError::FunctionFailed { .. }));
    }

    #[test]
    fn test_identifying_prefix() {
        assert_eq!(identifying_prefix("speciesA_mafft.fa"), "speciesA");
        assert_eq!(identifying_prefix("alignment.fa"), "alignment");
        assert_eq!(identifying_prefix("_hidden.fa"), "_hidden");
    }

    #[test]
    fn test_basename_strips_suffix() {
        let inputs = BTreeMap::from([(
            "msa".to_string(),
            vec![Artifact::file("/work/align/speciesA_mafft.fa")],
        )]);
        let out = render("{{ basename(msa, '_mafft.fa') }}", &inputs, 1).unwrap();
        assert_eq!(out, "speciesA");
    }

    #[test]
    fn test_check_reports_unknown_names() {
        let template = ScriptTemplate::parse("{{ prefix(fasta) }} {{ task.cpus }} {{ alignment }}").unwrap();
        let functions = TemplateFunctions::builtin();
        let known = |name: &str| is_context_name(name) || name == "fasta";
        assert_eq!(
            template.check(known, &functions).unwrap_err(),
            TemplateError::UnresolvedPlaceholder { name: "alignment".into() }
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-name_1.fa"), "plain-name_1.fa");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
