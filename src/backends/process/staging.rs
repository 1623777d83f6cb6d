// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Moving files into and out of a task's scratch directory.

use crate::config::consts::{COMMAND_EXIT_CODE, COMMAND_SCRIPT};
use crate::process::{OutputDecl, ResolvedTask};
use crate::utils::glob_to_regex;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of the scratch directory created inside each work dir.
pub const SCRATCH_PREFIX: &str = ".scratch-";

/// What staging put into the scratch directory.
#[derive(Debug, Default)]
pub struct StagedInputs {
    /// Top-level names occupied by inputs, never reported as outputs
    pub names: HashSet<String>,
    /// Directories holding the real input files, for container mounts
    pub source_dirs: BTreeSet<PathBuf>,
}

/// Link (or on non-unix hosts, copy) every file input into `scratch` under
/// its staged name.
pub fn stage_inputs(task: &ResolvedTask, scratch: &Path) -> io::Result<StagedInputs> {
    let mut staged = StagedInputs::default();
    for artifact in task.input_artifacts() {
        let Some(path) = artifact.path() else {
            continue;
        };
        let source = fs::canonicalize(path)?;
        let name = artifact.staged_name();
        if !staged.names.insert(name.clone()) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("two inputs are staged as '{}'", name),
            ));
        }
        if let Some(parent) = source.parent() {
            staged.source_dirs.insert(parent.to_path_buf());
        }
        link_or_copy(&source, &scratch.join(&name))?;
    }
    Ok(staged)
}

#[cfg(unix)]
fn link_or_copy(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(not(unix))]
fn link_or_copy(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

/// Bookkeeping files that are never outputs.
fn is_bookkeeping(name: &str) -> bool {
    name.starts_with(".command") || name == COMMAND_EXIT_CODE || name.starts_with(SCRATCH_PREFIX)
}

/// Relative `/`-separated paths of every regular file under `root`, sorted.
/// Top-level entries named in `exclude` and bookkeeping files are skipped.
pub fn list_files(root: &Path, exclude: &HashSet<String>) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if prefix.is_empty() && (exclude.contains(&name) || is_bookkeeping(&name)) {
                continue;
            }
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else if file_type.is_file() {
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Matches per output declaration, in declaration order.
#[derive(Debug)]
pub struct OutputMatches {
    pub matched: Vec<Vec<String>>,
    /// Patterns that matched nothing
    pub missing: Vec<String>,
}

pub fn match_outputs(files: &[String], outputs: &[OutputDecl]) -> OutputMatches {
    let mut matched = Vec::with_capacity(outputs.len());
    let mut missing = Vec::new();
    for decl in outputs {
        let hits: Vec<String> = match glob_to_regex(&decl.pattern) {
            Ok(re) => files.iter().filter(|f| re.is_match(f)).cloned().collect(),
            Err(_) => Vec::new(),
        };
        if hits.is_empty() {
            missing.push(decl.pattern.clone());
        }
        matched.push(hits);
    }
    OutputMatches { matched, missing }
}

/// Move `relative` from `from` to `to`, creating parent directories.
pub fn move_file(from: &Path, to: &Path, relative: &str) -> io::Result<PathBuf> {
    let source = from.join(relative);
    let target = to.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(&source, &target).is_err() {
        fs::copy(&source, &target)?;
        fs::remove_file(&source)?;
    }
    Ok(target)
}

/// Remove everything a previous attempt left in `work_dir`.
pub fn reset_work_dir(work_dir: &Path) -> io::Result<()> {
    if work_dir.exists() {
        fs::remove_dir_all(work_dir)?;
    }
    fs::create_dir_all(work_dir)
}

/// Whether `work_dir` holds a finished, successful run of exactly `script`.
pub fn is_reusable(work_dir: &Path, script: &str) -> bool {
    let exit_ok = fs::read_to_string(work_dir.join(COMMAND_EXIT_CODE))
        .map(|code| code.trim() == "0")
        .unwrap_or(false);
    let same_script = fs::read_to_string(work_dir.join(COMMAND_SCRIPT))
        .map(|previous| previous == script)
        .unwrap_or(false);
    exit_ok && same_script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_list_files_skips_inputs_and_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "speciesA_mafft.fa");
        touch(dir.path(), "input.fa");
        touch(dir.path(), ".command.sh");
        touch(dir.path(), ".command.version");
        touch(dir.path(), "logs/run.log");

        let exclude = HashSet::from(["input.fa".to_string()]);
        let files = list_files(dir.path(), &exclude).unwrap();
        assert_eq!(files, vec!["logs/run.log", "speciesA_mafft.fa"]);
    }

    #[test]
    fn test_match_outputs_reports_missing_patterns() {
        let files = vec!["a_ft.treefile".to_string(), "b.log".to_string()];
        let outputs = vec![
            OutputDecl::file("phylogeny", "*.treefile"),
            OutputDecl::file("fas", "*_mafft.fa"),
        ];
        let result = match_outputs(&files, &outputs);
        assert_eq!(result.matched[0], vec!["a_ft.treefile"]);
        assert!(result.matched[1].is_empty());
        assert_eq!(result.missing, vec!["*_mafft.fa"]);
    }

    #[test]
    fn test_move_file_creates_parents() {
        let from = tempfile::tempdir().unwrap();
        let to = tempfile::tempdir().unwrap();
        touch(from.path(), "nested/out.txt");

        let moved = move_file(from.path(), to.path(), "nested/out.txt").unwrap();
        assert!(moved.exists());
        assert!(!from.path().join("nested/out.txt").exists());
    }

    #[test]
    fn test_is_reusable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(COMMAND_SCRIPT), "echo hi\n").unwrap();
        assert!(!is_reusable(dir.path(), "echo hi\n"));

        fs::write(dir.path().join(COMMAND_EXIT_CODE), "0\n").unwrap();
        assert!(is_reusable(dir.path(), "echo hi\n"));
        assert!(!is_reusable(dir.path(), "echo bye\n"));

        fs::write(dir.path().join(COMMAND_EXIT_CODE), "1\n").unwrap();
        assert!(!is_reusable(dir.path(), "echo hi\n"));
    }
}
