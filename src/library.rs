//! Filesystem discovery and YAML loading of test-suite files and
//! executor libraries.
//!
//! Everything here fails before any step executes: a missing or
//! malformed file is a configuration error, not a test failure.

use crate::model::{Executor, TestSuite};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve a test path into the ordered list of suite files.
///
/// A file is taken as-is; a directory is walked recursively for
/// YAML files, sorted so batch order is deterministic.
pub fn collect_test_files<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("test path not found: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_yaml_files(path, &mut files)?;
    files.sort();
    if files.is_empty() {
        bail!("no test files found under {}", path.display());
    }
    Ok(files)
}

/// Resolve a library path. Unlike a test path, this must be a
/// directory.
pub fn collect_library_files<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.exists() {
        bail!("library path not found: {}", path.display());
    }
    if !path.is_dir() {
        bail!(
            "library path has to be a directory and not a file: {}",
            path.display()
        );
    }

    let mut files = Vec::new();
    collect_yaml_files(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_yaml_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).context(format!(
        "failed to read directory: {}",
        dir.display()
    ))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, files)?;
        } else if is_yaml_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Load a single test-suite document.
pub fn load_suite<P: AsRef<Path>>(path: P) -> Result<TestSuite> {
    let path = path.as_ref();
    info!("Loading test suite from {}", path.display());

    let content = fs::read_to_string(path).context(format!(
        "failed to read test file: {}",
        path.display()
    ))?;
    let suite = TestSuite::from_yaml(&content).context(format!(
        "failed to parse test suite from {}",
        path.display()
    ))?;

    debug!("Loaded test suite: {}", suite.name);
    Ok(suite)
}

/// Load a single executor library document.
pub fn load_executor<P: AsRef<Path>>(path: P) -> Result<Executor> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).context(format!(
        "failed to read library file: {}",
        path.display()
    ))?;
    let executor = Executor::from_yaml(&content).context(format!(
        "failed to parse executor from {}",
        path.display()
    ))?;

    debug!("Loaded executor: {}", executor.executor);
    Ok(executor)
}

/// Load every executor document in a library file list.
pub fn load_library(files: &[PathBuf]) -> Result<Vec<Executor>> {
    let executors = files
        .iter()
        .map(load_executor)
        .collect::<Result<Vec<_>>>()?;
    info!("Loaded {} executor(s)", executors.len());
    Ok(executors)
}
