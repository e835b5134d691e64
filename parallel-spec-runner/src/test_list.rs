// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collecting test files from the paths passed in on the command line.

use crate::errors::TestListError;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use tracing::debug;

/// The ordered, de-duplicated list of test files for a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestList {
    tests: Vec<String>,
}

impl TestList {
    /// The directory searched if no paths are passed in.
    pub const DEFAULT_DIR: &'static str = "spec";

    /// Creates a new test list from test IDs, removing duplicates.
    pub fn new(tests: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut seen = HashSet::new();
        let tests = tests
            .into_iter()
            .map(Into::into)
            .filter(|test| seen.insert(test.clone()))
            .collect();
        Self { tests }
    }

    /// Expands `paths` relative to `root` into a list of test files.
    ///
    /// Files are taken verbatim. Directories are walked recursively in sorted order, and files
    /// ending in `suffix` are collected. If `paths` is empty, [`Self::DEFAULT_DIR`] is used.
    ///
    /// Test IDs are the paths as given (or as found under the given directory), not resolved
    /// against `root`, so that they match what the worker expects on its command line.
    pub fn from_paths(
        root: &Utf8Path,
        paths: &[Utf8PathBuf],
        suffix: &str,
    ) -> Result<Self, TestListError> {
        let default_paths = [Utf8PathBuf::from(Self::DEFAULT_DIR)];
        let paths = if paths.is_empty() {
            &default_paths[..]
        } else {
            paths
        };

        let mut tests = Vec::new();
        for path in paths {
            let resolved = root.join(path);
            if resolved.is_file() {
                tests.push(path.to_string());
            } else if resolved.is_dir() {
                collect_dir(root, path, suffix, &mut tests)?;
            } else {
                return Err(TestListError::PathNotFound { path: path.clone() });
            }
        }

        debug!(count = tests.len(), "collected test files");
        Ok(Self::new(tests))
    }

    /// Returns the number of tests.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if there are no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Returns the tests in order.
    pub fn tests(&self) -> &[String] {
        &self.tests
    }
}

fn collect_dir(
    root: &Utf8Path,
    dir: &Utf8Path,
    suffix: &str,
    tests: &mut Vec<String>,
) -> Result<(), TestListError> {
    let resolved = root.join(dir);
    for entry in walkdir::WalkDir::new(&resolved).sort_by_file_name() {
        let entry = entry.map_err(|err| TestListError::WalkDir {
            path: dir.to_owned(),
            err,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let found = entry.path();
        let relative = found.strip_prefix(&resolved).unwrap_or(found);
        let relative =
            Utf8Path::from_path(relative).ok_or_else(|| TestListError::NonUtf8Path {
                path: dir.to_owned(),
                found: found.to_owned(),
            })?;
        if relative.as_str().ends_with(suffix) {
            tests.push(dir.join(relative).into_string());
        }
    }

    Ok(())
}
