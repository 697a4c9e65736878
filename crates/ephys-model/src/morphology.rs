// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cell morphologies.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ModelResult;
use crate::host::{CellHandle, Simulator};

/// Geometry loaded into a live cell
pub trait Morphology: Send + Sync + fmt::Debug {
    fn morphology_path(&self) -> &Path;

    /// Whether the axon is swapped for a two-section stub after loading
    fn do_replace_axon(&self) -> bool;

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()>;

    fn destroy(&self, _sim: &dyn Simulator) -> ModelResult<()> {
        Ok(())
    }
}

/// Morphology read from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMorphology {
    path: PathBuf,
    do_replace_axon: bool,
}

impl FileMorphology {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            do_replace_axon: false,
        }
    }

    pub fn with_replace_axon(mut self, replace: bool) -> Self {
        self.do_replace_axon = replace;
        self
    }

    /// Directory and file name, as handed to template constructors
    pub fn split_path(&self) -> (String, Option<String>) {
        split_morphology_path(&self.path)
    }
}

/// `("dir", Some("file"))`; the directory is `.` when the path has none
pub fn split_morphology_path(path: &Path) -> (String, Option<String>) {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let dir = match (file.is_some(), path.parent()) {
        (true, Some(parent)) if !parent.as_os_str().is_empty() => {
            parent.to_string_lossy().into_owned()
        }
        (true, _) => ".".to_string(),
        (false, _) => path.to_string_lossy().into_owned(),
    };
    (dir, file)
}

impl Morphology for FileMorphology {
    fn morphology_path(&self) -> &Path {
        &self.path
    }

    fn do_replace_axon(&self) -> bool {
        self.do_replace_axon
    }

    fn instantiate(&self, sim: &dyn Simulator, cell: CellHandle) -> ModelResult<()> {
        sim.load_morphology(cell, &self.path)?;
        if self.do_replace_axon {
            sim.replace_axon(cell)?;
        }
        debug!(
            target: "ephys_model::morphology",
            "Loaded {} into {} (replace_axon={})",
            self.path.display(),
            cell,
            self.do_replace_axon
        );
        Ok(())
    }
}

impl fmt::Display for FileMorphology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_morphology_path(Path::new("morphs/cell.swc")),
            ("morphs".to_string(), Some("cell.swc".to_string()))
        );
        assert_eq!(
            split_morphology_path(Path::new("cell.asc")),
            (".".to_string(), Some("cell.asc".to_string()))
        );
        assert_eq!(split_morphology_path(Path::new(".")), (".".to_string(), None));
    }

    #[test]
    fn test_replace_axon_flag() {
        let morphology = FileMorphology::new("cell.swc");
        assert!(!morphology.do_replace_axon());
        assert!(morphology.with_replace_axon(true).do_replace_axon());
    }
}
