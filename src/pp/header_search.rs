//! Include resolution through an injected source locator.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use log::debug;
use symbol_table::GlobalSymbol as Symbol;

use crate::error::{Error, Result};

/// An opened source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub text: String,
    /// Resolved path; becomes the file name of every token lexed from `text`
    pub path: Symbol,
}

/// Where `#include` finds its files.
pub trait SourceLocator {
    /// Open `path` as named by an include directive in `current_file`.
    /// `system` is true for the `<...>` form.
    fn open(&self, path: &str, system: bool, current_file: Option<Symbol>) -> Result<SourceFile>;
}

fn parent_dir(file: Option<Symbol>) -> PathBuf {
    file.and_then(|f| Path::new(f.as_str()).parent().map(Path::to_path_buf))
        .unwrap_or_default()
}

/// In-memory file map.
#[derive(Debug, Clone, Default)]
pub struct VirtualSourceLocator {
    files: HashMap<String, String>,
}

impl VirtualSourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.add_file(path, text);
        self
    }
}

impl SourceLocator for VirtualSourceLocator {
    fn open(&self, path: &str, system: bool, current_file: Option<Symbol>) -> Result<SourceFile> {
        // quoted names are tried next to the including file first
        let relative = (!system)
            .then(|| parent_dir(current_file).join(path))
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().into_owned());
        let candidates = relative.into_iter().chain(std::iter::once(path.to_string()));
        for candidate in candidates {
            if let Some(text) = self.files.get(&candidate) {
                debug!("resolved include '{}' to virtual file '{}'", path, candidate);
                return Ok(SourceFile {
                    text: text.clone(),
                    path: Symbol::new(&candidate),
                });
            }
        }
        Err(Error::not_found(None, format!("'{}' file not found", path)))
    }
}

/// Manages header search paths and include resolution on disk
#[derive(Debug, Clone, Default)]
pub struct FilesystemSourceLocator {
    pub system_paths: Vec<PathBuf>,
    pub quoted_paths: Vec<PathBuf>,
    pub angled_paths: Vec<PathBuf>,
}

impl FilesystemSourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system include path
    pub fn add_system_path(&mut self, path: impl Into<PathBuf>) {
        self.system_paths.push(path.into());
    }

    /// Add a quoted include path (-iquote)
    pub fn add_quoted_path(&mut self, path: impl Into<PathBuf>) {
        self.quoted_paths.push(path.into());
    }

    /// Add an angled include path (-I)
    pub fn add_angled_path(&mut self, path: impl Into<PathBuf>) {
        self.angled_paths.push(path.into());
    }

    /// Resolve an include path against the search directories
    pub fn resolve_path(&self, include_path: &str, system: bool, current_dir: &Path) -> Option<PathBuf> {
        if system {
            // angled: -I paths, then system paths
            self.check_paths(&self.angled_paths, include_path)
                .or_else(|| self.check_paths(&self.system_paths, include_path))
        } else {
            // quoted: current directory, then -iquote, -I and system paths
            let candidate = current_dir.join(include_path);
            if candidate.is_file() {
                return Some(candidate);
            }
            self.check_paths(&self.quoted_paths, include_path)
                .or_else(|| self.check_paths(&self.angled_paths, include_path))
                .or_else(|| self.check_paths(&self.system_paths, include_path))
        }
    }

    fn check_paths(&self, paths: &[PathBuf], include_path: &str) -> Option<PathBuf> {
        paths
            .iter()
            .map(|dir| dir.join(include_path))
            .find(|candidate| candidate.is_file())
    }
}

impl SourceLocator for FilesystemSourceLocator {
    fn open(&self, path: &str, system: bool, current_file: Option<Symbol>) -> Result<SourceFile> {
        let current_dir = parent_dir(current_file);
        let resolved = self
            .resolve_path(path, system, &current_dir)
            .ok_or_else(|| Error::not_found(None, format!("'{}' file not found", path)))?;
        let text = std::fs::read_to_string(&resolved)
            .map_err(|e| Error::not_found(None, format!("cannot read '{}': {}", resolved.display(), e)))?;
        debug!("resolved include '{}' to '{}'", path, resolved.display());
        Ok(SourceFile {
            text,
            path: Symbol::new(&resolved.to_string_lossy()),
        })
    }
}
