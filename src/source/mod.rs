//! Source location of test and benchmark functions
//!
//! A caller location (captured with `#[track_caller]`) names the file a case
//! was declared or started from. The [`SourceLocator`] resolves that file on
//! disk and asks a [`SourceIndex`] for the line range of the declared
//! function, caching the answer per (file, function) for the rest of the
//! process.
//!
//! ```text
//! Location { file: "tests/sort.rs", .. } + "bench_sort"
//!        │
//!        ▼ resolve path (as-is, search roots, CARGO_MANIFEST_DIR ancestors)
//!   /work/crate/tests/sort.rs
//!        │
//!        ▼ SourceIndex::function_bounds
//!   SourceBound { file, start_line: 12, end_line: 30 }  → "file:12:30"
//! ```

mod syn_index;

pub use syn_index::SynIndex;

use std::collections::HashMap;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::metrics::SOURCE_UNRESOLVED;

/// Lines spanned by a function in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBound {
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
}

impl std::fmt::Display for SourceBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.start_line, self.end_line)
    }
}

/// Error looking up a function's source bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The caller's file could not be found on disk
    Unresolved { file: String },
    Io { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    NotFound { path: PathBuf, function: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unresolved { file } => write!(f, "Source file not found: {}", file),
            SourceError::Io { path, message } => {
                write!(f, "Failed to read {}: {}", path.display(), message)
            }
            SourceError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
            SourceError::NotFound { path, function } => {
                write!(f, "Function {} not found in {}", function, path.display())
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Static source index: maps a function in a file to its line range
pub trait SourceIndex: Send + Sync {
    fn function_bounds(&self, file: &Path, function_name: &str) -> Result<(u32, u32), SourceError>;
}

/// Cached resolver from caller location + function name to [`SourceBound`]
pub struct SourceLocator {
    index: Box<dyn SourceIndex>,
    search_roots: Vec<PathBuf>,
    cache: RwLock<HashMap<(String, String), Option<SourceBound>>>,
}

impl SourceLocator {
    pub fn new(index: Box<dyn SourceIndex>) -> Self {
        Self {
            index,
            search_roots: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Additional directory to resolve relative caller paths against
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.push(root.into());
        self
    }

    /// Source bound of `function_name` in the file of `caller`.
    ///
    /// Failures are logged and cached as `None`; they never propagate.
    pub fn locate(&self, caller: &Location<'_>, function_name: &str) -> Option<SourceBound> {
        let key = (caller.file().to_string(), function_name.to_string());
        self.cached(key, function_name, || self.lookup(caller.file(), function_name))
    }

    /// Source bound for a call site.
    ///
    /// A site that names its declared function is looked up through that
    /// function's module path, so a function registered from one file but
    /// defined in another is still found. Other sites fall back to
    /// [`locate`](Self::locate) with `function_name`.
    pub fn locate_site(&self, site: &CallSite, function_name: &str) -> Option<SourceBound> {
        let (Some(path), Some((modules, name))) = (site.function, site.function_parts()) else {
            return self.locate(site.location, function_name);
        };
        let key = (site.location.file().to_string(), path.to_string());
        self.cached(key, name, || {
            self.lookup_declared(site.location.file(), &modules, name)
        })
    }

    fn cached<F>(&self, key: (String, String), function_name: &str, lookup: F) -> Option<SourceBound>
    where
        F: FnOnce() -> Result<SourceBound, SourceError>,
    {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone();
        }

        let bound = match lookup() {
            Ok(bound) => Some(bound),
            Err(e) => {
                SOURCE_UNRESOLVED.inc();
                debug!(error = %e, function = function_name, "Source bound unavailable");
                None
            }
        };

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(bound)
            .clone()
    }

    /// Try the module files of `modules` around `caller_file`, then the
    /// caller file itself; first hit wins.
    fn lookup_declared(
        &self,
        caller_file: &str,
        modules: &[&str],
        function_name: &str,
    ) -> Result<SourceBound, SourceError> {
        let mut last_error = None;
        for candidate in module_candidates(caller_file, modules) {
            match self.lookup(&candidate, function_name) {
                Ok(bound) => return Ok(bound),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| SourceError::Unresolved {
            file: caller_file.to_string(),
        }))
    }

    fn lookup(&self, file: &str, function_name: &str) -> Result<SourceBound, SourceError> {
        let path = self.resolve_path(file).ok_or_else(|| SourceError::Unresolved {
            file: file.to_string(),
        })?;
        let (start_line, end_line) = self.index.function_bounds(&path, function_name)?;
        Ok(SourceBound {
            file: path,
            start_line,
            end_line,
        })
    }

    fn resolve_path(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }

        // Caller paths are relative to the workspace root, which is the
        // manifest dir or one of its ancestors.
        let manifest_roots = std::env::var_os("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .into_iter()
            .flat_map(|dir| dir.ancestors().map(Path::to_path_buf).collect::<Vec<_>>());

        self.search_roots
            .iter()
            .cloned()
            .chain(manifest_roots)
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
            .or_else(|| path.is_file().then(|| path.to_path_buf()))
    }
}

/// Where a case was started from, plus the declared function when known
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub location: &'static Location<'static>,
    /// Full path of the declared function item, e.g. `suite::sorting::bench_sort`
    pub function: Option<&'static str>,
}

impl CallSite {
    pub fn declared(location: &'static Location<'static>, function: &'static str) -> Self {
        Self {
            location,
            function: Some(function),
        }
    }

    /// Module segments (crate name dropped) and the function identifier.
    ///
    /// `None` for closures and anything that is not a plain item path.
    pub fn function_parts(&self) -> Option<(Vec<&'static str>, &'static str)> {
        let path = self.function?;
        if path.contains(|c: char| matches!(c, '{' | '<' | ' ' | '(' | '&')) {
            return None;
        }
        let segments: Vec<&'static str> = path.split("::").collect();
        let (name, rest) = segments.split_last()?;
        let modules = rest.iter().skip(1).copied().collect();
        Some((modules, *name))
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            location,
            function: None,
        }
    }
}

/// Files that may hold module `modules` as seen from `caller_file`.
///
/// Covers `dir/a/b.rs` and `dir/a/b/mod.rs` relative to the caller's
/// directory, to `dir/<caller stem>/` for non-root files, and to `src/`.
/// The caller file itself comes last, for inline modules and crate-root
/// functions.
fn module_candidates(caller_file: &str, modules: &[&str]) -> Vec<String> {
    let caller = Path::new(caller_file);
    let mut candidates = Vec::new();

    if !modules.is_empty() {
        let dir = caller.parent().unwrap_or_else(|| Path::new(""));
        let mut bases = vec![dir.to_path_buf()];
        if let Some(stem) = caller.file_stem().and_then(|s| s.to_str()) {
            if !matches!(stem, "mod" | "lib" | "main") {
                bases.push(dir.join(stem));
            }
        }
        bases.push(PathBuf::from("src"));

        let relative = modules.join("/");
        for base in bases {
            candidates.push(base.join(format!("{}.rs", relative)));
            candidates.push(base.join(&relative).join("mod.rs"));
        }
    }
    candidates.push(caller.to_path_buf());

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

impl std::fmt::Debug for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLocator")
            .field("search_roots", &self.search_roots)
            .finish()
    }
}
