//! Symbol sources: a dynamically loaded engine library or an in-memory
//! symbol table for engines linked into the process.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;

/// Failure to obtain a usable engine surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("engine library not found: {0}")]
    LibraryNotFound(String),
    #[error("failed to load {path}: {reason}")]
    LoadFailed { path: String, reason: String },
    #[error("symbol `{symbol}` not found in {library}")]
    MissingSymbol { library: String, symbol: String },
    #[error("engine version {found} is not compatible with {required}")]
    IncompatibleVersion { found: String, required: String },
}

/// Anything that can resolve an entry point name to an address.
pub trait SymbolSource {
    /// Human-readable origin, used in diagnostics.
    fn describe(&self) -> String;

    fn lookup(&self, symbol: &str) -> Option<*const c_void>;
}

/// Resolve `symbol` or fail with a diagnosable error.
pub(crate) fn require(source: &dyn SymbolSource, symbol: &str) -> Result<*const c_void, LoadError> {
    match source.lookup(symbol) {
        Some(ptr) if !ptr.is_null() => Ok(ptr),
        _ => Err(LoadError::MissingSymbol {
            library: source.describe(),
            symbol: symbol.to_string(),
        }),
    }
}

/// A loaded shared library.
pub struct NativeLibrary {
    path: PathBuf,
    library: Library,
}

impl NativeLibrary {
    /// Open the library at an already-resolved path.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialisers. The caller must trust it.
    pub unsafe fn open(path: &Path) -> Result<Self, LoadError> {
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for NativeLibrary {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn lookup(&self, symbol: &str) -> Option<*const c_void> {
        let mut name = Vec::with_capacity(symbol.len() + 1);
        name.extend_from_slice(symbol.as_bytes());
        name.push(0);
        // Only the address is read here. The typed view is made by the surface.
        let sym = unsafe { self.library.get::<*const c_void>(&name) }.ok()?;
        Some(*sym)
    }
}

/// Name → address table for an engine linked into the current binary.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    name: String,
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, address: *const c_void) {
        self.symbols.insert(symbol.into(), address as usize);
    }

    pub fn remove(&mut self, symbol: &str) -> bool {
        self.symbols.remove(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, *const c_void)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (S, *const c_void)>>(iter: I) -> Self {
        let mut table = SymbolTable::new("in-process engine");
        for (name, address) in iter {
            table.insert(name, address);
        }
        table
    }
}

impl SymbolSource for SymbolTable {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn lookup(&self, symbol: &str) -> Option<*const c_void> {
        self.symbols.get(symbol).map(|addr| *addr as *const c_void)
    }
}

/// Platform library search directories, current directory first.
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/lib"));
        if cfg!(target_pointer_width = "64") {
            paths.push(PathBuf::from("/usr/lib64"));
            paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
        paths.push(PathBuf::from("/usr/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(system_root) = std::env::var("SystemRoot") {
            paths.push(PathBuf::from(format!("{system_root}\\System32")));
        }
    }

    paths
}

/// Turn a bare library name (`toxcore`) or a path into an existing file path.
pub fn resolve_library_path(name: &str) -> Result<PathBuf, LoadError> {
    let direct = Path::new(name);
    if direct.components().count() > 1 || direct.extension().is_some() {
        return if direct.exists() {
            Ok(direct.canonicalize().unwrap_or_else(|_| direct.to_path_buf()))
        } else {
            Err(LoadError::LibraryNotFound(name.to_string()))
        };
    }

    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };
    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    for dir in default_search_paths() {
        for prefix in prefixes {
            for ext in extensions {
                let candidate = dir.join(format!("{prefix}{name}.{ext}"));
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }
    }
    Err(LoadError::LibraryNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn marker() {}

    #[test]
    fn symbol_table_lookup() {
        let mut table = SymbolTable::new("test table");
        table.insert("marker", marker as *const c_void);
        assert_eq!(table.len(), 1);
        assert!(table.lookup("marker").is_some());
        assert!(table.lookup("absent").is_none());
    }

    #[test]
    fn require_reports_library_and_symbol() {
        let table = SymbolTable::new("empty table");
        let err = require(&table, "tox_new").unwrap_err();
        assert_eq!(
            err,
            LoadError::MissingSymbol {
                library: "empty table".to_string(),
                symbol: "tox_new".to_string(),
            }
        );
    }

    #[test]
    fn null_address_counts_as_missing() {
        let mut table = SymbolTable::new("nulls");
        table.insert("tox_new", std::ptr::null());
        assert!(require(&table, "tox_new").is_err());
    }

    #[test]
    fn missing_library_is_not_found() {
        let err = resolve_library_path("definitely-not-a-real-engine-lib").unwrap_err();
        assert!(matches!(err, LoadError::LibraryNotFound(_)));

        let err = resolve_library_path("/nonexistent/dir/libtoxcore.so").unwrap_err();
        assert!(matches!(err, LoadError::LibraryNotFound(_)));
    }
}
