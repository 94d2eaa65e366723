use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// Variables are read from the live process environment on every lookup, so the
/// search path is never cached between commands. Entries in `vars` take precedence
/// over the process environment and are visible only to the shell's own lookups.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Overrides consulted before the process environment.
    pub vars: HashMap<String, String>,
    /// When set to true, the read loop stops after the current command.
    pub should_exit: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Raw value of the search path; an unset `PATH` reads as empty.
    pub fn search_paths(&self) -> String {
        self.get_var("PATH").unwrap_or_default()
    }

    /// Ordered directories of the search path, taken fresh at each call.
    ///
    /// Empty segments are skipped.
    pub fn path_table(&self) -> Vec<PathBuf> {
        let paths = self.search_paths();
        stdenv::split_paths(&paths)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect()
    }

    pub fn home(&self) -> Option<String> {
        self.get_var("HOME")
    }
}
