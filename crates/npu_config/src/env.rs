//! Environment variable sources.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// A read-only view of environment variables.
pub trait EnvSource {
    /// Returns the value of `name`, or `None` if it is not set.
    fn var(&self, name: &str) -> Option<OsString>;

    /// Returns the current working directory.
    fn current_dir(&self) -> std::io::Result<PathBuf>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<OsString> {
        std::env::var_os(name)
    }

    fn current_dir(&self) -> std::io::Result<PathBuf> {
        std::env::current_dir()
    }
}

/// An in-memory environment, used by tests and embedders.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, OsString>,
    cwd: Option<PathBuf>,
}

impl MapEnv {
    /// Creates an empty environment with no working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, returning `self` for chaining.
    pub fn with_var(mut self, name: &str, value: impl Into<OsString>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    /// Sets the working directory, returning `self` for chaining.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<OsString> {
        self.vars.get(name).cloned()
    }

    fn current_dir(&self) -> std::io::Result<PathBuf> {
        self.cwd.clone().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no working directory")
        })
    }
}
