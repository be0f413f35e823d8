//! Icon and animation file lookup.

use std::path::{Path, PathBuf};

use super::RenderError;
use crate::config::Config;

/// Resolves icon references against a list of search directories.
#[derive(Debug, Clone, Default)]
pub struct IconResolver {
    search_dirs: Vec<PathBuf>,
}

impl IconResolver {
    /// Creates a resolver over explicit directories.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Search order: configured `icon_dirs`, `~/.decky`, `~/.decky/icons`,
    /// the config file's directory, then the working directory.
    pub fn from_config(config: &Config) -> Self {
        let mut dirs: Vec<PathBuf> = config
            .icon_dirs
            .iter()
            .map(|d| expand_home(d))
            .collect();
        if let Some(home) = home_dir() {
            dirs.push(home.join(".decky"));
            dirs.push(home.join(".decky").join("icons"));
        }
        if let Some(base) = &config.base_dir {
            dirs.push(base.clone());
        }
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        dirs.dedup();
        Self::new(dirs)
    }

    /// Finds the file an icon reference names.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = expand_home(name);
        if path.is_absolute() {
            return path.is_file().then_some(path);
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&path))
            .find(|candidate| candidate.is_file())
    }

    /// Reads the bytes of an icon.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, RenderError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| RenderError::IconNotFound(name.to_string()))?;
        std::fs::read(&path).map_err(|source| RenderError::Io { path, source })
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => Path::new(path).to_path_buf(),
    }
}
