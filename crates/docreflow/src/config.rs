//! Run configuration: page/range selection, output switches, and per-producer
//! template overrides, loaded from an optional TOML file with CLI-flag override and
//! file auto-discovery — mirroring the teacher's `core::config` discovery-plus-cache
//! pattern, minus the YAML/JSON siblings this crate has no use for.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DocError, Result};

static CONFIG_CACHE: LazyLock<DashMap<PathBuf, (SystemTime, Arc<Config>)>> = LazyLock::new(DashMap::new);

/// An inclusive page range, `start <= end`, both 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn contains(&self, page: usize) -> bool {
        page >= self.start && page <= self.end
    }
}

/// Which outputs a run should produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Outputs {
    pub html: bool,
    pub ast: bool,
    pub tree: bool,
}

impl Default for Outputs {
    fn default() -> Self {
        Outputs { html: true, ast: false, tree: false }
    }
}

/// Run configuration: page/range selection, which outputs to emit, and per-document
/// template overrides. Validated at load time — unknown keys are rejected and page
/// ranges are checked for `start <= end` — rather than lazily at first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Explicit page indices to process; empty means "use `ranges`, or all pages".
    pub pages: Vec<usize>,
    /// Inclusive page ranges to process; empty (with `pages` also empty) means all pages.
    pub ranges: Vec<PageRange>,
    pub outputs: Outputs,
    /// Split the reconstructed document into one file per chapter.
    pub chapters: bool,
    /// Include pages whose content area reconstructs to nothing but the synthetic
    /// page marker (cover sheets, blank separators). Off by default; the CLI's
    /// `--all` flag flips it on.
    pub include_boilerplate: bool,
    /// Force a producer template instead of sniffing the PDF `Producer` metadata.
    pub force_producer: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pages: Vec::new(),
            ranges: Vec::new(),
            outputs: Outputs::default(),
            chapters: true,
            include_boilerplate: false,
            force_producer: None,
        }
    }
}

impl Config {
    /// Whether page `index` (0-based) is selected by this configuration.
    pub fn page_selected(&self, index: usize) -> bool {
        if self.pages.is_empty() && self.ranges.is_empty() {
            return true;
        }
        self.pages.contains(&index) || self.ranges.iter().any(|r| r.contains(index))
    }

    fn validate(&self) -> Result<()> {
        for r in &self.ranges {
            if r.start > r.end {
                return Err(DocError::Config { message: format!("page range start {} exceeds end {}", r.start, r.end) });
            }
        }
        Ok(())
    }

    /// Load configuration from a TOML file, with an mtime-keyed cache matching the
    /// teacher's `ExtractionConfig::from_toml_file` shape.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path)
            .map_err(|e| DocError::Config { message: format!("failed to read config file {}: {e}", path.display()) })?;
        let mtime = metadata
            .modified()
            .map_err(|e| DocError::Config { message: format!("failed to get mtime for {}: {e}", path.display()) })?;

        if let Some(entry) = CONFIG_CACHE.get(path) {
            if entry.0 == mtime {
                return Ok((*entry.1).clone());
            }
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DocError::Config { message: format!("failed to read config file {}: {e}", path.display()) })?;

        let config: Self =
            toml::from_str(&content).map_err(|e| DocError::Config { message: format!("invalid TOML in {}: {e}", path.display()) })?;
        config.validate()?;

        let config_arc = Arc::new(config.clone());
        CONFIG_CACHE.insert(path.to_path_buf(), (mtime, config_arc));

        Ok(config)
    }

    /// Search `docreflow.toml` in the current directory and its ancestors.
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(|e| DocError::Config { message: e.to_string() })?;
        loop {
            let candidate = current.join("docreflow.toml");
            if candidate.exists() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(None)
    }

    /// Merge CLI-supplied overrides on top of a loaded (or default) configuration.
    /// CLI flags always win: a present override replaces the field wholesale.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self> {
        if let Some(p) = overrides.pages {
            self.pages = p;
        }
        if let Some(r) = overrides.ranges {
            self.ranges = r;
        }
        if let Some(h) = overrides.html {
            self.outputs.html = h;
        }
        if let Some(a) = overrides.ast {
            self.outputs.ast = a;
        }
        if let Some(t) = overrides.tree {
            self.outputs.tree = t;
        }
        if let Some(c) = overrides.chapters {
            self.chapters = c;
        }
        if let Some(b) = overrides.include_boilerplate {
            self.include_boilerplate = b;
        }
        self.validate()?;
        Ok(self)
    }
}

/// CLI-flag overrides, one field per knob the binary exposes on top of a loaded
/// (or default) `Config`. `None` means "leave whatever the config file/default set."
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub pages: Option<Vec<usize>>,
    pub ranges: Option<Vec<PageRange>>,
    pub html: Option<bool>,
    pub ast: Option<bool>,
    pub tree: Option<bool>,
    pub chapters: Option<bool>,
    pub include_boilerplate: Option<bool>,
}

/// Resolve configuration the way the CLI does: discover a file, fall back to
/// defaults if none is found, then apply CLI overrides.
pub fn resolve(explicit_path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let base = match explicit_path {
        Some(p) => Config::from_toml_file(p)?,
        None => Config::discover()?.unwrap_or_default(),
    };
    base.with_overrides(overrides)
}

/// Distinct keys requested by `pages`/`ranges`, for diagnostics (e.g. "N pages selected").
pub fn selected_count(config: &Config, page_count: usize) -> usize {
    let mut set: HashSet<usize> = HashSet::new();
    for i in 0..page_count {
        if config.page_selected(i) {
            set.insert(i);
        }
    }
    set.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_all_pages() {
        let config = Config::default();
        assert!(config.page_selected(0));
        assert!(config.page_selected(9999));
    }

    #[test]
    fn explicit_ranges_restrict_selection() {
        let mut config = Config::default();
        config.ranges.push(PageRange { start: 2, end: 4 });
        assert!(!config.page_selected(1));
        assert!(config.page_selected(3));
        assert!(!config.page_selected(5));
    }

    #[test]
    fn invalid_range_fails_validation() {
        let mut config = Config::default();
        config.ranges.push(PageRange { start: 5, end: 1 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_file_round_trips_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docreflow.toml");
        std::fs::write(&path, "chapters = false\n[outputs]\nhtml = true\n").unwrap();
        let config = Config::from_toml_file(&path).unwrap();
        assert!(!config.chapters);
        let again = Config::from_toml_file(&path).unwrap();
        assert!(!again.chapters);
    }
}
