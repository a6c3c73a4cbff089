use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytesize::ByteSize;

use crate::EngineError;

/// Default multipart chunk size and single-PUT threshold: 128 MiB.
pub const DEFAULT_PART_SIZE: u64 = 128 * 1024 * 1024;

/// Default worker pool size.
pub const DEFAULT_THREADS: usize = 4;

/// Engine-level tuning options.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Worker pool size.
    pub threads: usize,
    /// Multipart chunk size as a human-readable string (`"128 MiB"`).
    /// Files at or below this size go through a single PUT.
    pub part_size: Option<String>,
    /// Force the headless monitor.
    pub no_tty: bool,
    /// Force the interactive monitor. Mutually exclusive with `no_tty`.
    pub tty: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            part_size: None,
            no_tty: false,
            tty: false,
        }
    }
}

impl UploadOptions {
    /// Validates the options and returns the resolved part size in bytes.
    pub fn validate(&self) -> Result<u64, EngineError> {
        if self.threads == 0 {
            return Err(EngineError::InvalidConfig(
                "thread count must be at least 1".into(),
            ));
        }
        if self.no_tty && self.tty {
            return Err(EngineError::InvalidConfig(
                "tty and no-tty are mutually exclusive".into(),
            ));
        }
        self.part_size_bytes()
    }

    /// Parses the configured part size, defaulting to 128 MiB.
    pub fn part_size_bytes(&self) -> Result<u64, EngineError> {
        match self.part_size.as_deref() {
            None | Some("") => Ok(DEFAULT_PART_SIZE),
            Some(raw) => {
                let size = ByteSize::from_str(raw).map_err(|e| {
                    EngineError::InvalidConfig(format!("parse part size {raw:?}: {e}"))
                })?;
                if size.as_u64() == 0 {
                    return Err(EngineError::InvalidConfig(
                        "part size must be non-zero".into(),
                    ));
                }
                Ok(size.as_u64())
            }
        }
    }

    /// Whether the interactive monitor should be used.
    ///
    /// Explicit flags take precedence; otherwise the environment decides.
    pub fn use_interactive(&self) -> bool {
        if self.no_tty {
            return false;
        }
        if self.tty {
            return true;
        }
        !is_headless_environment()
    }
}

/// Detects CI/headless environments where a live terminal UI would only
/// produce garbage.
pub fn is_headless_environment() -> bool {
    headless_from(
        std::io::stdin().is_terminal(),
        std::io::stdout().is_terminal(),
        std::env::var("CI").ok().as_deref(),
        std::env::var("TERM").ok().as_deref(),
    )
}

fn headless_from(
    stdin_tty: bool,
    stdout_tty: bool,
    ci: Option<&str>,
    term: Option<&str>,
) -> bool {
    if !stdin_tty || !stdout_tty {
        return true;
    }
    if ci == Some("true") {
        return true;
    }
    term == Some("dumb")
}

/// What to upload and where it lands under the remote parent.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// A file, a directory, or a glob pattern. May be empty when only
    /// `additional_uploads` are given.
    pub path: Option<PathBuf>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Admit dot-prefixed names.
    pub include_hidden: bool,
    /// Prefix prepended to each remote relative path.
    pub target_dir: Option<String>,
    /// Local paths paired directly with pre-signed URLs, bypassing the
    /// URL batcher and the existence probe.
    pub additional_uploads: HashMap<PathBuf, String>,
}

/// Source options after validation and glob expansion.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSource {
    /// Concrete paths to scan (absolute).
    pub paths: Vec<PathBuf>,
    /// Base directory remote relative paths are computed against.
    pub rel_dir: PathBuf,
}

impl SourceOptions {
    pub(crate) fn resolve(&self) -> Result<ResolvedSource, EngineError> {
        let path = match &self.path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => {
                if self.additional_uploads.is_empty() {
                    return Err(EngineError::InvalidConfig("file path empty".into()));
                }
                return Ok(ResolvedSource {
                    paths: Vec::new(),
                    rel_dir: PathBuf::new(),
                });
            }
        };

        let raw = path.to_string_lossy();
        if has_glob_pattern(&raw) {
            let matches = glob::glob(&raw)
                .map_err(|e| EngineError::InvalidConfig(format!("invalid glob pattern: {e}")))?
                .filter_map(Result::ok)
                .map(|p| std::path::absolute(&p).unwrap_or(p))
                .collect::<Vec<_>>();
            if matches.is_empty() {
                return Err(EngineError::InvalidConfig(
                    "glob pattern matched no files".into(),
                ));
            }
            let base = glob_base_dir(&raw);
            return Ok(ResolvedSource {
                paths: matches,
                rel_dir: std::path::absolute(&base).unwrap_or(base),
            });
        }

        std::fs::metadata(path)
            .map_err(|e| EngineError::InvalidConfig(format!("invalid file path: {e}")))?;
        let absolute = std::path::absolute(path)?;
        let rel_dir = parent_dir(&absolute);
        Ok(ResolvedSource {
            paths: vec![absolute],
            rel_dir,
        })
    }
}

fn has_glob_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Directory prefix before the first wildcard of a glob pattern.
///
/// `a/*` -> `a`, `a/**/*.txt` -> `a`, `a/b/c*.txt` -> `a/b`.
fn glob_base_dir(pattern: &str) -> PathBuf {
    match pattern.find(['*', '?', '[']) {
        None => parent_dir(Path::new(pattern)),
        Some(pos) => {
            let before = &pattern[..pos];
            match before.strip_suffix(std::path::MAIN_SEPARATOR) {
                Some(stripped) => PathBuf::from(stripped),
                None => parent_dir(Path::new(before)),
            }
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
