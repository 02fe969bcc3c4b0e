//! Filesystem targets: fragment files and the main configuration's
//! `Include` lines.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hcv_model::FragmentKind;
use hcv_render::include_line;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("main configuration {path} does not exist")]
    MainConfigMissing { path: PathBuf },

    #[error("refusing to include {path}: fragment file does not exist")]
    FragmentMissing { path: PathBuf },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Filesystem half of the host state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileState {
    pub fragments: BTreeMap<FragmentKind, String>,
    pub registered_includes: BTreeSet<FragmentKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentStore {
    fragment_dir: PathBuf,
    main_config: PathBuf,
}

impl FragmentStore {
    pub fn new(fragment_dir: impl Into<PathBuf>, main_config: impl Into<PathBuf>) -> Self {
        Self {
            fragment_dir: fragment_dir.into(),
            main_config: main_config.into(),
        }
    }

    pub fn fragment_dir(&self) -> &Path {
        &self.fragment_dir
    }

    pub fn main_config(&self) -> &Path {
        &self.main_config
    }

    pub fn fragment_path(&self, kind: FragmentKind) -> PathBuf {
        self.fragment_dir.join(kind.file_name())
    }

    /// Read every fragment file and the include lines of the main config.
    /// Missing files are simply absent from the result.
    pub fn snapshot(&self) -> Result<FileState, StoreError> {
        let mut state = FileState::default();

        for kind in FragmentKind::ALL {
            let path = self.fragment_path(kind);
            if let Some(text) = read_optional(&path)? {
                state.fragments.insert(kind, text);
            }
        }

        if let Some(main) = read_optional(&self.main_config)? {
            for kind in FragmentKind::ALL {
                if has_include(&main, &self.fragment_path(kind)) {
                    state.registered_includes.insert(kind);
                }
            }
        }

        Ok(state)
    }

    /// Overwrite the fragment file. Returns `false` when the file already
    /// holds exactly `content` and nothing was written.
    pub fn write(&self, kind: FragmentKind, content: &str) -> Result<bool, StoreError> {
        let path = self.fragment_path(kind);
        if read_optional(&path)?.as_deref() == Some(content) {
            return Ok(false);
        }

        fs::create_dir_all(&self.fragment_dir).map_err(io_err(&self.fragment_dir))?;

        // Write-then-rename so the server never reads a half-written fragment.
        let tmp = path.with_extension("conf.tmp");
        fs::write(&tmp, content).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(true)
    }

    /// Append an `Include` line for the fragment unless one is already
    /// present. The main configuration is never created, and a fragment file
    /// that does not exist is never referenced (the server would not start).
    pub fn register_include(&self, kind: FragmentKind) -> Result<bool, StoreError> {
        let main = read_optional(&self.main_config)?.ok_or_else(|| StoreError::MainConfigMissing {
            path: self.main_config.clone(),
        })?;

        let fragment = self.fragment_path(kind);
        if has_include(&main, &fragment) {
            return Ok(false);
        }
        if !fragment.is_file() {
            return Err(StoreError::FragmentMissing { path: fragment });
        }

        let mut line = String::new();
        if !main.is_empty() && !main.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&include_line(&fragment));
        line.push('\n');

        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.main_config)
            .map_err(io_err(&self.main_config))?;
        f.write_all(line.as_bytes())
            .map_err(io_err(&self.main_config))?;
        Ok(true)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// `Include`/`IncludeOptional` directive naming `fragment`, quoted or not.
fn has_include(main: &str, fragment: &Path) -> bool {
    let wanted = fragment.to_string_lossy();
    main.lines().any(|line| {
        let mut parts = line.split_whitespace();
        let directive = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default().trim_matches('"');
        (directive.eq_ignore_ascii_case("include") || directive.eq_ignore_ascii_case("includeoptional"))
            && target == wanted
    })
}
