use std::fmt;
use std::path::{Path, PathBuf};

use crate::foundation::error::{ConvertError, ConvertResult};

/// Which input a path was supplied for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRole {
    /// Notation score.
    Mei,
    /// Sequence representation.
    Msm,
    /// Performance description.
    Mpm,
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRole::Mei => write!(f, "MEI"),
            InputRole::Msm => write!(f, "MSM"),
            InputRole::Mpm => write!(f, "MPM"),
        }
    }
}

/// Canonical absolute path of an input that existed when it was resolved.
///
/// Nothing locks the file; it can disappear between resolution and use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFile {
    path: PathBuf,
    role: InputRole,
}

impl ResolvedFile {
    /// Canonical path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Role the file was resolved for.
    pub fn role(&self) -> InputRole {
        self.role
    }
}

/// Resolve `path` to an existing regular file.
pub fn resolve(path: impl AsRef<Path>, role: InputRole) -> ConvertResult<ResolvedFile> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ConvertError::file_not_found(format!(
            "no {role} input file given"
        )));
    }

    let not_found = || {
        ConvertError::file_not_found(format!(
            "cannot find {role} input file '{}'; check that the path and file name are correct",
            path.display()
        ))
    };

    let canonical = std::fs::canonicalize(path).map_err(|_| not_found())?;
    if !canonical.is_file() {
        return Err(not_found());
    }

    Ok(ResolvedFile {
        path: canonical,
        role,
    })
}

/// Resolve an optional input; `None` and empty paths are passed through as `None`.
pub fn resolve_optional(
    path: Option<impl AsRef<Path>>,
    role: InputRole,
) -> ConvertResult<Option<ResolvedFile>> {
    match path {
        Some(p) if !p.as_ref().as_os_str().is_empty() => resolve(p, role).map(Some),
        _ => Ok(None),
    }
}
