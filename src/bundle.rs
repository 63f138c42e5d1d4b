use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use log::{debug, info};
use thiserror::Error;
use crate::host::Host;
use crate::version::ResolvedVersion;
use Error::*;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bundle {path} was not downloaded")]
    Missing {
        path: String,
    },

    #[error("bundle {path} is {size} bytes, expected more than {min}; the download is probably truncated or an error page")]
    TooSmall {
        path: String,
        size: u64,
        min: u64,
    },

    #[error("bundle {path} has SHA-256 {actual}, expected {expected}")]
    Checksum {
        path: String,
        actual: String,
        expected: String,
    },

    #[error("prepare {path}: {err}")]
    Prepare {
        err: std::io::Error,
        path: String,
    },

    #[error("unzip failed with exit code {0}")]
    Unzip(ExitStatus),

    #[error("{path} not found in the extracted bundle")]
    RecipeMissing {
        path: String,
    },

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Fill `{year}`, `{month}`, `{day}` and `{version}` into a download URL template.
pub fn download_url(template: &str, version: &ResolvedVersion) -> String {
    template
        .replace("{year}", &version.year)
        .replace("{month}", &version.month)
        .replace("{day}", &version.day)
        .replace("{version}", version.as_str())
}

/// Check that a downloaded bundle exists, is larger than `min_bytes`,
/// and matches `checksum` (hex SHA-256) when one is given. Returns the file size.
pub fn verify(path: &Path, min_bytes: u64, checksum: Option<&str>) -> Result<u64, Error> {
    let display = path.display().to_string();
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(Missing { path: display }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(Missing { path: display }),
        Err(err) => return Err(IOError(err)),
    };

    let size = metadata.len();
    if size <= min_bytes {
        return Err(TooSmall { path: display, size, min: min_bytes });
    }

    if let Some(expected) = checksum {
        let actual = sha256::try_digest(path)?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(Checksum { path: display, actual, expected: expected.to_string() });
        }
        debug!("Checksum of {display} verified");
    }

    Ok(size)
}

/// Unpack `archive` into `dest` with the system `unzip`.
pub fn unzip(archive: &Path, dest: &Path) -> Result<(), Error> {
    debug!("Extracting {} into {}", archive.display(), dest.display());
    std::process::Command::new("unzip")
        .arg("-q")
        .arg("-o")
        .arg(archive)
        .arg("-d")
        .arg(dest)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map(|exit_status| {
            if exit_status.success() {
                Ok(())
            } else {
                Err(Unzip(exit_status))
            }
        })?
}

/// Extract into a freshly emptied `build_dir` and make sure the build recipe is there.
/// Returns the path of the recipe.
pub fn extract<H: Host>(host: &H, archive: &Path, build_dir: &Path, recipe_file: &str) -> Result<PathBuf, Error> {
    let prepare = |err: std::io::Error| Prepare { err, path: build_dir.display().to_string() };
    if build_dir.exists() {
        debug!("Removing previous build directory {}", build_dir.display());
        std::fs::remove_dir_all(build_dir).map_err(prepare)?;
    }
    std::fs::create_dir_all(build_dir).map_err(prepare)?;

    host.unzip(archive, build_dir)?;

    let recipe = build_dir.join(recipe_file);
    if !recipe.is_file() {
        return Err(RecipeMissing { path: recipe.display().to_string() });
    }
    info!("Bundle extracted to {}", build_dir.display());
    Ok(recipe)
}

/// A path that could not be removed after the image was built.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub err: std::io::Error,
}

impl Display for CleanupWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not remove {}: {}", self.path.display(), self.err)
    }
}

/// Remove files and directories, collecting failures instead of stopping at them.
/// Paths that are already gone are not an error.
pub fn cleanup(paths: &[&Path]) -> Vec<CleanupWarning> {
    paths
        .iter()
        .filter_map(|path| {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            match result {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    None
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => Some(CleanupWarning { path: path.to_path_buf(), err }),
            }
        })
        .collect()
}
