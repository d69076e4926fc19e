use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// `PROJECT_ROOT` if set, otherwise the working directory.
pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Anchors relative paths at [`project_root`].
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

/// A buffered writer on `path`, or on stdout when no path is given. Parent
/// directories are created as needed.
pub fn output_writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            ensure_parent_dir(path)?;
            info!("Writing {}", path.display());
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Logs a degraded step and repeats it as a one-line notice on `out`.
pub fn skip_notice<W: Write + ?Sized>(out: &mut W, step: &str, err: &Error) -> Result<()> {
    warn!("Skipping {}: {}", step, err);
    writeln!(out, "warning: skipping {step}: {err}")?;
    Ok(())
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
