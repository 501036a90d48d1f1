//! Input discovery and archiving
//!
//! An input directory holds text blocks named `<prefix>*.txt`. Each becomes
//! one `WorkUnit` whose artifact lands at `<output_dir>/<stem>.<extension>`.

use std::path::{Path, PathBuf};

use generator::WorkUnit;
use tracing::{debug, warn};

use crate::natural;

/// List `<prefix>*.txt` files in `dir`, in natural order of file name.
pub fn discover(dir: &Path, prefix: &str) -> common::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(common::Error::Input(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(".txt") {
            found.push(entry.path());
        }
    }

    found.sort_by(|a, b| natural::compare(&file_name(a), &file_name(b)));
    Ok(found)
}

/// Read each block into a unit. Content is trimmed; empty blocks are kept so
/// the pipeline can report them as skipped.
pub fn load_units(
    paths: &[PathBuf],
    output_dir: &Path,
    extension: &str,
) -> common::Result<Vec<WorkUnit>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = output_dir.join(format!("{stem}.{extension}"));
            debug!(block = %path.display(), output = %output.display(), "loaded block");
            Ok(WorkUnit::new(file_name(path), content.trim(), output).with_source(path))
        })
        .collect()
}

/// Move a processed block into `done_dir`, creating it if needed.
pub fn archive(source: &Path, done_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(done_dir)?;
    let target = done_dir.join(source.file_name().unwrap_or_default());
    std::fs::rename(source, &target)?;
    Ok(target)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
