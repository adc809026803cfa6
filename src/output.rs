// src/output.rs
use anyhow::{bail, Context, Result};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Extension of every generated document.
pub const EXTENSION: &str = "docx";

/// Create `path` (and its parents) unless it already is a directory.
pub fn create_output_folder<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("creating output directory {:?}", path))?;
        debug!(path = %path.display(), "created output directory");
    } else if !path.is_dir() {
        bail!("output path {:?} exists and is not a directory", path);
    }
    Ok(path.to_path_buf())
}

/// Path under `dir` for a document named after `name`.
///
/// `<name>.docx` if free, otherwise `<name>_<n>.docx` where `n - 1` is the
/// number of `<name>*.docx` files already in `dir`. This is a directory scan,
/// not a reservation: gaps left by deleted files can make `n` collide.
pub fn unique_path<P: AsRef<Path>>(name: &str, dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let stem = name.trim();
    let candidate = dir.join(format!("{}.{}", stem, EXTENSION));
    if !candidate.exists() {
        return Ok(candidate);
    }

    // an empty dir means the current directory, not the filesystem root
    let scan_dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let pattern = format!(
        "{}/{}*.{}",
        Pattern::escape(&scan_dir.to_string_lossy()),
        Pattern::escape(stem),
        EXTENSION
    );
    let count = glob(&pattern)
        .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
        .filter_map(|entry| entry.ok())
        .count();

    Ok(dir.join(format!("{}_{}.{}", stem, count + 1, EXTENSION)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) -> Result<()> {
        fs::write(path, b"")?;
        Ok(())
    }

    #[test]
    fn creates_nested_folders_idempotently() -> Result<()> {
        let root = tempdir()?;
        let target = root.path().join("a").join("b");

        assert_eq!(create_output_folder(&target)?, target);
        assert!(target.is_dir());

        touch(&target.join("keep.docx"))?;
        create_output_folder(&target)?;
        assert!(target.join("keep.docx").exists());
        assert_eq!(fs::read_dir(&target)?.count(), 1);
        Ok(())
    }

    #[test]
    fn refuses_a_file_as_output_folder() -> Result<()> {
        let root = tempdir()?;
        let file = root.path().join("output");
        touch(&file)?;
        assert!(create_output_folder(&file).is_err());
        Ok(())
    }

    #[test]
    fn trims_name_and_appends_extension() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(
            unique_path("  Alice \t", dir.path())?,
            dir.path().join("Alice.docx")
        );
        Ok(())
    }

    #[test]
    fn numbers_repeated_names() -> Result<()> {
        let dir = tempdir()?;
        let mut seen = Vec::new();
        for _ in 0..3 {
            let path = unique_path("Alice", dir.path())?;
            touch(&path)?;
            seen.push(path.file_name().unwrap().to_string_lossy().into_owned());
        }
        assert_eq!(seen, ["Alice.docx", "Alice_2.docx", "Alice_3.docx"]);
        Ok(())
    }

    #[test]
    fn counts_every_file_sharing_the_stem() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("Al.docx"))?;
        touch(&dir.path().join("Alice.docx"))?;
        touch(&dir.path().join("Al.txt"))?;
        assert_eq!(
            unique_path("Al", dir.path())?,
            dir.path().join("Al_3.docx")
        );
        Ok(())
    }

    #[test]
    fn empty_dir_counts_files_in_the_current_directory() -> Result<()> {
        let dir = tempdir()?;
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir.path())?;

        let result = (|| -> Result<(PathBuf, PathBuf)> {
            let first = unique_path("Alice", "")?;
            touch(&first)?;
            let second = unique_path("Alice", "")?;
            Ok((first, second))
        })();
        std::env::set_current_dir(previous)?;

        let (first, second) = result?;
        assert_eq!(first, PathBuf::from("Alice.docx"));
        assert_eq!(second, PathBuf::from("Alice_2.docx"));
        Ok(())
    }

    #[test]
    fn escapes_glob_characters_in_names() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("[draft].docx"))?;
        touch(&dir.path().join("d.docx"))?;
        assert_eq!(
            unique_path("[draft]", dir.path())?,
            dir.path().join("[draft]_2.docx")
        );
        Ok(())
    }
}
