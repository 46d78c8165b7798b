//! Output-directory discipline for card builds.

use std::fs;
use std::path::Path;

use sc_core::{Error, Result};

/// Make `dir` ready to receive a fresh set of cards.
///
/// A missing directory is created. An existing empty directory is used as
/// is. A non-empty one is an [`Error::OutputExists`] unless `force` is set,
/// in which case it is removed and recreated.
pub fn prepare_output_dir(dir: &Path, force: bool) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(Error::Validation(format!(
                "output path exists but is not a directory: {}",
                dir.display()
            )));
        }
        if dir.read_dir()?.next().is_none() {
            return Ok(());
        }
        if !force {
            return Err(Error::OutputExists(dir.to_path_buf()));
        }
        log::warn!("removing existing output directory {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("sc_card_output_{tag}_{}_{nanos}", std::process::id()))
    }

    #[test]
    fn test_creates_missing_dir() {
        let dir = tmp_dir("missing");
        prepare_output_dir(&dir, false).unwrap();
        assert!(dir.is_dir());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_non_empty_dir_needs_force() {
        let dir = tmp_dir("force");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("old.dat"), "stale").unwrap();

        let err = prepare_output_dir(&dir, false).unwrap_err();
        assert!(matches!(err, Error::OutputExists(ref p) if p == &dir), "{err}");
        assert!(dir.join("old.dat").exists());

        prepare_output_dir(&dir, true).unwrap();
        assert!(dir.is_dir());
        assert!(!dir.join("old.dat").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_in_the_way_is_error() {
        let path = tmp_dir("file");
        fs::write(&path, "x").unwrap();
        assert!(matches!(prepare_output_dir(&path, true), Err(Error::Validation(_))));
        let _ = fs::remove_file(&path);
    }
}
