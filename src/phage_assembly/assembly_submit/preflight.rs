use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Outcome of checking the directories before any pair is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    Ready,
    Blocked(BlockReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    MissingInput(PathBuf),
    InputNotDir(PathBuf),
    OutputNotDir(PathBuf),
    ScriptDirNotDir(PathBuf),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlockReason::MissingInput(dir) => write!(
                f,
                "Did not find the input directory {}. Are you in the right assembly directory?",
                dir.display()
            ),
            BlockReason::InputNotDir(dir) => {
                write!(f, "Input path {} is not a directory", dir.display())
            }
            BlockReason::OutputNotDir(dir) => write!(
                f,
                "Output path {} exists but is not a directory",
                dir.display()
            ),
            BlockReason::ScriptDirNotDir(dir) => write!(
                f,
                "Job script path {} exists but is not a directory",
                dir.display()
            ),
        }
    }
}

/// Checks that the input directory exists and that the output and job
/// script paths, if present, are directories. Nothing is modified.
pub fn check_preflight(input_dir: &Path, output_dir: &Path, script_dir: &Path) -> Preflight {
    if !input_dir.exists() {
        return Preflight::Blocked(BlockReason::MissingInput(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Preflight::Blocked(BlockReason::InputNotDir(input_dir.to_path_buf()));
    }
    if output_dir.exists() && !output_dir.is_dir() {
        return Preflight::Blocked(BlockReason::OutputNotDir(output_dir.to_path_buf()));
    }
    if script_dir.exists() && !script_dir.is_dir() {
        return Preflight::Blocked(BlockReason::ScriptDirNotDir(script_dir.to_path_buf()));
    }
    Preflight::Ready
}

/// Creates the job script directory when absent.
pub fn prepare_script_dir(script_dir: &Path) -> Result<(), anyhow::Error> {
    if !script_dir.exists() {
        log::info!("Creating job script directory {}", script_dir.display());
        fs::DirBuilder::new()
            .recursive(true)
            .create(script_dir)
            .with_context(|| format!("Creating {}", script_dir.display()))?;
    }
    Ok(())
}

/// Empties `output_dir`, or creates it when absent. Returns the number
/// of entries removed.
pub fn prepare_output_dir(output_dir: &Path) -> Result<usize, anyhow::Error> {
    if !output_dir.exists() {
        log::info!("Creating output directory {}", output_dir.display());
        fs::DirBuilder::new()
            .recursive(true)
            .create(output_dir)
            .with_context(|| format!("Creating {}", output_dir.display()))?;
        return Ok(0);
    }

    log::info!("Removing content of the output directory {}", output_dir.display());
    let mut removed = 0;
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("Removing {}", path.display()))?;
        removed += 1;
    }
    log::debug!("Removed {} entries from {}", removed, output_dir.display());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        assert_eq!(
            check_preflight(&input, &output, dir.path()),
            Preflight::Blocked(BlockReason::MissingInput(input.clone()))
        );

        fs::write(&input, b"").unwrap();
        assert_eq!(
            check_preflight(&input, &output, dir.path()),
            Preflight::Blocked(BlockReason::InputNotDir(input.clone()))
        );
    }

    #[test]
    fn output_file_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        fs::create_dir(&input).unwrap();
        assert_eq!(check_preflight(&input, &output, dir.path()), Preflight::Ready);

        fs::write(&output, b"").unwrap();
        assert_eq!(
            check_preflight(&input, &output, dir.path()),
            Preflight::Blocked(BlockReason::OutputNotDir(output.clone()))
        );
    }

    #[test]
    fn script_dir_checked_and_created() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        let scripts = dir.path().join("jobs");
        fs::create_dir(&input).unwrap();
        assert_eq!(check_preflight(&input, &output, &scripts), Preflight::Ready);

        prepare_script_dir(&scripts).unwrap();
        assert!(scripts.is_dir());
        prepare_script_dir(&scripts).unwrap();

        let not_dir = dir.path().join("jobs.txt");
        fs::write(&not_dir, b"").unwrap();
        assert_eq!(
            check_preflight(&input, &output, &not_dir),
            Preflight::Blocked(BlockReason::ScriptDirNotDir(not_dir.clone()))
        );
    }

    #[test]
    fn stale_output_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        fs::create_dir(&output).unwrap();
        fs::write(output.join("old.fasta"), b">old\nACGT\n").unwrap();
        fs::create_dir(output.join("nested")).unwrap();
        fs::write(output.join("nested").join("x"), b"").unwrap();

        assert_eq!(prepare_output_dir(&output).unwrap(), 2);
        assert!(output.is_dir());
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    }

    #[test]
    fn output_created() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        assert_eq!(prepare_output_dir(&output).unwrap(), 0);
        assert!(output.is_dir());
    }
}
