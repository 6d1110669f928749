use std::error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use regex::Regex;

/// What the scheduler said when it accepted a job script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    job_id: Option<String>,
    message: String,
}

impl Submission {
    pub fn new(job_id: Option<String>, message: String) -> Self {
        Submission {
            job_id: job_id,
            message: message,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Hands job scripts over to a cluster workload manager. Submission
/// returns as soon as the manager has accepted or refused the script;
/// the job itself is never waited for.
pub trait Scheduler {
    fn submit(&mut self, script: &Path) -> Result<Submission, SubmitError>;

    /// True when submitted scripts are really queued.
    fn dispatches(&self) -> bool {
        true
    }
}

/// SLURM submission through `sbatch`.
#[derive(Debug, Clone)]
pub struct Sbatch {
    exe: Result<PathBuf, PathBuf>,
}

impl Sbatch {
    /// Resolves `exe` on `PATH`. A missing executable is not an error
    /// here: every later submission fails instead, one pair at a time.
    pub fn new<P: AsRef<Path>>(exe: P) -> Self {
        let exe = exe.as_ref();
        let resolved = which::which(exe).map_err(|_| exe.to_path_buf());
        match &resolved {
            Ok(path) => log::debug!("Using {} for job submission", path.display()),
            Err(path) => log::warn!("Could not find executable {}", path.display()),
        }
        Sbatch { exe: resolved }
    }

    fn command(&self, script: &Path) -> Result<Command, SubmitError> {
        let exe = self.exe.as_ref().map_err(|p| SubmitError::NoExec(p.clone()))?;
        let mut command = Command::new(exe);
        // the job runs in our working directory, where its relative paths resolve
        command.arg(script);
        Ok(command)
    }
}

impl Scheduler for Sbatch {
    fn submit(&mut self, script: &Path) -> Result<Submission, SubmitError> {
        let mut command = self.command(script)?;
        log::trace!("    {:?}", command);

        let output = command
            .output()
            .map_err(|e| SubmitError::Spawn(script.to_path_buf(), e.to_string()))?;
        submission_from_output(script, output)
    }
}

fn job_id_regex() -> &'static Regex {
    static JOB_ID_RE: OnceLock<Regex> = OnceLock::new();
    JOB_ID_RE.get_or_init(|| Regex::new(r"Submitted batch job (\d+)").expect("static job id regex"))
}

/// Extracts the job id from `sbatch` output, e.g.
/// `Submitted batch job 4242`. With `--parsable`, the output is just
/// the id, optionally followed by `;cluster`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    if let Some(caps) = job_id_regex().captures(stdout) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let line = stdout.trim();
    let id = line.split(';').next().unwrap_or("");
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

fn submission_from_output(script: &Path, output: Output) -> Result<Submission, SubmitError> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        if !stderr.is_empty() {
            log::warn!("{}: {}", script.display(), stderr);
        }
        Ok(Submission::new(parse_job_id(&stdout), stdout))
    } else {
        let status = output
            .status
            .code()
            .map_or("killed by signal".to_string(), |c| format!("exit code {}", c));
        let detail = if stderr.is_empty() { stdout } else { stderr };
        Err(SubmitError::Failed(script.to_path_buf(), status, detail))
    }
}

/// Records scripts without submitting them.
#[derive(Debug, Clone, Default)]
pub struct DryRun {
    scripts: Vec<PathBuf>,
}

impl DryRun {
    pub fn new() -> Self {
        DryRun {
            scripts: Vec::new(),
        }
    }

    pub fn scripts(&self) -> &[PathBuf] {
        &self.scripts
    }
}

impl Scheduler for DryRun {
    fn submit(&mut self, script: &Path) -> Result<Submission, SubmitError> {
        self.scripts.push(script.to_path_buf());
        Ok(Submission::new(None, "dry run, not submitted".to_string()))
    }

    fn dispatches(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    NoExec(PathBuf),
    Spawn(PathBuf, String),
    Failed(PathBuf, String, String),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubmitError::NoExec(exe) => {
                write!(f, "Could not find executable {}", exe.display())
            }
            SubmitError::Spawn(script, e) => {
                write!(f, "Could not run submission for {}: {}", script.display(), e)
            }
            SubmitError::Failed(script, status, detail) => write!(
                f,
                "Submission of {} failed ({}): {}",
                script.display(),
                status,
                detail
            ),
        }
    }
}

impl error::Error for SubmitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids() {
        assert_eq!(parse_job_id("Submitted batch job 4242\n"), Some("4242".to_string()));
        assert_eq!(parse_job_id("77;cluster2"), Some("77".to_string()));
        assert_eq!(parse_job_id("1009\n"), Some("1009".to_string()));
        assert_eq!(parse_job_id(""), None);
        assert_eq!(parse_job_id("sbatch: warning: something"), None);
    }

    #[test]
    fn missing_executable() {
        let mut sbatch = Sbatch::new("definitely-not-an-sbatch-binary-9f3c");
        let res = sbatch.submit(Path::new("A_slurm"));
        assert_eq!(
            res,
            Err(SubmitError::NoExec(PathBuf::from(
                "definitely-not-an-sbatch-binary-9f3c"
            )))
        );
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_captured() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("A_slurm");
        std::fs::write(&script, "#!/bin/bash\nexit\n").unwrap();

        // `true` and `false` stand in for a scheduler that accepts or refuses
        let mut accepting = Sbatch::new("true");
        let accepted = accepting.submit(&script).unwrap();
        assert_eq!(accepted.job_id(), None);

        let mut refusing = Sbatch::new("false");
        match refusing.submit(&script) {
            Err(SubmitError::Failed(path, status, _)) => {
                assert_eq!(path, script);
                assert_eq!(status, "exit code 1");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn dry_run_records() {
        let mut dry = DryRun::new();
        assert!(!dry.dispatches());
        let sub = dry.submit(Path::new("B_slurm")).unwrap();
        assert_eq!(sub.job_id(), None);
        assert_eq!(dry.scripts(), &[PathBuf::from("B_slurm")]);
    }
}
