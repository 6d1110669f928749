use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::assembly_submit::read_pair::*;
use crate::assembly_submit::scheduler::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    Submitted,
    DryRun,
    ScriptFailed,
    SubmitFailed,
}

impl PairStatus {
    pub fn is_success(&self) -> bool {
        match self {
            PairStatus::Submitted | PairStatus::DryRun => true,
            PairStatus::ScriptFailed | PairStatus::SubmitFailed => false,
        }
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PairStatus::Submitted => write!(f, "submitted"),
            PairStatus::DryRun => write!(f, "dry-run"),
            PairStatus::ScriptFailed => write!(f, "script-failed"),
            PairStatus::SubmitFailed => write!(f, "submit-failed"),
        }
    }
}

/// What happened to one read pair during a run.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pair: ReadPair,
    script: Option<PathBuf>,
    log: String,
    status: PairStatus,
    job_id: Option<String>,
    message: String,
}

impl PairOutcome {
    pub fn script_failed(pair: ReadPair, log: String, error: &anyhow::Error) -> Self {
        PairOutcome {
            pair: pair,
            script: None,
            log: log,
            status: PairStatus::ScriptFailed,
            job_id: None,
            message: format!("{:#}", error),
        }
    }

    pub fn submitted(
        pair: ReadPair,
        script: PathBuf,
        log: String,
        result: Result<Submission, SubmitError>,
        dispatched: bool,
    ) -> Self {
        let (status, job_id, message) = match result {
            Ok(sub) if dispatched => (
                PairStatus::Submitted,
                sub.job_id().map(str::to_string),
                sub.message().to_string(),
            ),
            Ok(sub) => (PairStatus::DryRun, None, sub.message().to_string()),
            Err(e) => (PairStatus::SubmitFailed, None, e.to_string()),
        };

        PairOutcome {
            pair: pair,
            script: Some(script),
            log: log,
            status: status,
            job_id: job_id,
            message: message,
        }
    }

    pub fn pair(&self) -> &ReadPair {
        &self.pair
    }

    pub fn script(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn status(&self) -> PairStatus {
        self.status
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcomes of every pair in one run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    outcomes: Vec<PairOutcome>,
}

impl RunSummary {
    pub fn new() -> Self {
        RunSummary {
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: PairOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[PairOutcome] {
        &self.outcomes
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status().is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Writes one tab-separated row per pair, with a header line.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .with_context(|| format!("Creating report {}", path.display()))?;

        writer.write_record([
            "sample", "forward", "reverse", "script", "status", "job_id", "log", "message",
        ])?;

        for outcome in self.outcomes.iter() {
            let script = outcome
                .script()
                .map_or(String::new(), |p| p.display().to_string());
            let status = outcome.status().to_string();
            writer.write_record([
                outcome.pair().id().as_str(),
                outcome.pair().forward(),
                outcome.pair().reverse(),
                script.as_str(),
                status.as_str(),
                outcome.job_id().unwrap_or(""),
                outcome.log(),
                outcome.message(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} pairs: {} succeeded, {} failed",
            self.outcomes.len(),
            self.successes(),
            self.failures()
        )
    }
}
