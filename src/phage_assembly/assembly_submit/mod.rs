use std::path::{Path, PathBuf};

use anyhow::Context;

mod job_script;
mod preflight;
mod read_pair;
mod report;
mod scheduler;

pub use crate::assembly_submit::job_script::*;
pub use crate::assembly_submit::preflight::*;
pub use crate::assembly_submit::read_pair::*;
pub use crate::assembly_submit::report::*;
pub use crate::assembly_submit::scheduler::*;

pub struct CLI {
    pub input_dir: String,
    pub output_dir: String,
    pub script_dir: String,
    pub delimiter: String,
    pub cpus: u32,
    pub mem_per_cpu: u32,
    pub time_limit: u32,
    pub qos: String,
    pub sample_size: u64,
    pub seed: u64,
    pub min_contig: u64,
    pub mode: String,
    pub sbatch: String,
    pub dry_run: bool,
    pub report: Option<String>,
}

pub struct Config {
    input_dir: PathBuf,
    output_dir: PathBuf,
    script_dir: PathBuf,
    delimiter: String,
    settings: JobSettings,
    sbatch: PathBuf,
    dry_run: bool,
    report: Option<PathBuf>,
}

impl Config {
    pub fn new(cli: &CLI) -> Result<Self, anyhow::Error> {
        let settings = JobSettings {
            cpus: cli.cpus,
            mem_per_cpu: cli.mem_per_cpu,
            time_limit: cli.time_limit,
            qos: cli.qos.to_string(),
            sample_size: cli.sample_size,
            seed: cli.seed,
            min_contig: cli.min_contig,
            mode: cli.mode.parse()?,
            ..JobSettings::default()
        };
        settings.validate()?;

        if cli.delimiter.is_empty() {
            anyhow::bail!("Sample identifier delimiter must not be empty");
        }

        Ok(Config {
            input_dir: PathBuf::from(&cli.input_dir),
            output_dir: PathBuf::from(&cli.output_dir),
            script_dir: PathBuf::from(&cli.script_dir),
            delimiter: cli.delimiter.to_string(),
            settings: settings,
            sbatch: PathBuf::from(&cli.sbatch),
            dry_run: cli.dry_run,
            report: cli.report.as_ref().map(PathBuf::from),
        })
    }

    /// Configuration with the standard layout: `input/` and `output/`
    /// below `base`, scripts written to `base`.
    pub fn with_base_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Config {
            input_dir: base.join("input"),
            output_dir: base.join("output"),
            script_dir: base.to_path_buf(),
            delimiter: "_".to_string(),
            settings: JobSettings::default(),
            sbatch: PathBuf::from("sbatch"),
            dry_run: false,
            report: None,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut JobSettings {
        &mut self.settings
    }
}

/// Checks the directories, pairs the read files and clears the output
/// directory. Any problem here stops the run before a script is
/// written.
pub fn prepare_run(config: &Config) -> Result<Vec<ReadPair>, anyhow::Error> {
    if let Preflight::Blocked(reason) =
        check_preflight(&config.input_dir, &config.output_dir, &config.script_dir)
    {
        anyhow::bail!("{}", reason);
    }

    let files = list_read_files(&config.input_dir)
        .with_context(|| format!("Listing {}", config.input_dir.display()))?;
    log::info!(
        "Found {} read files in {}",
        files.len(),
        config.input_dir.display()
    );

    let pairs = pair_reads(&files, &config.delimiter).map_err(|errors| {
        for e in errors.iter() {
            log::error!("{}", e);
        }
        anyhow::anyhow!("{} pairing error(s) in {}", errors.len(), config.input_dir.display())
    })?;

    for pair in pairs.iter().filter(|p| !p.by_marker()) {
        log::warn!(
            "No R1/R2 marker for sample {}: using {} as forward and {} as reverse",
            pair.id(),
            pair.forward(),
            pair.reverse()
        );
    }

    prepare_output_dir(&config.output_dir)?;
    prepare_script_dir(&config.script_dir)?;

    Ok(pairs)
}

/// Writes the job script for one pair and submits it.
pub fn process_pair<S: Scheduler + ?Sized>(
    config: &Config,
    scheduler: &mut S,
    pair: ReadPair,
) -> PairOutcome {
    let job = JobScript::new(&pair, &config.input_dir, &config.output_dir);
    let log_name = config.settings.log_name(pair.id());

    log::info!("Creating job script {}", job.file_name());
    let script = match job.write(&config.settings, &config.script_dir) {
        Ok(script) => script,
        Err(e) => {
            log::error!("{:#}", e);
            return PairOutcome::script_failed(pair, log_name, &e);
        }
    };

    let result = scheduler.submit(&script);
    match &result {
        Ok(sub) if scheduler.dispatches() => {
            log::info!(
                "Sent job {} to the cluster{}; output will be written to {}",
                script.display(),
                sub.job_id().map_or(String::new(), |id| format!(" as job {}", id)),
                log_name
            );
        }
        Ok(_) => log::info!("Dry run: {} not submitted", script.display()),
        Err(e) => log::error!("{}", e),
    }

    let dispatched = scheduler.dispatches();
    PairOutcome::submitted(pair, script, log_name, result, dispatched)
}

/// Processes every pair in order. A failure on one pair never stops
/// the following ones.
pub fn run_pairs<S: Scheduler + ?Sized>(
    config: &Config,
    scheduler: &mut S,
    pairs: Vec<ReadPair>,
) -> RunSummary {
    let mut summary = RunSummary::new();
    for pair in pairs.into_iter() {
        summary.push(process_pair(config, scheduler, pair));
    }
    summary
}

pub fn assembly_submit(config: Config) -> Result<RunSummary, anyhow::Error> {
    let pairs = prepare_run(&config)?;

    let mut scheduler: Box<dyn Scheduler> = if config.dry_run {
        Box::new(DryRun::new())
    } else {
        Box::new(Sbatch::new(&config.sbatch))
    };

    let summary = run_pairs(&config, scheduler.as_mut(), pairs);

    if let Some(report) = &config.report {
        summary.write_report(report)?;
        log::info!("Wrote run report to {}", report.display());
    }

    Ok(summary)
}
