use std::error;
use std::fmt;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;

use crate::assembly_submit::read_pair::*;

/// Unicycler bridging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    Conservative,
    Normal,
    Bold,
}

impl FromStr for AssemblyMode {
    type Err = JobScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(AssemblyMode::Conservative),
            "normal" => Ok(AssemblyMode::Normal),
            "bold" => Ok(AssemblyMode::Bold),
            _ => Err(JobScriptError::BadMode(s.to_string())),
        }
    }
}

impl fmt::Display for AssemblyMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssemblyMode::Conservative => write!(f, "conservative"),
            AssemblyMode::Normal => write!(f, "normal"),
            AssemblyMode::Bold => write!(f, "bold"),
        }
    }
}

/// Resource requests and tool parameters baked into every job script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub job_prefix: String,
    pub cpus: u32,
    /// Memory per CPU, in GB
    pub mem_per_cpu: u32,
    /// Wall-clock limit, in minutes
    pub time_limit: u32,
    pub qos: String,
    pub sample_size: u64,
    pub seed: u64,
    pub min_contig: u64,
    pub mode: AssemblyMode,
    pub seqtk_module: String,
    pub unicycler_module: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings {
            job_prefix: "Phage_assembly".to_string(),
            cpus: 16,
            mem_per_cpu: 1,
            time_limit: 30,
            qos: "30min".to_string(),
            sample_size: 150_000,
            seed: 100,
            min_contig: 5000,
            mode: AssemblyMode::Bold,
            seqtk_module: "Seqtk".to_string(),
            unicycler_module: "Unicycler".to_string(),
        }
    }
}

impl JobSettings {
    /// Returns `Err` when a resource request could never be scheduled
    pub fn validate(&self) -> Result<(), JobScriptError> {
        if self.cpus == 0 {
            return Err(JobScriptError::ZeroResource("CPU count"));
        }
        if self.mem_per_cpu == 0 {
            return Err(JobScriptError::ZeroResource("memory per CPU"));
        }
        if self.time_limit == 0 {
            return Err(JobScriptError::ZeroResource("time limit"));
        }
        if self.sample_size == 0 {
            return Err(JobScriptError::ZeroResource("sample size"));
        }
        if self.job_prefix.is_empty() || self.job_prefix.contains(char::is_whitespace) {
            return Err(JobScriptError::BadJobPrefix(self.job_prefix.clone()));
        }
        Ok(())
    }

    /// Wall-clock limit in the `HH:MM:SS` form `sbatch` expects
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:00", self.time_limit / 60, self.time_limit % 60)
    }

    pub fn job_name(&self, id: &SampleId) -> String {
        format!("{}_{}", self.job_prefix, id)
    }

    /// File the scheduler writes the job's stdout to
    pub fn log_name(&self, id: &SampleId) -> String {
        format!("{}.out", self.job_name(id))
    }
}

/// Everything that differs between the job scripts of two samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    id: SampleId,
    forward: PathBuf,
    reverse: PathBuf,
    output_dir: PathBuf,
}

impl JobScript {
    /// Creates the job for a read pair, qualifying both read files
    /// under `input_dir`. A read file that cannot be found now is
    /// reported but does not stop the job from being written.
    pub fn new(pair: &ReadPair, input_dir: &Path, output_dir: &Path) -> Self {
        let forward = qualify_path(input_dir, pair.forward());
        let reverse = qualify_path(input_dir, pair.reverse());

        if !forward.exists() {
            log::warn!("Could not open the R1 file: {}", forward.display());
        }
        if !reverse.exists() {
            log::warn!("Could not open the R2 file: {}", reverse.display());
        }

        JobScript {
            id: pair.id().clone(),
            forward: forward,
            reverse: reverse,
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn id(&self) -> &SampleId {
        &self.id
    }

    pub fn forward(&self) -> &Path {
        &self.forward
    }

    pub fn reverse(&self) -> &Path {
        &self.reverse
    }

    pub fn file_name(&self) -> String {
        format!("{}_slurm", self.id)
    }

    /// Renders the script text. The output depends only on `self` and
    /// `settings`.
    pub fn render(&self, settings: &JobSettings) -> Result<String, fmt::Error> {
        let mut s = String::new();
        self.render_to(settings, &mut s)?;
        Ok(s)
    }

    fn render_to<W: FmtWrite>(&self, settings: &JobSettings, s: &mut W) -> fmt::Result {
        let id = &self.id;
        let sampled_r1 = format!("sub_sampled/{}_R1_subsampled.fastq", id);
        let sampled_r2 = format!("sub_sampled/{}_R2_subsampled.fastq", id);
        let assembly_dir = format!("Unicycler_output/{}", id);
        let fasta = self.output_dir.join(format!("{}.fasta", id));

        writeln!(s, "#!/bin/bash")?;
        writeln!(s, "#SBATCH --job-name={}", settings.job_name(id))?;
        writeln!(s, "#SBATCH --cpus-per-task={}", settings.cpus)?;
        writeln!(s, "#SBATCH --mem-per-cpu={}G", settings.mem_per_cpu)?;
        writeln!(
            s,
            "#Total memory reserved: {}GB",
            u64::from(settings.cpus) * u64::from(settings.mem_per_cpu)
        )?;
        writeln!(s, "#SBATCH --time={}", settings.time_string())?;
        writeln!(s, "#SBATCH --qos={}", settings.qos)?;
        writeln!(s, "#SBATCH --output={}", settings.log_name(id))?;
        write!(s, "\n\n")?;

        write!(s, "#Sub-sampling of raw files\n\n")?;
        writeln!(s, "module load {}", settings.seqtk_module)?;
        write!(s, "echo\necho === Sub_sampling ===\n\n")?;
        writeln!(s, "cp {} $TMPDIR/file1", shell_word(&self.forward))?;
        writeln!(s, "cp {} $TMPDIR/file2", shell_word(&self.reverse))?;
        writeln!(s)?;
        for n in 1..=2 {
            writeln!(
                s,
                "seqtk sample -s{} $TMPDIR/file{} {} > $TMPDIR/file{}_subsampled",
                settings.seed, n, settings.sample_size, n
            )?;
        }
        writeln!(s)?;
        writeln!(s, "mkdir -p sub_sampled")?;
        writeln!(s, "cp $TMPDIR/file1_subsampled {}", sampled_r1)?;
        writeln!(s, "cp $TMPDIR/file2_subsampled {}", sampled_r2)?;
        write!(s, "\necho Done\necho\nmodule purge\n\n")?;

        write!(s, "# Running Unicycler on the sub sampled files\n\n")?;
        write!(s, "echo\necho === Running Unicycler ===\n\n")?;
        writeln!(s, "module load {}", settings.unicycler_module)?;
        writeln!(s, "unicycler --threads $SLURM_CPUS_PER_TASK \\")?;
        writeln!(s, "    -1 {} \\", sampled_r1)?;
        writeln!(s, "    -2 {} \\", sampled_r2)?;
        writeln!(s, "    -o {} \\", assembly_dir)?;
        writeln!(s, "    --mode {} \\", settings.mode)?;
        writeln!(s, "    --min_fasta_length {}", settings.min_contig)?;
        writeln!(s)?;
        writeln!(s, "cp {}/assembly.fasta {}", assembly_dir, shell_word(&fasta))?;
        write!(s, "\necho Done\necho\n\nexit\n")
    }

    /// Renders and writes the script into `script_dir`, returning its path.
    pub fn write(&self, settings: &JobSettings, script_dir: &Path) -> Result<PathBuf, anyhow::Error> {
        let path = script_dir.join(self.file_name());
        fs::write(&path, self.render(settings)?)
            .with_context(|| format!("Writing job script {}", path.display()))?;
        Ok(path)
    }
}

/// Quotes a path for the shell unless it is made only of safe characters.
fn shell_word(path: &Path) -> String {
    let s = path.to_string_lossy();
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./+-=:@%,".contains(c));
    if safe {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobScriptError {
    BadMode(String),
    ZeroResource(&'static str),
    BadJobPrefix(String),
}

impl fmt::Display for JobScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobScriptError::BadMode(mode) => write!(
                f,
                "Bad assembly mode \"{}\" (expected conservative, normal or bold)",
                mode
            ),
            JobScriptError::ZeroResource(what) => write!(f, "The {} must be positive", what),
            JobScriptError::BadJobPrefix(prefix) => {
                write!(f, "Bad job name prefix \"{}\"", prefix)
            }
        }
    }
}

impl error::Error for JobScriptError {}
