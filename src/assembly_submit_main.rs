extern crate anyhow;
extern crate clap;

extern crate phage_assembly;

use std::io;
use std::io::Write;
use std::process;

use clap::{Arg, ArgAction, Command, value_parser};

use phage_assembly::assembly_submit::*;
use phage_assembly::logging;

fn main() {
    match wrapper() {
        Err(e) => {
            let _ = io::stderr().write(format!("{:#}\n", e).as_bytes());
            process::exit(1);
        }
        Ok(summary) => {
            if summary.failures() > 0 {
                process::exit(2);
            }
        }
    };
}

fn wrapper() -> Result<RunSummary, anyhow::Error> {
    let cli = get_cli()?;
    let config = Config::new(&cli)?;
    let summary = assembly_submit(config)?;
    log::info!("{}", summary);
    Ok(summary)
}

fn get_cli() -> Result<CLI, anyhow::Error> {
    let matches = Command::new("assembly-submit")
        .version("0.1.0")
        .author("Nick Ingolia <ingolia@berkeley.edu>")
        .about("Write and submit one SLURM sub-sampling and assembly job per pair of read files")
        .arg(
            Arg::new("input_dir")
                .short('i')
                .long("input-dir")
                .value_name("INPUT-DIR")
                .help("Directory of paired read files")
                .default_value("input"),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .value_name("OUTPUT-DIR")
                .help("Directory for assemblies, cleared before the run")
                .default_value("output"),
        )
        .arg(
            Arg::new("script_dir")
                .short('s')
                .long("script-dir")
                .value_name("SCRIPT-DIR")
                .help("Directory for the generated job scripts")
                .default_value("."),
        )
        .arg(
            Arg::new("delimiter")
                .short('d')
                .long("delimiter")
                .value_name("DELIM")
                .help("Sample name ends at the first DELIM in the file name")
                .default_value("_"),
        )
        .arg(
            Arg::new("cpus")
                .long("cpus")
                .value_name("NCPUS")
                .help("CPUs per task")
                .value_parser(value_parser!(u32))
                .default_value("16"),
        )
        .arg(
            Arg::new("mem_per_cpu")
                .long("mem-per-cpu")
                .value_name("GB")
                .help("Memory per CPU, in GB")
                .value_parser(value_parser!(u32))
                .default_value("1"),
        )
        .arg(
            Arg::new("time")
                .short('t')
                .long("time")
                .value_name("MINUTES")
                .help("Wall-clock limit, in minutes")
                .value_parser(value_parser!(u32))
                .default_value("30"),
        )
        .arg(
            Arg::new("qos")
                .long("qos")
                .value_name("QOS")
                .help("Quality of service (queue class)")
                .default_value("30min"),
        )
        .arg(
            Arg::new("sample_size")
                .long("sample-size")
                .value_name("NREADS")
                .help("Number of reads kept when sub-sampling")
                .value_parser(value_parser!(u64))
                .default_value("150000"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Sub-sampling random seed")
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .arg(
            Arg::new("min_contig")
                .long("min-contig")
                .value_name("LENGTH")
                .help("Minimum contig length kept in the assembly")
                .value_parser(value_parser!(u64))
                .default_value("5000"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("MODE")
                .help("Unicycler mode")
                .value_parser(["conservative", "normal", "bold"])
                .default_value("bold"),
        )
        .arg(
            Arg::new("sbatch")
                .long("sbatch")
                .value_name("EXE")
                .help("Job submission command")
                .default_value("sbatch"),
        )
        .arg(
            Arg::new("dry_run")
                .short('n')
                .long("dry-run")
                .help("Write job scripts without submitting them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("report")
                .short('r')
                .long("report")
                .value_name("REPORT.TSV")
                .help("Write a tab-separated report of every pair"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (repeat for trace)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only log warnings and errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .get_matches();

    logging::init_logger(logging::level_filter(
        matches.get_count("verbose"),
        matches.get_flag("quiet"),
    ))?;

    Ok(CLI {
        input_dir: string_arg(&matches, "input_dir"),
        output_dir: string_arg(&matches, "output_dir"),
        script_dir: string_arg(&matches, "script_dir"),
        delimiter: string_arg(&matches, "delimiter"),
        cpus: *matches.get_one::<u32>("cpus").unwrap_or(&16),
        mem_per_cpu: *matches.get_one::<u32>("mem_per_cpu").unwrap_or(&1),
        time_limit: *matches.get_one::<u32>("time").unwrap_or(&30),
        qos: string_arg(&matches, "qos"),
        sample_size: *matches.get_one::<u64>("sample_size").unwrap_or(&150_000),
        seed: *matches.get_one::<u64>("seed").unwrap_or(&100),
        min_contig: *matches.get_one::<u64>("min_contig").unwrap_or(&5000),
        mode: string_arg(&matches, "mode"),
        sbatch: string_arg(&matches, "sbatch"),
        dry_run: matches.get_flag("dry_run"),
        report: matches.get_one::<String>("report").cloned(),
    })
}

fn string_arg(matches: &clap::ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}
