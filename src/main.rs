use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::PathBuf;

use blastcov::blast::open_blast_input;
use blastcov::coverage::{compute_coverage, CoverageConfig, CoverageReport};
use blastcov::report::{write_header, write_row};

/// blastcov - Query and subject coverage from BLAST tabular output
///
/// Expects BLAST output generated with
/// `-outfmt "6 qseqid sseqid pident qstart qend sstart send qlen slen length nident mismatch positive gapopen gaps evalue bitscore"`
/// (`-max_target_seqs 1 -evalue 1e-5` recommended). Aligned segments are merged per
/// query/subject pair and reported as covered bases and two-decimal percentages.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// BLAST tabular file(s); `-` reads stdin. `.gz` and `.bgz` are decompressed
    #[clap(short = 'b', long = "blast-tblr-output", value_name = "FILE", num_args = 1..)]
    inputs: Vec<String>,

    /// Output table (stdout if not specified)
    #[clap(short = 'o', long = "output", conflicts_with = "per_file")]
    output: Option<String>,

    /// Write one `<input>.cov.tsv` next to each input instead of a combined table
    #[clap(long = "per-file")]
    per_file: bool,

    /// Report every query/subject pair instead of only the last subject per query
    #[clap(short = 'a', long = "all-pairs")]
    all_pairs: bool,

    /// Number of threads used when several inputs are given
    #[clap(short = 't', long = "threads", default_value = "4")]
    threads: usize,

    /// Quiet mode (warnings and errors only)
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn process_input(path: &str, config: CoverageConfig) -> Result<CoverageReport> {
    let input = open_blast_input(path).with_context(|| format!("Failed to open {path}"))?;
    let report = compute_coverage(input, config)
        .with_context(|| format!("Failed to compute coverage for {path}"))?;

    let s = &report.summary;
    info!(
        "{path}: {} records, {} queries, {} query/subject pairs, {} rows reported",
        s.records, s.queries, s.pairs, s.reported
    );
    if !config.retain_all_pairs && s.pairs > s.reported {
        warn!(
            "{path}: {} pairs not reported (one subject per query); use --all-pairs to keep them",
            s.pairs - s.reported
        );
    }
    Ok(report)
}

fn write_table<W: Write>(out: &mut W, reports: &[&CoverageReport]) -> Result<()> {
    write_header(out)?;
    for report in reports {
        for row in &report.results {
            write_row(out, row)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_logging(args.quiet);

    // Fall back to stdin when something is piped in
    if args.inputs.is_empty() {
        if io::stdin().is_terminal() {
            use clap::CommandFactory;
            Args::command().print_help()?;
            std::process::exit(0);
        }
        args.inputs.push("-".to_string());
    }

    if args.per_file && args.inputs.iter().any(|p| p == "-") {
        bail!("--per-file cannot be used when reading from stdin");
    }
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let config = CoverageConfig {
        retain_all_pairs: args.all_pairs,
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    // Every input must parse cleanly before anything is written
    let reports: Vec<CoverageReport> = args
        .inputs
        .par_iter()
        .map(|path| process_input(path, config))
        .collect::<Result<Vec<_>>>()?;

    if args.per_file {
        for (path, report) in args.inputs.iter().zip(&reports) {
            let out_path = PathBuf::from(format!("{path}.cov.tsv"));
            let file = File::create(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            write_table(&mut BufWriter::new(file), &[report])?;
            info!("Wrote {}", out_path.display());
        }
        return Ok(());
    }

    let all: Vec<&CoverageReport> = reports.iter().collect();
    match args.output {
        Some(ref path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {path}"))?;
            write_table(&mut BufWriter::new(file), &all)?;
        }
        None => {
            let stdout = io::stdout();
            write_table(&mut BufWriter::new(stdout.lock()), &all)?;
        }
    }

    Ok(())
}
