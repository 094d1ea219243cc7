//! Command-line interface for the transcoder.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{parse_legacy_options, DEFAULT_BUFFER_SIZE, PROGRESS_TICK_MS};
use crate::emit::{NoProgress, ProgressReporter, RunSummary};
use crate::error::Result;
use crate::transcoder::{transcode_file, TranscodeOptions};

/// xml2delim - Convert large XML documents to delimited text records.
#[derive(Parser, Debug)]
#[command(name = "xml2delim")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source XML file
    pub source: PathBuf,

    /// Template file (JSON, or YAML with a .yaml/.yml extension)
    pub template: PathBuf,

    /// Output file
    pub output: PathBuf,

    /// Extra options: bar=<delimiter>, strip=<true|false>
    #[arg(value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Field delimiter (default: |)
    #[arg(short, long)]
    pub delimiter: Option<String>,

    /// Keep surrounding whitespace in extracted values
    #[arg(long)]
    pub no_strip: bool,

    /// Processed records held in memory before writing
    #[arg(short, long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Worker threads for interpretation (1 = sequential)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Do not show progress or the summary
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Merge flags and trailing `key=value` options; flags win.
    #[must_use]
    pub fn transcode_options(&self) -> TranscodeOptions {
        let legacy = parse_legacy_options(&self.options);
        let defaults = TranscodeOptions::default();

        TranscodeOptions {
            delimiter: self
                .delimiter
                .clone()
                .or(legacy.delimiter)
                .unwrap_or(defaults.delimiter),
            strip_whitespace: if self.no_strip {
                false
            } else {
                legacy.strip_whitespace.unwrap_or(defaults.strip_whitespace)
            },
            buffer_size: self.buffer_size,
            jobs: self.jobs,
        }
    }
}

/// Progress spinner on stderr.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        bar.set_message("Processed: 0");
        bar.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerProgress {
    fn update(&self, processed: usize, elapsed: Duration) {
        let rate = RunSummary {
            records: processed,
            lines: 0,
            elapsed,
        }
        .rate();
        self.bar
            .set_message(format!("Processed: {processed} ({rate} records/sec)"));
    }

    fn finish(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let options = cli.transcode_options();

    if cli.quiet {
        transcode_file(&cli.source, &cli.template, &cli.output, &options, &NoProgress)?;
        return Ok(());
    }

    println!(
        "{} {} -> {}",
        style("Converting").bold(),
        style(cli.source.display()).cyan(),
        style(cli.output.display()).green()
    );

    let spinner = SpinnerProgress::new();
    let summary = match transcode_file(&cli.source, &cli.template, &cli.output, &options, &spinner) {
        Ok(summary) => summary,
        Err(e) => {
            spinner.bar.finish_and_clear();
            return Err(e);
        }
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Records processed: {}", style(summary.records).green());
    println!("  Lines written: {}", summary.lines);
    println!(
        "  Time required: {:.2} seconds ({} records/sec)",
        summary.elapsed.as_secs_f64(),
        summary.rate()
    );
    println!();
    println!("{}", style("Processing completed.").green().bold());
}
