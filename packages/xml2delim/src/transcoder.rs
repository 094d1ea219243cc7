//! Main transcoder service that ties all components together.

use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{
    load_template, validate_buffer_size, validate_delimiter, validate_paths, DEFAULT_BUFFER_SIZE,
    DEFAULT_DELIMITER, PROGRESS_INTERVAL,
};
use crate::emit::{BufferedEmitter, ProgressReporter, RecordSink, RunSummary};
use crate::error::{Result, TranscodeError};
use crate::interpret::Interpreter;
use crate::line::LineFormatter;
use crate::stream::{MatchedSubtree, SubtreeStream};
use crate::template::RootIndex;

/// Runtime options consumed by the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Field delimiter.
    pub delimiter: String,
    /// Trim surrounding whitespace from extracted values.
    pub strip_whitespace: bool,
    /// Processed records held before flushing; also the batch size when
    /// running on a worker pool.
    pub buffer_size: usize,
    /// Worker threads; 0 or 1 runs sequentially.
    pub jobs: usize,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            strip_whitespace: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            jobs: 1,
        }
    }
}

impl TranscodeOptions {
    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        validate_delimiter(&self.delimiter)?;
        validate_buffer_size(self.buffer_size)
    }

    fn interpreter(&self) -> Interpreter {
        Interpreter::new(LineFormatter::new(
            self.delimiter.clone(),
            self.strip_whitespace,
        ))
    }
}

/// Convert one XML file into one delimited text file.
///
/// Paths, options and the template are all checked before the output file
/// is created.
///
/// # Arguments
/// * `source` - XML input
/// * `template_path` - JSON or YAML template
/// * `output` - Destination file, created or truncated
/// * `options` - Runtime options
/// * `progress` - Progress observer
pub fn transcode_file(
    source: &Path,
    template_path: &Path,
    output: &Path,
    options: &TranscodeOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    options.validate()?;
    validate_paths(source, template_path, output)?;

    let template = load_template(template_path)?;
    let index = RootIndex::build(&template)?;
    tracing::info!(
        source = %source.display(),
        output = %output.display(),
        roots = ?index.root_names(),
        "Starting conversion"
    );

    let stream = SubtreeStream::from_path(source, &index)?;
    let mut emitter = BufferedEmitter::new(File::create(output)?, options.buffer_size);
    let summary = run(stream, &mut emitter, options, progress)?;
    emitter.finish()?;

    Ok(summary)
}

/// Convert XML from `source` into `sink` using a prepared root index.
pub fn transcode<R: BufRead, S: RecordSink>(
    source: R,
    sink: &mut S,
    index: &RootIndex,
    options: &TranscodeOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    options.validate()?;
    run(SubtreeStream::new(source, index), sink, options, progress)
}

fn run<R: BufRead, S: RecordSink>(
    stream: SubtreeStream<'_, R>,
    sink: &mut S,
    options: &TranscodeOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mut tally = Tally::new(started, progress);
    let interpreter = options.interpreter();

    if options.jobs > 1 {
        run_parallel(stream, sink, &interpreter, options, &mut tally)?;
    } else {
        for subtree in stream {
            let subtree = subtree?;
            let text = interpreter.process_subtree(&subtree.xml, subtree.template)?;
            tally.record(sink, &text)?;
        }
    }

    sink.flush()?;
    let summary = RunSummary {
        records: tally.records,
        lines: tally.lines,
        elapsed: started.elapsed(),
    };
    progress.finish(&summary);
    tracing::info!(
        records = summary.records,
        lines = summary.lines,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Conversion finished"
    );

    Ok(summary)
}

/// Interpret batches of `buffer_size` subtrees on a worker pool, emitting
/// each batch in stream order.
fn run_parallel<R: BufRead, S: RecordSink>(
    mut stream: SubtreeStream<'_, R>,
    sink: &mut S,
    interpreter: &Interpreter,
    options: &TranscodeOptions,
    tally: &mut Tally<'_>,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .map_err(|e| TranscodeError::WorkerPool(e.to_string()))?;
    tracing::debug!(threads = options.jobs, batch = options.buffer_size, "Worker pool started");

    loop {
        let batch: Vec<MatchedSubtree<'_>> = stream
            .by_ref()
            .take(options.buffer_size)
            .collect::<Result<_>>()?;
        if batch.is_empty() {
            return Ok(());
        }

        let outputs: Vec<String> = pool.install(|| {
            batch
                .par_iter()
                .map(|subtree| interpreter.process_subtree(&subtree.xml, subtree.template))
                .collect::<Result<_>>()
        })?;

        for text in &outputs {
            tally.record(sink, text)?;
        }
    }
}

/// Running counters shared by both execution modes.
struct Tally<'p> {
    started: Instant,
    progress: &'p dyn ProgressReporter,
    records: usize,
    lines: usize,
}

impl<'p> Tally<'p> {
    fn new(started: Instant, progress: &'p dyn ProgressReporter) -> Self {
        Self {
            started,
            progress,
            records: 0,
            lines: 0,
        }
    }

    fn record<S: RecordSink>(&mut self, sink: &mut S, text: &str) -> Result<()> {
        sink.emit(text)?;
        self.records += 1;
        self.lines += text.bytes().filter(|b| *b == b'\n').count();
        if self.records % PROGRESS_INTERVAL == 0 {
            self.progress.update(self.records, self.started.elapsed());
        }
        Ok(())
    }
}
