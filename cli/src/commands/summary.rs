use std::borrow::Cow;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{
    arg, command, value_parser, ArgAction, ArgMatches, Command, ValueEnum,
};
use superconsole::style::Stylize;
use superconsole::{Component, Line, Lines, Span};
use yansi::Color::{Green, Red, Yellow};
use yansi::Paint;

use bup_summary::{
    Assembler, ReportError, ReportFormat, ReportWriter, SummaryRecord,
};

use crate::commands::{existing_path_parser, truncate_with_ellipsis};
use crate::config::SummaryConfig;
use crate::walk::Message;
use crate::{help, walk};

#[derive(Clone, ValueEnum)]
enum OutputFormats {
    /// Comma-separated values.
    Csv,
    /// Newline delimited JSON (i.e: one JSON object per line).
    Ndjson,
}

#[rustfmt::skip]
pub fn summary() -> Command {
    command!()
        .about("Summarize McAfee quarantine (.bup) files")
        .long_about(help::SUMMARY_LONG_HELP)
        .arg(
            arg!([ROOT_DIR])
                .help("Directory where .bup files are searched for")
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
        )
        // Keep options sorted alphabetically by their long name.
        // For instance, --bar goes before --foo.
        .arg(
            arg!(-C --config <CONFIG_FILE>)
                .help("Config file")
                .long_help(help::CONFIG_FILE)
                .required(false)
                .value_parser(existing_path_parser)
        )
        .arg(
            arg!(--"keep-unicode")
                .help("Keep non-ASCII characters in original names")
                .long_help(help::KEEP_UNICODE_LONG_HELP)
                .action(ArgAction::SetTrue)
        )
        .arg(
            arg!(--"legacy-values")
                .help("Truncate values at the second equal sign")
                .long_help(help::LEGACY_VALUES_LONG_HELP)
                .action(ArgAction::SetTrue)
        )
        .arg(
            arg!(-r --"max-depth" <MAX_DEPTH>)
                .help("Walk directories up to the given depth")
                .long_help(help::MAX_DEPTH_LONG_HELP)
                .required(false)
                .value_parser(value_parser!(usize))
        )
        .arg(
            arg!(-o --output <OUTPUT_FILE>)
                .help("Report file, overwritten if it exists")
                .required(true)
                .value_parser(value_parser!(PathBuf))
        )
        .arg(
            arg!(-f --"output-format" <FORMAT>)
                .help("Output format for the report")
                .long_help(help::OUTPUT_FORMAT_LONG_HELP)
                .required(false)
                .default_value("csv")
                .value_parser(value_parser!(OutputFormats))
        )
        .arg(
            arg!(-z --"skip-larger" <FILE_SIZE>)
                .help("Report files larger than the given size as corrupt")
                .required(false)
                .value_parser(value_parser!(u64))
        )
        .arg(
            arg!(-p --"threads" <NUM_THREADS>)
                .help("Use the given number of threads")
                .long_help(help::THREADS_LONG_HELP)
                .required(false)
                .value_parser(value_parser!(u8).range(1..))
        )
}

pub fn exec_summary(
    args: &ArgMatches,
    config: SummaryConfig,
) -> anyhow::Result<()> {
    let root_dir = args.get_one::<PathBuf>("ROOT_DIR").unwrap();
    let output_path = args.get_one::<PathBuf>("output").unwrap();
    let max_depth = args.get_one::<usize>("max-depth");

    let num_threads = args.get_one::<u8>("threads").copied().or(config.threads);

    let skip_larger =
        args.get_one::<u64>("skip-larger").copied().or(config.skip_larger);

    let keep_unicode = args.get_flag("keep-unicode") || config.keep_unicode;
    let legacy_values = args.get_flag("legacy-values") || config.legacy_values;

    let format = match args.get_one::<OutputFormats>("output-format") {
        Some(OutputFormats::Ndjson) => ReportFormat::Ndjson,
        Some(OutputFormats::Csv) | None => ReportFormat::Csv,
    };

    let metadata = root_dir
        .metadata()
        .with_context(|| format!("can't open `{}`", root_dir.display()))?;

    if !metadata.is_dir() {
        bail!("`{}` is not a directory", root_dir.display());
    }

    // Containers are reported with their absolute path. Unlike
    // `canonicalize`, this doesn't add the `\\?\` prefix in Windows.
    let root_dir = std::path::absolute(root_dir)
        .with_context(|| format!("can't open `{}`", root_dir.display()))?;

    let output_file = File::create(output_path).with_context(|| {
        format!("can't create `{}`", output_path.display())
    })?;

    let report = ReportWriter::new(BufWriter::new(output_file), format)?;

    let mut assembler = Assembler::new();

    assembler.keep_unicode(keep_unicode).legacy_values(legacy_values);

    let assembler = &assembler;

    let mut w = walk::ParWalker::path(&root_dir);

    w.filter("**/*.bup").case_insensitive(true);

    if let Some(num_threads) = num_threads {
        w.num_threads(num_threads);
    }

    if let Some(max_depth) = max_depth {
        w.max_depth(*max_depth);
    }

    let state = w.walk(
        SummaryState::new(report),
        // File handler. Called for every .bup file found in the directory.
        |state, output, file_path| {
            state
                .files_in_progress
                .lock()
                .unwrap()
                .push((file_path.clone(), Instant::now()));

            let record =
                summarize(assembler, &file_path, skip_larger, output);

            state
                .files_in_progress
                .lock()
                .unwrap()
                .retain(|(p, _)| !file_path.eq(p));

            if let Err(err) = state.report.lock().unwrap().write(&record) {
                state.write_failed.store(true, Ordering::Relaxed);
                return Err(err).with_context(|| {
                    format!("can't write to `{}`", output_path.display())
                });
            }

            state.num_processed.fetch_add(1, Ordering::Relaxed);

            let status = if record.is_corrupt() {
                state.num_corrupt.fetch_add(1, Ordering::Relaxed);
                "CORRUPT".paint(Red).bold()
            } else {
                "OK".paint(Green).bold()
            };

            let _ = output.send(Message::Info(format!(
                "Processing {} ... {}",
                record.container_path(),
                status
            )));

            Ok(())
        },
        // Error handler
        |err, output| {
            let error = err.to_string();
            let root_cause = err.root_cause().to_string();
            let msg = if error != root_cause {
                format!("{} {}: {}", "error:".paint(Red).bold(), error, root_cause)
            } else {
                format!("{} {}", "error:".paint(Red).bold(), error)
            };

            let _ = output.send(Message::Error(msg));

            // Without a report there's no point in going on.
            if err.is::<ReportError>() {
                return Err(err);
            }

            Ok(())
        },
    )?;

    if state.write_failed.load(Ordering::Relaxed) {
        bail!("report `{}` is incomplete", output_path.display());
    }

    state
        .report
        .into_inner()
        .unwrap()
        .into_inner()
        .with_context(|| format!("can't write to `{}`", output_path.display()))?;

    Ok(())
}

/// Builds the record for the container at `file_path`. A container that
/// can't be read, or that is larger than `skip_larger`, produces a corrupt
/// record.
fn summarize(
    assembler: &Assembler,
    file_path: &Path,
    skip_larger: Option<u64>,
    output: &crossbeam::channel::Sender<Message>,
) -> SummaryRecord {
    // The host the container was collected from is the name of the directory
    // where it is.
    let hostname = file_path
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();

    let container_path = file_path.to_string_lossy();

    if let Some(max_file_size) = skip_larger {
        // Errors are reported below, when the file is read.
        if let Ok(metadata) = fs::metadata(file_path) {
            if metadata.len() > max_file_size {
                let _ = output.send(Message::Error(format!(
                    "{} `{}` is larger than {} bytes, reported as corrupt",
                    "warning:".paint(Yellow).bold(),
                    container_path,
                    max_file_size
                )));
                return SummaryRecord::corrupt(hostname, container_path);
            }
        }
    }

    match fs::read(file_path) {
        Ok(data) => assembler.extract(&data, &hostname, &container_path),
        Err(err) => {
            let _ = output.send(Message::Error(format!(
                "{} can't read `{}`: {}",
                "error:".paint(Red).bold(),
                container_path,
                err
            )));
            SummaryRecord::corrupt(hostname, container_path)
        }
    }
}

struct SummaryState {
    start_time: Instant,
    num_processed: AtomicUsize,
    num_corrupt: AtomicUsize,
    files_in_progress: Mutex<Vec<(PathBuf, Instant)>>,
    report: Mutex<ReportWriter<BufWriter<File>>>,
    write_failed: AtomicBool,
}

impl SummaryState {
    fn new(report: ReportWriter<BufWriter<File>>) -> Self {
        Self {
            start_time: Instant::now(),
            num_processed: AtomicUsize::new(0),
            num_corrupt: AtomicUsize::new(0),
            files_in_progress: Mutex::new(Vec::new()),
            report: Mutex::new(report),
            write_failed: AtomicBool::new(false),
        }
    }
}

// superconsole will not print any string that contains Unicode characters
// that are spaces but are not the ASCII space character, so we replace them
// all.
fn replace_whitespace(path: &Path) -> Cow<str> {
    let s = path.to_string_lossy();
    if s.chars().any(|c| c != ' ' && c.is_whitespace()) {
        s.chars().map(|c| if c.is_whitespace() { ' ' } else { c }).collect()
    } else {
        s
    }
}

impl Component for SummaryState {
    fn draw_unchecked(
        &self,
        dimensions: superconsole::Dimensions,
        mode: superconsole::DrawMode,
    ) -> anyhow::Result<Lines> {
        let mut lines = Lines::new();

        lines.push(Line::from_iter([Span::new_unstyled(
            "─".repeat(dimensions.width),
        )?]));

        let processed = format!(
            " {} file(s) processed in {:.1}s. ",
            self.num_processed.load(Ordering::Relaxed),
            self.start_time.elapsed().as_secs_f32()
        );

        let num_corrupt = self.num_corrupt.load(Ordering::Relaxed);
        let corrupt = format!("{} corrupt.", num_corrupt);

        lines.push(Line::from_iter([
            Span::new_unstyled(processed)?,
            Span::new_styled(if num_corrupt > 0 {
                corrupt.red().bold()
            } else {
                corrupt.green().bold()
            })?,
        ]));

        if matches!(mode, superconsole::DrawMode::Normal) {
            lines.push(Line::from_iter([Span::new_unstyled(
                "╶".repeat(dimensions.width),
            )?]));

            for (file, start_time) in
                self.files_in_progress.lock().unwrap().iter()
            {
                let path = replace_whitespace(file);
                // The length of the elapsed time is 7 characters.
                let path = truncate_with_ellipsis(
                    path,
                    dimensions.width.saturating_sub(7),
                );
                let spaces = " "
                    .repeat(dimensions.width.saturating_sub(path.len() + 7));
                let line = format!(
                    "{}{}{:6.1}s",
                    path,
                    spaces,
                    start_time.elapsed().as_secs_f32()
                );
                lines.push(Line::from_iter([Span::new_unstyled(line)?]))
            }
        }

        Ok(lines)
    }
}
