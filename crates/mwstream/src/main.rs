//! `mwstream` entrypoint: one subcommand per revision-pipeline utility, each a
//! thin driver wired to the library crates (`mw-stream`, `mw-text`,
//! `mw-engine`, `mw-stages`, `mw-config`).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mw_model::{DiffDoc, PersistenceStat, Revision};
use mw_stages::ancillary::HadoopPagePair;
use mw_stages::{DiffStageConfig, StatsConfig};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "mwstream", version, about = "MediaWiki revision-history streaming pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct Verbosity {
    /// Print one ASCII character per revision to stderr ('.' ok, 'T' timeout, 'M' mended).
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read revision documents (one or more already-decoded dump files, or stdin) and re-emit them.
    Dump2Json {
        files: Vec<PathBuf>,
        #[arg(long)]
        threads: Option<usize>,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Read revision documents from dump files (or stdin) and emit per-revision diffs.
    Dump2Diffs {
        files: Vec<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        drop_text: bool,
        #[arg(long)]
        threads: Option<usize>,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Diff a single page-partitioned, chronologically sorted stdin stream.
    Json2Diffs {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        drop_text: bool,
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(long, value_delimiter = ',')]
        namespaces: Option<Vec<i32>>,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Repair the `last_id` seams of a diff stream assembled from independently-diffed blocks.
    MendDiffs {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        drop_text: bool,
        #[arg(long)]
        timeout: Option<f64>,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Apply a diff stream to the token-persistence engine, emitting per-token stats.
    Diffs2Persistence {
        /// RFC3339 timestamp, or the literal `<now>` to use the current time.
        #[arg(long)]
        sunset: String,
        #[arg(long, default_value_t = 50)]
        window: usize,
        #[arg(long, default_value_t = 15)]
        revert_radius: usize,
        #[arg(long)]
        keep_diff: bool,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Aggregate token-persistence stats into per-revision summaries.
    Persistence2Stats {
        #[arg(long, default_value_t = 5)]
        min_persisted: i64,
        #[arg(long, default_value_t = 14.0)]
        min_visible: f64,
        #[arg(long)]
        include: Option<String>,
        #[arg(long)]
        exclude: Option<String>,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Extract dot-path fields from each JSON document as a TSV row.
    Json2Tsv {
        #[arg(long)]
        header: bool,
        fields: Vec<String>,
    },
    /// Validate each JSON document against a schema, failing fast on the first mismatch.
    Validate { schema: PathBuf },
    /// Clip `text` to a character budget, flagging truncated documents.
    TruncateText {
        #[arg(long, default_value_t = mw_stages::ancillary::DEFAULT_MAX_CHARS)]
        max_chars: usize,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Rewrite documents into the current schema shape.
    Normalize,
    /// Keep only Wikihadoop page-pairs with exactly two revisions, emitting the newer one.
    Wikihadoop2Json {
        #[command(flatten)]
        verbosity: Verbosity,
    },
}

fn main() -> Result<()> {
    let _log_guard = init_logging()?;
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp
                    | clap::error::ErrorKind::DisplayVersion
                    | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            e.exit() // --help / --version: print and exit 0
        }
        Err(e) => {
            // An unknown subcommand or malformed flags is a fatal usage error
            // (exit 1), not clap's own default exit code 2.
            eprint!("{e}");
            std::process::exit(1);
        }
    };
    info!(target: "mwstream", command = ?cli.command, "startup");
    let result = dispatch(cli.command);
    if let Err(err) = &result {
        tracing::error!(target: "mwstream", %err, "run_failed");
    }
    result
}

fn init_logging() -> Result<Option<WorkerGuard>> {
    let file_appender = tracing_appender::rolling::never(".", "mwstream.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        Err(_) => Ok(None),
    }
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Dump2Json { files, threads, verbosity } => cmd_dump2json(files, threads, verbosity.verbose),
        Command::Dump2Diffs { files, config, drop_text, threads, verbosity } => {
            cmd_dump2diffs(files, config, drop_text, threads, verbosity.verbose)
        }
        Command::Json2Diffs { config, drop_text, timeout, namespaces, verbosity } => {
            cmd_json2diffs(config, drop_text, timeout, namespaces, verbosity.verbose)
        }
        Command::MendDiffs { config, drop_text, timeout, verbosity } => {
            cmd_mend_diffs(config, drop_text, timeout, verbosity.verbose)
        }
        Command::Diffs2Persistence { sunset, window, revert_radius, keep_diff, verbosity } => {
            cmd_diffs2persistence(sunset, window, revert_radius, keep_diff, verbosity.verbose)
        }
        Command::Persistence2Stats { min_persisted, min_visible, include, exclude, verbosity } => {
            cmd_persistence2stats(min_persisted, min_visible, include, exclude, verbosity.verbose)
        }
        Command::Json2Tsv { header, fields } => cmd_json2tsv(header, fields),
        Command::Validate { schema } => cmd_validate(schema),
        Command::TruncateText { max_chars, verbosity } => cmd_truncate_text(max_chars, verbosity.verbose),
        Command::Normalize => cmd_normalize(),
        Command::Wikihadoop2Json { verbosity } => cmd_wikihadoop2json(verbosity.verbose),
    }
}

fn progress_tick(verbose: bool, ch: char) {
    if verbose {
        eprint!("{ch}");
        let _ = io::stderr().flush();
    }
}

fn stdin_reader() -> BufReader<io::Stdin> {
    BufReader::new(io::stdin())
}

fn write_stdout_lines(lines: impl Iterator<Item = Result<String>>) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in lines {
        writeln!(out, "{}", line?)?;
    }
    Ok(())
}

/// Parse revisions (stopping, not panicking, at the first malformed line) and feed the
/// well-formed prefix to `diff_stage`; the first parse failure, if any, is stashed here and
/// surfaced by [`check_stream_error`] once the caller has drained the diff iterator.
fn diffed_revisions<R: BufRead>(
    reader: R,
    config: DiffStageConfig,
) -> (impl Iterator<Item = Result<DiffDoc, mw_stages::StageError>>, Rc<RefCell<Option<mw_stream::StreamError>>>) {
    let error = Rc::new(RefCell::new(None));
    let error_sink = error.clone();
    let revisions = mw_stream::read_docs::<Revision, _>(reader, 1).scan((), move |_, r| match r {
        Ok(rev) => Some(rev),
        Err(e) => {
            *error_sink.borrow_mut() = Some(e);
            None
        }
    });
    (mw_stages::diff_stage(revisions, config), error)
}

fn check_stream_error(error: Rc<RefCell<Option<mw_stream::StreamError>>>) -> Result<()> {
    if let Some(e) = error.borrow_mut().take() {
        return Err(anyhow::Error::from(e)).context("reading revisions");
    }
    Ok(())
}

fn resolve_diff_engine(config: Option<PathBuf>) -> Result<()> {
    mw_config::load_from(config).context("loading diff engine config")?;
    Ok(())
}

// --- dump2json / dump2diffs: multi-file worker fan-out ----------------------------------

fn partition_round_robin(files: Vec<PathBuf>, threads: usize) -> Vec<Vec<PathBuf>> {
    let threads = threads.max(1);
    let mut chunks = vec![Vec::new(); threads];
    for (i, file) in files.into_iter().enumerate() {
        chunks[i % threads].push(file);
    }
    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}

/// One OS thread per (capped) partition of `files`; each thread runs `process_file` against
/// its own files in turn and every worker feeds a single writer thread over an mpsc channel,
/// so output interleaves at line granularity but page state never crosses a thread boundary.
fn fan_out<F>(files: Vec<PathBuf>, threads: Option<usize>, process_file: F) -> Result<()>
where
    F: Fn(&Path, &mpsc::Sender<String>) -> Result<()> + Clone + Send + 'static,
{
    let thread_count = threads.unwrap_or(files.len()).max(1);
    let (tx, rx) = mpsc::channel::<String>();
    let writer = std::thread::spawn(move || -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for line in rx {
            writeln!(out, "{line}")?;
        }
        Ok(())
    });

    let mut handles = Vec::new();
    for chunk in partition_round_robin(files, thread_count) {
        let tx = tx.clone();
        let process_file = process_file.clone();
        handles.push(std::thread::spawn(move || -> Result<()> {
            for file in chunk {
                process_file(&file, &tx)?;
            }
            Ok(())
        }));
    }
    drop(tx);

    let mut worker_err = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if worker_err.is_none() => worker_err = Some(e),
            Ok(Err(_)) => {}
            Err(_) if worker_err.is_none() => worker_err = Some(anyhow!("worker thread panicked")),
            Err(_) => {}
        }
    }
    writer.join().map_err(|_| anyhow!("writer thread panicked"))??;
    if let Some(e) = worker_err {
        return Err(e);
    }
    Ok(())
}

fn cmd_dump2json(files: Vec<PathBuf>, threads: Option<usize>, verbose: bool) -> Result<()> {
    if files.is_empty() {
        return write_stdout_lines(mw_stream::read_docs::<Revision, _>(stdin_reader(), 1).map(move |r| {
            let revision = r.context("reading revision")?;
            progress_tick(verbose, '.');
            Ok(serde_json::to_string(&revision)?)
        }));
    }
    fan_out(files, threads, move |path, tx| {
        let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
        for result in mw_stream::read_docs::<Revision, _>(reader, 1) {
            let revision = result.with_context(|| format!("reading {}", path.display()))?;
            progress_tick(verbose, '.');
            tx.send(serde_json::to_string(&revision)?).map_err(|_| anyhow!("writer hung up"))?;
        }
        Ok(())
    })
}

fn cmd_dump2diffs(
    files: Vec<PathBuf>,
    config: Option<PathBuf>,
    drop_text: bool,
    threads: Option<usize>,
    verbose: bool,
) -> Result<()> {
    resolve_diff_engine(config)?;
    let diff_config = DiffStageConfig { timeout: None, drop_text, namespaces: None };
    if files.is_empty() {
        let (docs, error) = diffed_revisions(stdin_reader(), diff_config);
        write_stdout_lines(docs.map(|d| {
            let doc = d.context("diff stage")?;
            progress_tick(verbose, if doc.diff.ops.is_none() { 'T' } else { '.' });
            Ok(serde_json::to_string(&doc)?)
        }))?;
        return check_stream_error(error);
    }
    fan_out(files, threads, move |path, tx| {
        let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
        let (docs, error) = diffed_revisions(reader, diff_config.clone());
        for doc in docs {
            let doc = doc.with_context(|| format!("diffing {}", path.display()))?;
            progress_tick(verbose, if doc.diff.ops.is_none() { 'T' } else { '.' });
            tx.send(serde_json::to_string(&doc)?).map_err(|_| anyhow!("writer hung up"))?;
        }
        check_stream_error(error)
    })
}

// --- single-stream subcommands ----------------------------------------------------------

fn cmd_json2diffs(
    config: Option<PathBuf>,
    drop_text: bool,
    timeout: Option<f64>,
    namespaces: Option<Vec<i32>>,
    verbose: bool,
) -> Result<()> {
    resolve_diff_engine(config)?;
    let diff_config = DiffStageConfig { timeout: timeout.map(Duration::from_secs_f64), drop_text, namespaces };
    let (docs, error) = diffed_revisions(stdin_reader(), diff_config);
    write_stdout_lines(docs.map(|d| {
        let doc = d.context("diff stage")?;
        progress_tick(verbose, if doc.diff.ops.is_none() { 'T' } else { '.' });
        Ok(serde_json::to_string(&doc)?)
    }))?;
    check_stream_error(error)
}

fn cmd_mend_diffs(config: Option<PathBuf>, drop_text: bool, timeout: Option<f64>, verbose: bool) -> Result<()> {
    resolve_diff_engine(config)?;
    let docs: Vec<DiffDoc> = mw_stream::read_docs::<DiffDoc, _>(stdin_reader(), 1)
        .collect::<Result<_, _>>()
        .context("reading diff documents")?;
    let mended = mw_stages::mend_stage(docs.into_iter(), timeout.map(Duration::from_secs_f64));
    write_stdout_lines(mended.map(|d| {
        let mut doc = d.context("mend stage")?;
        progress_tick(verbose, 'M');
        if drop_text {
            doc.revision.text = None;
        }
        Ok(serde_json::to_string(&doc)?)
    }))
}

fn cmd_diffs2persistence(
    sunset: String,
    window: usize,
    revert_radius: usize,
    _keep_diff: bool,
    verbose: bool,
) -> Result<()> {
    // `_keep_diff` has no field to act on: a persistence stat's embedded `revision` is already
    // the minimal RevisionRef (mw-model), not a copy of the diff document itself.
    let sunset = if sunset == "<now>" {
        chrono::Utc::now()
    } else {
        sunset.parse::<mw_model::Timestamp>().with_context(|| format!("parsing --sunset {sunset}"))?
    };
    let docs: Vec<DiffDoc> = mw_stream::read_docs::<DiffDoc, _>(stdin_reader(), 1)
        .collect::<Result<_, _>>()
        .context("reading diff documents")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for group in mw_stream::group_by_page(docs.into_iter()) {
        let mut engine = mw_engine::PageEngine::new(window, revert_radius);
        for doc in group {
            progress_tick(verbose, '.');
            for stat in engine.process(doc).context("token persistence")? {
                writeln!(out, "{}", serde_json::to_string(&stat)?)?;
            }
        }
        for stat in engine.drain(sunset) {
            writeln!(out, "{}", serde_json::to_string(&stat)?)?;
        }
    }
    Ok(())
}

fn cmd_persistence2stats(
    min_persisted: i64,
    min_visible_days: f64,
    include: Option<String>,
    exclude: Option<String>,
    verbose: bool,
) -> Result<()> {
    let config = StatsConfig {
        min_persisted,
        min_visible_secs: (min_visible_days * 86_400.0) as i64,
        include: include.map(|p| regex::Regex::new(&p)).transpose().context("--include regex")?,
        exclude: exclude.map(|p| regex::Regex::new(&p)).transpose().context("--exclude regex")?,
    };
    let stats: Vec<PersistenceStat> = mw_stream::read_docs::<PersistenceStat, _>(stdin_reader(), 1)
        .map(|r| {
            progress_tick(verbose, '.');
            r
        })
        .collect::<Result<_, _>>()
        .context("reading persistence stats")?;
    write_stdout_lines(
        mw_stages::aggregate(stats, &config).into_iter().map(|s| Ok(serde_json::to_string(&s)?)),
    )
}

fn cmd_json2tsv(header: bool, fields: Vec<String>) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if header {
        writeln!(out, "{}", fields.join("\t"))?;
    }
    for line in stdin_reader().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: serde_json::Value = serde_json::from_str(&line).context("parsing document")?;
        writeln!(out, "{}", mw_stages::json2tsv(&doc, &fields))?;
    }
    Ok(())
}

fn cmd_validate(schema_path: PathBuf) -> Result<()> {
    let schema_text = std::fs::read_to_string(&schema_path)
        .with_context(|| format!("reading schema {}", schema_path.display()))?;
    let schema: serde_json::Value = serde_json::from_str(&schema_text).context("parsing schema")?;
    let docs: Vec<(usize, serde_json::Value)> = stdin_reader()
        .lines()
        .enumerate()
        .filter(|(_, l)| l.as_ref().map(|l| !l.trim().is_empty()).unwrap_or(true))
        .map(|(idx, l)| -> Result<(usize, serde_json::Value)> {
            Ok((idx + 1, serde_json::from_str(&l?).context("parsing document")?))
        })
        .collect::<Result<_>>()?;
    let validated = mw_stages::validate_stream(docs.into_iter(), &schema)?;
    write_stdout_lines(validated.map(|d| Ok(serde_json::to_string(&d?)?)))
}

fn cmd_truncate_text(max_chars: usize, verbose: bool) -> Result<()> {
    write_stdout_lines(
        stdin_reader()
            .lines()
            .filter(|l| l.as_ref().map(|l| !l.trim().is_empty()).unwrap_or(true))
            .map(move |line| {
                let doc: serde_json::Value = serde_json::from_str(&line?).context("parsing document")?;
                let out = mw_stages::truncate_text(doc, max_chars);
                if out["truncated"] == serde_json::Value::Bool(true) {
                    progress_tick(verbose, '.');
                }
                Ok(serde_json::to_string(&out)?)
            }),
    )
}

fn cmd_normalize() -> Result<()> {
    write_stdout_lines(
        stdin_reader()
            .lines()
            .filter(|l| l.as_ref().map(|l| !l.trim().is_empty()).unwrap_or(true))
            .map(|line| {
                let doc: serde_json::Value = serde_json::from_str(&line?).context("parsing document")?;
                Ok(serde_json::to_string(&mw_stages::normalize(doc))?)
            }),
    )
}

fn cmd_wikihadoop2json(verbose: bool) -> Result<()> {
    let pairs: Vec<HadoopPagePair> = stdin_reader()
        .lines()
        .filter(|l| l.as_ref().map(|l| !l.trim().is_empty()).unwrap_or(true))
        .map(|line| -> Result<HadoopPagePair> {
            let revisions: Vec<Revision> = serde_json::from_str(&line?).context("parsing page pair")?;
            Ok(HadoopPagePair { revisions })
        })
        .collect::<Result<_>>()?;
    write_stdout_lines(mw_stages::wikihadoop2json(pairs.into_iter()).map(move |revision| {
        progress_tick(verbose, '.');
        Ok(serde_json::to_string(&revision)?)
    }))
}
