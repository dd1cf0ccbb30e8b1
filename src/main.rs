//! webwii - binary image loader for a browser Wii emulator front end
//!
//! Reads WAD archives, DOL/ELF executables and NAND backups, validates them,
//! stages them under the virtual namespace and, with `--commit`, runs each
//! staged file through the confirmation gate.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use ww_core::{Config, WebWiiError};
use ww_integration::{
    CommitOutcome, Confirmation, LoadPipeline, OperationEvent, OperationGate, OperationKind,
    PendingOperation, SimulatedSink,
};
use ww_loader::FileSource;

#[derive(Parser, Debug)]
#[command(
    name = "webwii",
    about = "Validate and stage Wii binary images (.wad, .dol, .elf, .bin), optionally installing them."
)]
struct Args {
    /// Files to load
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Install or restore every staged file after confirmation
    #[arg(long, action = clap::ArgAction::SetTrue)]
    commit: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short = 'y', long, action = clap::ArgAction::SetTrue)]
    yes: bool,

    /// Print one JSON report per file instead of text
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,

    /// Suppress progress output
    #[arg(long, action = clap::ArgAction::SetTrue)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .map_err(|e| WebWiiError::Config(format!("{}: {}", path.display(), e)))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Using default configuration: {}", e);
            Config::default()
        }),
    };

    ww_core::logging::init(config.debug.log_level);
    info!("Starting webwii loader");

    run(args, config).await
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let show_progress = !args.quiet && !args.json;

    let (tx, rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(render_operations(rx, show_progress));
    let mut pipeline = LoadPipeline::new(&config).with_gate(OperationGate::new().with_events(tx));

    let mut staged = Vec::new();
    let mut failures = 0usize;

    for file in &args.files {
        match ingest(&mut pipeline, file, show_progress).await {
            Ok(report) => {
                if args.json {
                    println!(
                        "{}",
                        json!({
                            "file": file.display().to_string(),
                            "status": "staged",
                            "path": report.path,
                            "profile": report.profile,
                            "bytes": report.bytes,
                            "verdict": report.verdict,
                        })
                    );
                } else {
                    println!(
                        "{}: staged at {} ({}, {} bytes)",
                        file.display(),
                        report.path,
                        report.profile,
                        report.bytes
                    );
                    for warning in &report.verdict.warnings {
                        println!("  warning: {}", warning);
                    }
                }
                staged.push(report.path);
            }
            Err(e) => {
                failures += 1;
                print_failure(&args, Phase::Ingest, file.display().to_string(), &e);
            }
        }
    }

    if args.commit {
        let mut confirmation = PromptConfirmation::terminal(args.yes);
        let mut sink = SimulatedSink::from_config(&config.install);

        for path in &staged {
            match pipeline.commit(path, &mut confirmation, &mut sink).await {
                Ok(CommitOutcome::Completed(report)) => {
                    if args.json {
                        println!(
                            "{}",
                            json!({
                                "path": report.path,
                                "status": "committed",
                                "kind": report.kind.to_string(),
                                "progress": report.progress,
                            })
                        );
                    } else {
                        println!("{}: {} complete", report.path, report.kind);
                    }
                }
                Ok(CommitOutcome::Cancelled) => {
                    if args.json {
                        println!("{}", json!({ "path": path, "status": "cancelled" }));
                    } else {
                        println!("{}: cancelled, still staged", path);
                    }
                }
                Err(e) => {
                    failures += 1;
                    print_failure(&args, Phase::Commit, path.clone(), &e);
                }
            }
        }
    }

    // Closing the gate's sender lets the renderer finish
    drop(pipeline);
    events.await.context("progress renderer panicked")?;

    if failures > 0 {
        anyhow::bail!("{} operation(s) failed", failures);
    }
    Ok(())
}

async fn ingest(
    pipeline: &mut LoadPipeline,
    file: &Path,
    show_progress: bool,
) -> Result<ww_integration::IngestReport, WebWiiError> {
    let source = FileSource::open(file).await?;

    let pb = if show_progress {
        bar(&format!("read {}", file.display()))
    } else {
        ProgressBar::hidden()
    };

    let result = pipeline
        .ingest(source, |percent| match percent {
            Some(p) => pb.set_position(u64::from(p)),
            None => pb.set_message("streaming"),
        })
        .await;

    match &result {
        Ok(_) => pb.finish_and_clear(),
        Err(_) => pb.abandon(),
    }
    result
}

/// Which step of the run a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ingest,
    Commit,
}

/// JSON line for a failed file or commit
fn failure_report(phase: Phase, subject: &str, error: &WebWiiError) -> serde_json::Value {
    let mut out = match phase {
        Phase::Ingest => json!({ "file": subject, "status": "rejected" }),
        Phase::Commit => json!({ "path": subject, "status": "failed" }),
    };
    out["message"] = json!(error.to_string());
    if let WebWiiError::Validation(v) = error {
        out["errors"] = json!(v.errors);
    }
    out
}

fn print_failure(args: &Args, phase: Phase, subject: String, error: &WebWiiError) {
    warn!("{}: {}", subject, error);
    if args.json {
        println!("{}", failure_report(phase, &subject, error));
    } else {
        eprintln!("{}: {}", subject, error);
    }
}

fn bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{msg:30} [{bar:40.cyan/blue}] {pos:>3}%") {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Draw one bar per running operation from the gate's event stream
async fn render_operations(mut rx: mpsc::UnboundedReceiver<OperationEvent>, show: bool) {
    let mut current: Option<(u64, ProgressBar)> = None;

    while let Some(event) = rx.recv().await {
        match event {
            OperationEvent::Started { id, path } => {
                let pb = if show { bar(&path) } else { ProgressBar::hidden() };
                current = Some((id, pb));
            }
            OperationEvent::Progress { id, percent } => {
                if let Some((_, pb)) = current.as_ref().filter(|(cur, _)| *cur == id) {
                    pb.set_position(u64::from(percent));
                }
            }
            OperationEvent::Succeeded { id } => {
                if let Some((_, pb)) = current.take_if(|(cur, _)| *cur == id) {
                    pb.finish_and_clear();
                }
            }
            OperationEvent::Failed { id, reason } => {
                if let Some((_, pb)) = current.take_if(|(cur, _)| *cur == id) {
                    pb.abandon_with_message(reason);
                }
            }
            OperationEvent::Cancelled { .. } => {}
        }
    }
}

/// Asks on the terminal before anything destructive runs
///
/// One reader is kept for the whole run so answers piped in ahead of
/// time are not lost between prompts.
struct PromptConfirmation<R, W> {
    assume_yes: bool,
    input: Lines<R>,
    output: W,
}

impl PromptConfirmation<BufReader<Stdin>, Stdout> {
    fn terminal(assume_yes: bool) -> Self {
        Self::new(
            assume_yes,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }
}

impl<R, W> PromptConfirmation<R, W>
where
    R: AsyncBufRead + Unpin,
{
    fn new(assume_yes: bool, input: R, output: W) -> Self {
        Self {
            assume_yes,
            input: input.lines(),
            output,
        }
    }
}

#[async_trait]
impl<R, W> Confirmation for PromptConfirmation<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(&mut self, op: &PendingOperation) -> bool {
        if self.assume_yes {
            return true;
        }

        let warning = match op.kind() {
            OperationKind::Install => "This installs the title and may replace an installed copy.",
            OperationKind::Restore => "This overwrites the entire NAND with the backup.",
        };
        let prompt = format!(
            "{} {} ({} bytes)? {} [y/N] ",
            op.kind(),
            op.target_path(),
            op.target().buffer().len(),
            warning
        );

        if self.output.write_all(prompt.as_bytes()).await.is_err()
            || self.output.flush().await.is_err()
        {
            return false;
        }

        match self.input.next_line().await {
            Ok(Some(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            // End of input or a read error declines
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ww_core::error::ValidationError;
    use ww_loader::{ByteBuffer, FileProfile};
    use ww_vfs::StagingNamespace;

    fn pending(gate: &OperationGate, path: &str) -> PendingOperation {
        let mut staging = StagingNamespace::new();
        staging
            .stage(path, FileProfile::ExecutableImage, ByteBuffer::new(vec![0; 300]))
            .unwrap();
        gate.request(OperationKind::Install, staging.take(path).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_prompt_reads_each_piped_answer() {
        let gate = OperationGate::new();
        let mut prompt = PromptConfirmation::new(false, &b"y\nyes\nn\n"[..], Vec::new());

        assert!(prompt.confirm(&pending(&gate, "/roms/a.dol")).await);
        assert!(prompt.confirm(&pending(&gate, "/roms/b.dol")).await);
        assert!(!prompt.confirm(&pending(&gate, "/roms/c.dol")).await);

        let shown = String::from_utf8(prompt.output).unwrap();
        assert_eq!(shown.matches("[y/N]").count(), 3);
        assert!(shown.contains("/roms/b.dol (300 bytes)"));
    }

    #[tokio::test]
    async fn test_prompt_declines_at_end_of_input() {
        let gate = OperationGate::new();
        let mut prompt = PromptConfirmation::new(false, &b"Y\n"[..], Vec::new());

        assert!(prompt.confirm(&pending(&gate, "/roms/a.dol")).await);
        assert!(!prompt.confirm(&pending(&gate, "/roms/b.dol")).await);
    }

    #[tokio::test]
    async fn test_assume_yes_skips_prompt() {
        let gate = OperationGate::new();
        let mut prompt = PromptConfirmation::new(true, &b""[..], Vec::new());

        assert!(prompt.confirm(&pending(&gate, "/roms/a.dol")).await);
        assert!(prompt.output.is_empty());
    }

    #[test]
    fn test_failure_report_keys_follow_phase() {
        let error = WebWiiError::UnknownType("movie.mkv".to_string());

        let ingest = failure_report(Phase::Ingest, "movie.mkv", &error);
        assert_eq!(ingest["file"], "movie.mkv");
        assert_eq!(ingest["status"], "rejected");
        assert!(ingest.get("path").is_none());

        let commit = failure_report(Phase::Commit, "/roms/a.dol", &error);
        assert_eq!(commit["path"], "/roms/a.dol");
        assert_eq!(commit["status"], "failed");
        assert!(commit.get("file").is_none());
        assert_eq!(commit["message"], error.to_string());
    }

    #[test]
    fn test_failure_report_lists_validation_errors() {
        let error = WebWiiError::Validation(ValidationError {
            errors: vec!["archive is smaller than 64 bytes".to_string()],
        });
        let out = failure_report(Phase::Ingest, "tiny.wad", &error);
        assert_eq!(out["errors"][0], "archive is smaller than 64 bytes");
    }
}
