//! herald - 表ファイルから WhatsApp 送信をスケジュールするコマンド
//!
//! # サブコマンド
//! - schedule: 取り込み → キュー投入 → 全件が終わるまで送信
//! - preview: 列の推定結果と先頭行の確認
//! - check: 設定された資格情報の形式チェック
//! - send-test: 1 通だけ送って設定を確認

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald_core::HeraldConfig;
use herald_core::app::{
    Dispatcher, FileOutcome, JobBuilder, ReportStatus, UploadPipeline, send_test_message,
    wait_until_settled,
};
use herald_core::domain::LogKind;
use herald_core::impls::memory_log::export_csv;
use herald_core::impls::{
    CsvReportStore, DryRunSender, InMemoryLogSink, SharedCredentials, TwilioSender,
};
use herald_core::ingest::{ColumnRole, TableIngestor, Upload};
use herald_core::ports::{Clock, IdGenerator, LogSink, MessageSender, SystemClock, UlidGenerator};
use herald_core::queue::{InMemoryJobQueue, JobQueue};

const SETTLE_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Schedule WhatsApp messages from spreadsheets")]
#[command(version)]
struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(short, long, global = true, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest files, schedule every row and send until all are done.
    Schedule {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Log messages instead of sending them.
        #[arg(long)]
        dry_run: bool,

        /// Seconds between sends (0-60).
        #[arg(long)]
        delay: Option<f64>,

        /// Where to write the send log (CSV). Defaults to the reports directory.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show detected columns and the first rows of a file.
    Preview {
        file: PathBuf,

        #[arg(long, default_value_t = 10)]
        rows: usize,
    },

    /// Validate the configured messaging credentials.
    Check,

    /// Send one test message.
    SendTest {
        /// Recipient in E.164 form, e.g. +919876543210.
        #[arg(long)]
        to: String,

        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_cli=info,herald_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = HeraldConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Schedule {
            files,
            dry_run,
            delay,
            export,
        } => schedule(config, &files, dry_run, delay, export).await,
        Command::Preview { file, rows } => preview(&file, rows),
        Command::Check => check(&config),
        Command::SendTest { to, dry_run } => {
            let sender = build_sender(&config, dry_run || config.dry_run)?;
            let delivery_id = send_test_message(sender.as_ref(), &to).await?;
            println!("sent: {delivery_id}");
            Ok(())
        }
    }
}

fn build_sender(config: &HeraldConfig, dry_run: bool) -> Result<Arc<dyn MessageSender>> {
    if dry_run {
        info!("dry run: nothing will be sent");
        return Ok(Arc::new(DryRunSender::new()));
    }
    let Some(credentials) = config.twilio.credentials() else {
        bail!("twilio credentials are not configured (set [twilio] in the config or use --dry-run)");
    };
    let shared = Arc::new(SharedCredentials::default());
    shared.set(credentials).context("invalid twilio credentials")?;
    let sender = TwilioSender::with_base_url(shared, config.twilio.base_url.clone())?;
    Ok(Arc::new(sender))
}

async fn schedule(
    config: HeraldConfig,
    files: &[PathBuf],
    dry_run: bool,
    delay: Option<f64>,
    export: Option<PathBuf>,
) -> Result<()> {
    let sender = build_sender(&config, dry_run || config.dry_run)?;

    let pacing = Arc::new(config.pacing()?);
    if let Some(delay) = delay {
        let applied = pacing.set_secs(delay)?;
        info!(delay_ms = applied.as_millis() as u64, "pacing delay set");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let log = Arc::new(InMemoryLogSink::new());
    let queue = Arc::new(InMemoryJobQueue::new(
        Arc::clone(&clock),
        log.clone() as Arc<dyn LogSink>,
    ));
    let reports = Arc::new(CsvReportStore::new(&config.reports.dir));
    let builder = JobBuilder::new(config.zone()?, Arc::clone(&clock), reports)
        .with_phone_normalizer(config.phone_normalizer())
        .with_identity(config.dispatch.identity)
        .with_no_date_offset(config.no_date_offset());
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
    let pipeline = UploadPipeline::new(builder, queue.clone(), Arc::clone(&ids));

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let upload =
            Upload::from_path(path).with_context(|| format!("failed to read {}", path.display()))?;
        uploads.push(upload);
    }

    let dispatcher = Dispatcher::spawn(
        queue.clone(),
        sender,
        Arc::clone(&pacing),
        config.dispatch_settings(),
    );

    let summary = pipeline.submit(&uploads).await?;
    println!("{}", summary.batch_id);
    for file in &summary.files {
        match &file.outcome {
            FileOutcome::Ingested {
                rows,
                accepted,
                duplicates,
                unsendable,
                report,
            } => {
                println!(
                    "  {}: {rows} rows, {accepted} scheduled, {duplicates} already scheduled, {unsendable} without phone",
                    file.file
                );
                match report {
                    ReportStatus::Written(location) => println!("    audit report: {location}"),
                    ReportStatus::Failed(error) => println!("    audit report failed: {error}"),
                }
            }
            FileOutcome::Rejected { error } => println!("  {}: rejected ({error})", file.file),
        }
    }

    let interrupted = tokio::select! {
        counts = wait_until_settled(queue.as_ref(), SETTLE_POLL) => {
            let counts = counts?;
            println!("done: {counts}");
            false
        }
        _ = signal::ctrl_c() => {
            warn!("interrupted; finishing the message in flight");
            true
        }
    };
    dispatcher.shutdown_and_join().await;

    if interrupted {
        let counts = queue.counts_by_state().await?;
        println!("stopped: {counts}");
    }

    let export = export.unwrap_or_else(|| {
        Path::new(&config.reports.dir).join(format!("{}_send_log.csv", summary.batch_id))
    });
    export_log(log.as_ref(), &export)?;
    Ok(())
}

fn export_log(log: &dyn LogSink, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let entries = log.entries(None);
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let written = export_csv(&entries, file)?;

    let failed = log.entries(Some(LogKind::Failed)).len();
    println!("send log: {} ({written} entries, {failed} failed)", path.display());
    Ok(())
}

fn preview(path: &Path, rows: usize) -> Result<()> {
    let upload =
        Upload::from_path(path).with_context(|| format!("failed to read {}", path.display()))?;
    let table = TableIngestor::new().ingest(&upload)?;
    let columns = table.columns();

    println!("{}: {} rows", upload.name(), table.len());
    for role in ColumnRole::ALL {
        let header = columns
            .get(role)
            .map(|idx| table.headers()[idx].as_str())
            .unwrap_or("-");
        println!("  {:<8} {header}", role.as_str());
    }
    println!();
    println!("{}", table.headers().join(" | "));
    for row in table.preview(rows) {
        println!("{}", row.join(" | "));
    }
    Ok(())
}

fn check(config: &HeraldConfig) -> Result<()> {
    let Some(credentials) = config.twilio.credentials() else {
        bail!("twilio credentials are not configured");
    };
    credentials.validate()?;
    println!("credentials look valid for {credentials:?}");
    Ok(())
}
