mod action;
mod checkpoint;
mod cli;
mod config;
mod entry;
mod lock;
mod policy;
mod reconciler;
mod scanner;
mod state_store;
mod volume;
mod walker;

use action::Hook;
use cli::{Cli, Command, LogLevel};
use config::{ChecksumMode, ScannerConfig, SizeLimit, TimestampSources};
use entry::RemovalOptions;
use scanner::ScanSummary;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;

/// Process exit codes. `0` means a clean run; `1` means the run completed
/// but found entries out of policy (or, for `status`, found a shape
/// change); `255` means the run itself failed.
enum ExitCode {
    Clean,
    PolicyViolationsFound,
    Fatal,
}

impl ExitCode {
    fn code(&self) -> i32 {
        match self {
            ExitCode::Clean => 0,
            ExitCode::PolicyViolationsFound => 1,
            ExitCode::Fatal => 255,
        }
    }
}

/// Renders events with an emoji prefix when stderr is a terminal, falling
/// back to a plain text level prefix otherwise (redirected-to-file CI
/// logs, piped output).
struct EmojiFormatter;

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let is_tty = std::io::stderr().is_terminal();
        let level = *event.metadata().level();
        let prefix = if is_tty {
            match level {
                Level::ERROR => "\u{1F6A8}",
                Level::WARN => "\u{26A0}\u{FE0F} ",
                Level::INFO => "\u{2139}\u{FE0F} ",
                Level::DEBUG => "\u{1F41B}",
                Level::TRACE => "\u{1F50D}",
            }
        } else {
            match level {
                Level::ERROR => "ERROR:",
                Level::WARN => "WARN:",
                Level::INFO => "INFO:",
                Level::DEBUG => "DEBUG:",
                Level::TRACE => "TRACE:",
            }
        };
        write!(writer, "{prefix} ")?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn init_tracing(verbose: u8, log_level: Option<LogLevel>) {
    let directive = if let Some(level) = log_level {
        match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(EmojiFormatter)
        .with_writer(std::io::stderr)
        .init();
}

fn checksum_mode_from_flags(use_checksum: bool, use_checksum_always: bool) -> ChecksumMode {
    if use_checksum_always {
        ChecksumMode::Always
    } else if use_checksum {
        ChecksumMode::OnChange
    } else {
        ChecksumMode::Never
    }
}

/// Builds a `ScannerConfig` from `scan` subcommand flags. The default
/// `on_entry_past_limit` hook performs the removal itself via
/// `Entry::remove`, honoring `--dry-run`/`--sudo`/`--secure-wipe`; passing
/// `--on-past-limit` overrides it with a shell command template.
#[allow(clippy::too_many_arguments)]
fn build_scan_config(
    directory: std::path::PathBuf,
    database: Option<std::path::PathBuf>,
    days: Option<f64>,
    max_size: Option<String>,
    depth: Option<u32>,
    atime: bool,
    mtime: bool,
    use_checksum: bool,
    use_checksum_always: bool,
    check_window: f64,
    cache_attrs: bool,
    minimal_scan: bool,
    prune_dirs: bool,
    sudo: bool,
    dry_run: bool,
    secure_wipe: Option<String>,
    checkpoint_bytes: u64,
    on_past_limit: Option<String>,
) -> anyhow::Result<ScannerConfig> {
    let database = database.unwrap_or_else(|| ScannerConfig::default_database_path(&directory));
    let max_size = max_size.map(|s| SizeLimit::parse(&s)).transpose()?;

    let removal_options = RemovalOptions {
        dryrun: dry_run,
        sudo,
        secure_wipe: secure_wipe.clone(),
    };
    let on_entry_past_limit = match on_past_limit {
        Some(cmd) => Hook::Command(cmd),
        None => Hook::Callable(Arc::new(move |entry: &entry::Entry| {
            if let Err(e) = entry.remove(&removal_options) {
                tracing::warn!("removal failed for {}: {}", entry.path.display(), e);
            }
            true
        })),
    };

    Ok(ScannerConfig {
        directory,
        database,
        days,
        max_size,
        depth,
        timestamps: TimestampSources {
            use_atime: atime,
            use_mtime: mtime,
        },
        checksum_mode: checksum_mode_from_flags(use_checksum, use_checksum_always),
        check_window: Duration::from_secs_f64((check_window * 86400.0).max(0.0)),
        cache_attrs,
        minimal_scan,
        prune_dirs,
        sudo,
        dryrun: dry_run,
        secure_wipe,
        checkpoint_bytes,
        on_entry_added: Hook::Callable(Arc::new(|entry: &entry::Entry| {
            tracing::info!("added: {}", entry.path.display());
            true
        })),
        on_entry_changed: Hook::Callable(Arc::new(|entry: &entry::Entry| {
            tracing::info!("changed: {}", entry.path.display());
            true
        })),
        on_entry_removed: Hook::Callable(Arc::new(|entry: &entry::Entry| {
            tracing::info!("removed: {}", entry.path.display());
            true
        })),
        on_entry_past_limit,
    })
}

fn print_summary(label: &str, summary: &ScanSummary) {
    if summary.skipped {
        println!("{label}: skipped (minimal-scan, root unchanged)");
        return;
    }
    println!(
        "{label}: added={} changed={} unchanged={} removed={} past_age_limit={} past_size_limit={}",
        summary.added,
        summary.changed,
        summary.unchanged,
        summary.removed,
        summary.past_age_limit,
        summary.past_size_limit
    );
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_level);

    match cli.command {
        Command::Scan {
            directory,
            database,
            days,
            max_size,
            depth,
            atime,
            mtime,
            use_checksum,
            use_checksum_always,
            check_window,
            cache_attrs,
            minimal_scan,
            prune_dirs,
            sudo,
            dry_run,
            secure_wipe,
            checkpoint_bytes,
            on_past_limit,
        } => {
            let config = build_scan_config(
                directory,
                database,
                days,
                max_size,
                depth,
                atime,
                mtime,
                use_checksum,
                use_checksum_always,
                check_window,
                cache_attrs,
                minimal_scan,
                prune_dirs,
                sudo,
                dry_run,
                secure_wipe,
                checkpoint_bytes,
                on_past_limit,
            )?;
            let summary = scanner::scan(&config)?;
            print_summary("scan", &summary);
            if summary.past_age_limit > 0 || summary.past_size_limit > 0 {
                Ok(ExitCode::PolicyViolationsFound)
            } else {
                Ok(ExitCode::Clean)
            }
        }
        Command::Status { directory, database } => {
            let database =
                database.unwrap_or_else(|| ScannerConfig::default_database_path(&directory));
            let config = ScannerConfig {
                directory,
                database,
                days: None,
                max_size: None,
                depth: None,
                timestamps: TimestampSources::default(),
                checksum_mode: ChecksumMode::Never,
                check_window: Duration::from_secs(7 * 86400),
                cache_attrs: false,
                minimal_scan: false,
                prune_dirs: false,
                sudo: false,
                dryrun: true,
                secure_wipe: None,
                checkpoint_bytes: ScannerConfig::DEFAULT_CHECKPOINT_BYTES,
                on_entry_added: Hook::Callable(Arc::new(|_| true)),
                on_entry_changed: Hook::Callable(Arc::new(|_| true)),
                on_entry_removed: Hook::Callable(Arc::new(|_| true)),
                on_entry_past_limit: Hook::Callable(Arc::new(|_| true)),
            };
            let summary = scanner::status(&config)?;
            print_summary("status", &summary);
            if summary.added > 0 || summary.changed > 0 || summary.removed > 0 {
                Ok(ExitCode::PolicyViolationsFound)
            } else {
                Ok(ExitCode::Clean)
            }
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code.code()),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(ExitCode::Fatal.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mode_prefers_always_over_on_change() {
        assert!(matches!(
            checksum_mode_from_flags(true, true),
            ChecksumMode::Always
        ));
        assert!(matches!(
            checksum_mode_from_flags(true, false),
            ChecksumMode::OnChange
        ));
        assert!(matches!(checksum_mode_from_flags(false, false), ChecksumMode::Never));
    }

    #[test]
    fn exit_codes_match_conventions() {
        assert_eq!(ExitCode::Clean.code(), 0);
        assert_eq!(ExitCode::PolicyViolationsFound.code(), 1);
        assert_eq!(ExitCode::Fatal.code(), 255);
    }
}
