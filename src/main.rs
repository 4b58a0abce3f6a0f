use std::collections::BTreeMap;
use std::io::{self, stdout};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use serde::Serialize;

use statpoll::config::{self, Config};
use statpoll::event::EventHandler;
use statpoll::format::format_bytes;
use statpoll::logging::{self, LogLevel};
use statpoll::metrics::{HostInfo, MetricSource, Snapshot, SysinfoSource};
use statpoll::poll::{PollScheduler, TraceSpec};
use statpoll::screen::{CrosstermOut, FrameInput, ScreenWriter, render};
use statpoll::stats::{PidStats, ProcessRecord};

#[derive(Parser)]
#[command(
    name = "statpoll",
    about = "Show local system stats: current values with a running historical \
             average, updated in place. Can also trace a process by name with \
             its open files and usage. Without --poll, prints one sample and exits."
)]
struct Cli {
    /// Poll interval in seconds; enables continuous mode
    #[arg(long, short, value_name = "SECONDS")]
    poll: Option<u64>,

    /// Restrict network stats to one interface
    #[arg(long, short, value_name = "IFACE")]
    network: Option<String>,

    /// Track processes whose name contains this pattern and list their open files
    #[arg(long, short, value_name = "PATTERN")]
    trace: Option<String>,

    /// Match --trace patterns case-insensitively
    #[arg(long)]
    ignore_case: bool,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// One-shot mode: print the sample as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(long, conflicts_with = "info")]
    debug: bool,

    /// Info logging
    #[arg(long)]
    info: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(LogLevel::from_flags(cli.debug, cli.info))?;

    let config = match &cli.config {
        Some(path) => config::load_config_from_path(path),
        None => config::load_config(),
    };

    let mut source = SysinfoSource::new(
        config.network.ignore_interfaces.clone(),
        cli.network.clone(),
    );
    if let Some(iface) = &cli.network
        && !source.interface_known(iface)
    {
        return Err(eyre!("unknown network interface: {iface}"));
    }

    let trace = cli.trace.clone().map(|pattern| TraceSpec {
        pattern,
        case_sensitive: !cli.ignore_case,
    });
    let mut stats = if trace.is_some() {
        PidStats::explicit()
    } else {
        PidStats::all()
    };

    let mut scheduler = PollScheduler::new(cli.poll.unwrap_or(1), config.categories.enabled())?
        .with_trace(trace)
        .with_open_files_every(config.general.open_files_every)
        .with_max_rows(config.general.max_rows)
        .with_average_window(config.general.average_window);

    match cli.poll {
        None => run_once(&cli, &config, &mut scheduler, &mut source, &mut stats),
        Some(_) => run_loop(&mut scheduler, &mut source, &mut stats).await,
    }
}

/// Continuous mode: raw-mode alternate-screen display updated in place.
async fn run_loop(
    scheduler: &mut PollScheduler,
    source: &mut SysinfoSource,
    stats: &mut PidStats,
) -> Result<()> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, Hide)?;

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut screen = ScreenWriter::new(CrosstermOut::new(stdout()));
    let result = async {
        screen.init(&source.host_info())?;
        let mut events = EventHandler::new(scheduler.interval());
        scheduler.run(&mut events, source, stats, &mut screen).await
    }
    .await;

    disable_raw_mode()?;
    execute!(stdout(), Show, LeaveAlternateScreen)?;
    Ok(result?)
}

#[derive(Serialize)]
struct OneShotReport<'a> {
    host: &'a HostInfo,
    snapshot: &'a Snapshot,
    processes: &'a BTreeMap<u32, ProcessRecord>,
}

/// One-shot mode: collect a single sample and print it to stdout without
/// touching the terminal mode.
fn run_once(
    cli: &Cli,
    config: &Config,
    scheduler: &mut PollScheduler,
    source: &mut SysinfoSource,
    stats: &mut PidStats,
) -> Result<()> {
    // A single CPU reading needs two refreshes with a short gap between.
    source.settle_cpu();

    let (snapshot, table) = scheduler.collect(source);
    if let Some(table) = &table {
        if let Some(pattern) = &cli.trace {
            stats.track(source.find_pids(pattern, !cli.ignore_case));
        }
        stats.refresh(table);
        let pids = stats.tracked_pids();
        stats.open_files(source, &pids);
    }
    let host = source.host_info();

    if cli.json {
        let report = OneShotReport {
            host: &host,
            snapshot: &snapshot,
            processes: stats.records(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in render::host_lines(&host) {
        println!("{line}");
    }
    // Rates need a prior tick; a one-shot shows the raw counters instead.
    if let Some(interfaces) = &snapshot.network {
        for (iface, counters) in interfaces {
            println!(
                "net   {iface}  rx {} total  tx {} total  err {}/{}",
                format_bytes(counters.bytes_recv),
                format_bytes(counters.bytes_sent),
                counters.errin,
                counters.errout,
            );
        }
    }
    let mut categories = config.categories.enabled();
    categories.remove(&statpoll::metrics::Category::Network);
    let rates = BTreeMap::new();
    let averages = statpoll::history::AvgStore::new(config.general.average_window);
    let input = FrameInput {
        snapshot: &snapshot,
        records: table.is_some().then(|| stats.records()),
        rates: &rates,
        averages: &averages,
        categories: &categories,
        max_rows: config.general.max_rows,
        show_open_files: cli.trace.is_some(),
    };
    for (_, text) in render::build_regions(&input) {
        println!("{text}");
    }
    Ok(())
}
