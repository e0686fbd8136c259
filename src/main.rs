use anyhow::{bail, Context, Result};
use clap::Parser;
use confique::Config;
use crossbeam_channel::{tick, Receiver};
use log::{error, info, LevelFilter};
use scope_stream::*;
use simplelog::{
    ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "scope_stream")]
#[command(about = "Stream oscilloscope data to rotating files")]
struct Args {
    #[arg(long, short = 'c', default_value = "scope_stream.toml")]
    config: PathBuf,

    /// Channel settings file, overrides the one named in the config
    #[arg(long, short = 's')]
    settings: Option<PathBuf>,

    /// Run without the dashboard: arm, stream for `--duration` seconds, stop
    #[arg(long)]
    headless: bool,

    #[arg(long, short = 'd', default_value_t = 10)]
    duration: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let conf = Conf::builder()
        .file(&args.config)
        .load()
        .with_context(|| format!("loading {:?}", args.config))?;
    init_logging(&conf.logging, args.headless)?;

    let (mut controller, events) = AcquisitionController::with_event_queue(
        conf.acquisition.session_options(),
        Arc::new(SystemClock),
        1024,
    );
    let scope = SimulatedScope::new(conf.simulator.units)
        .with_pace(conf.simulator.pace)
        .with_overflow_after(conf.simulator.overflow_after);
    controller.open_device(Box::new(scope))?;
    configure(&mut controller, &conf, args.settings.as_ref())?;

    if args.headless {
        headless(controller, events, Duration::from_secs(args.duration))
    } else {
        let mut terminal = ratatui::init();
        let mut status = Status::new(controller, events);
        let result = status.run(&mut terminal);
        ratatui::restore();
        result
    }
}

fn init_logging(conf: &LoggingConf, headless: bool) -> Result<()> {
    let level = LevelFilter::from_str(&conf.level)
        .with_context(|| format!("bad log level {:?}", conf.level))?;
    let file = File::create(&conf.file).with_context(|| format!("creating {:?}", conf.file))?;

    let mut loggers: Vec<Box<dyn SharedLogger>> =
        vec![WriteLogger::new(level, simplelog::Config::default(), file)];
    if headless {
        loggers.push(TermLogger::new(
            level,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

/// Apply the config file, then either a settings file or the configured channel list.
fn configure(
    controller: &mut AcquisitionController,
    conf: &Conf,
    settings: Option<&PathBuf>,
) -> Result<()> {
    controller.set_params(conf.acquisition.params())?;
    controller.set_output(OutputTarget {
        base: conf.output.base_path(),
        format: conf.output.format,
        policy: conf.output.policy()?,
    })?;
    controller.set_preview(conf.acquisition.preview);

    if let Some(path) = settings.or(conf.output.settings.as_ref()) {
        return controller
            .load_settings(path)
            .with_context(|| format!("loading settings {:?}", path));
    }
    for index in 0..MAX_CHANNELS {
        let enabled = conf.acquisition.channels.contains(&(index + 1));
        controller.set_channel_enabled(index, enabled)?;
    }
    Ok(())
}

fn headless(
    mut controller: AcquisitionController,
    events: Receiver<SessionEvent>,
    duration: Duration,
) -> Result<()> {
    let params = controller.arm()?;
    info!("Armed with {:?}", params);
    controller.start()?;

    let ticker = tick(Duration::from_secs(1));
    let begin = Instant::now();
    let mut meter = RateMeter::new();
    while begin.elapsed() < duration {
        let _ = ticker.recv();
        while let Ok(ev) = events.try_recv() {
            match ev {
                SessionEvent::ChunkWritten { bytes, .. } => meter.record(bytes),
                SessionEvent::Preview(frame) => {
                    for trace in &frame.traces {
                        info!("{}", trace.range_label());
                    }
                }
                other => info!("{:?}", other),
            }
        }
        info!(
            "Time (s): {}\tChunks: {}\tRate (MB/s): {:.2}\tMean (MB/s): {:.2}",
            begin.elapsed().as_secs(),
            meter.chunks_total,
            meter.recent_rate(),
            meter.mean_rate()
        );
        if controller.status().state != SessionState::Streaming {
            break;
        }
    }

    let status = controller.status();
    if let Some(fault) = status.last_fault {
        error!("Acquisition faulted: {fault}");
        bail!("acquisition faulted: {fault}");
    }
    let report = controller.stop()?;
    for file in &report.files {
        info!(
            "{:?}: chunks {:?}..={:?}",
            file.path, file.first_sequence, file.last_sequence
        );
    }
    controller.close_device()?;
    Ok(())
}
