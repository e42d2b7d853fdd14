use std::path::PathBuf;

use clap::Parser;
use tokio::time::Duration;

use shaperun_nav::announcement::{AnnouncementChannel, Announcer, RecordingAnnouncer};
use shaperun_nav::config::Config;
use shaperun_nav::navigation::GuidanceEvent;
use shaperun_nav::sensors::{
    LocationService, OrientationService, ReplayLocationService, ReplayOrientationService,
    TermuxLocationService, TermuxOrientationService,
};
use shaperun_nav::session::{NavigationSession, SessionReport};
use shaperun_nav::speech::CommandSynthesizer;
use shaperun_nav::trace::TraceFile;

#[derive(Parser, Debug)]
#[command(about = "Replay a recorded run through the turn-by-turn guidance engine")]
struct Args {
    /// Recorded run (*.json or *.json.gz)
    #[arg(long)]
    trace: PathBuf,

    /// TOML configuration; defaults apply when missing
    #[arg(long, default_value = "shaperun.toml")]
    config: PathBuf,

    /// Playback speed factor (0 = as fast as possible)
    #[arg(long, default_value = "0.0")]
    speed: f64,

    /// Ignore the recorded readings and guide along the trace's route with the
    /// Termux location and orientation sensors until Ctrl-C
    #[arg(long, default_value_t = false)]
    live: bool,

    /// Speak announcements through the configured voice command
    #[arg(long, default_value_t = false)]
    speak: bool,

    /// Write the live guidance status JSON here
    #[arg(long)]
    status: Option<PathBuf>,

    /// Print the full session report as JSON instead of the event list
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

async fn run<L, O>(
    config: &Config,
    trace: &TraceFile,
    location: L,
    orientation: O,
    announcer: Box<dyn Announcer>,
) -> anyhow::Result<SessionReport>
where
    L: LocationService,
    O: OrientationService,
{
    let session = NavigationSession::new(
        config,
        trace.turn_points.clone(),
        Some(trace.route_data()),
        location,
        orientation,
        announcer,
    )?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    Ok(session.run(shutdown).await)
}

fn print_report(report: &SessionReport) {
    for timed in &report.events {
        let line = match &timed.event {
            GuidanceEvent::Announced { index, text } => format!("turn {:>2}  \"{}\"", index, text),
            GuidanceEvent::OffRoute {
                index,
                distance_m,
                min_distance_m,
            } => format!(
                "turn {:>2}  off route ({:.0} m, closest {:.0} m)",
                index, distance_m, min_distance_m
            ),
            GuidanceEvent::TurnPassed { index } => format!("turn {:>2}  passed", index),
            GuidanceEvent::Completed => "route completed".to_string(),
        };
        println!("[fix {:>4} | {:>7.1}s] {}", timed.fix, timed.elapsed_secs, line);
    }

    let status = &report.status;
    println!();
    println!(
        "fixes: {} received, {} processed, {} ignored | headings: {} ({:?})",
        report.fixes_received,
        report.fixes_processed,
        report.fixes_ignored,
        report.headings_received,
        report.heading_permission
    );
    println!(
        "turns: {}/{} | announcements: {} ({} off route) | phase: {:?}",
        status.next_turn_index.min(status.turn_count),
        status.turn_count,
        status.announcements,
        status.off_route_alerts,
        status.phase
    );
    match status.remaining_distance_m {
        Some(remaining) => println!(
            "remaining: {:.0} m of {:.0} m",
            remaining, status.total_distance_m
        ),
        None => println!("route: {:.0} m", status.total_distance_m),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::load_or_default(&args.config)?.with_env_overrides();
    if let Some(status) = args.status.clone() {
        config.status.path = Some(status);
    }
    let trace = TraceFile::load(&args.trace)?;

    let announcer: Box<dyn Announcer> = if args.speak {
        let synthesizer = CommandSynthesizer::from_config(&config.voice);
        Box::new(AnnouncementChannel::new(Some(Box::new(synthesizer)), &config.voice))
    } else {
        Box::new(RecordingAnnouncer::new())
    };

    let report = if args.live {
        let poll = Duration::from_millis(config.position.poll_interval_ms);
        log::info!("Live guidance with Termux sensors, Ctrl-C to stop");
        run(
            &config,
            &trace,
            TermuxLocationService::new(poll),
            TermuxOrientationService::new(poll),
            announcer,
        )
        .await?
    } else {
        run(
            &config,
            &trace,
            ReplayLocationService::new(trace.position_fixes(), args.speed),
            ReplayOrientationService::new(trace.orientation_readings(), args.speed),
            announcer,
        )
        .await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}
