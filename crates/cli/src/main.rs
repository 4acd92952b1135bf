use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use camctl::discovery::{self, DiscoveryConfig};
use camctl::{
    CameraEndpoint, CameraEvent, CameraSession, ExposureSetting, IntervalEvent, IntervalPlan,
    Intervalometer, LiveFrame, SessionConfig,
};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "camctl", about = "Remote control for JSON-RPC cameras")]
struct Args {
    /// Action list URL (e.g. http://192.168.122.1:8080/sony); skips discovery
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Discovery wait in seconds
    #[arg(long, global = true, default_value_t = 8)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find a camera and print its description
    Discover,
    /// Print shoot mode and exposure settings
    Info,
    /// Run the intervalometer until done or Ctrl-C
    Shoot {
        /// Interval slider position (0 = burst)
        #[arg(long, default_value_t = 4)]
        interval_slider: u32,
        /// Shot count slider position (87+ = unbounded)
        #[arg(long, default_value_t = 9)]
        shots_slider: u32,
        /// Exposure per shot when the shutter is BULB
        #[arg(long, default_value_t = 0)]
        bulb_ms: i64,
        /// Continuous sub-mode for bursts
        #[arg(long)]
        cont_mode: Option<String>,
    },
    /// Print focus status changes
    Focus {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Stream live view and count frames
    Liveview {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// List the newest stills on the card
    List {
        #[arg(long, default_value_t = 20)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("camctl: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> camctl::Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);

    if let Command::Discover = args.command {
        let config = DiscoveryConfig {
            timeout,
            ..DiscoveryConfig::default()
        };
        let camera = discovery::discover_with(&config).await?;
        println!("responder:   {}", camera.responder);
        println!("location:    {}", camera.location);
        println!(
            "model:       {}",
            camera.description.model_name.as_deref().unwrap_or("-")
        );
        println!(
            "name:        {}",
            camera.description.friendly_name.as_deref().unwrap_or("-")
        );
        for service in &camera.description.services {
            println!(
                "service:     {:<12} {}",
                service.service_type, service.action_list_url
            );
        }
        let endpoint = camera.endpoint()?;
        println!("control:     {}", endpoint.control_url());
        println!("content:     {}", endpoint.content_url());
        return Ok(());
    }

    let action_list_url = match args.endpoint {
        Some(url) => url,
        None => discovery::discover(timeout).await?,
    };
    let endpoint = CameraEndpoint::from_action_list_url(&action_list_url)?;
    let session = CameraSession::connect(endpoint, SessionConfig::default()).await?;

    let outcome = match args.command {
        Command::Discover => Ok(()),
        Command::Info => info(&session).await,
        Command::Shoot {
            interval_slider,
            shots_slider,
            bulb_ms,
            cont_mode,
        } => {
            let mut plan =
                IntervalPlan::from_sliders(interval_slider, shots_slider).with_bulb_duration(bulb_ms);
            if let Some(mode) = cont_mode {
                plan = plan.with_cont_shooting_mode(&mode);
            }
            shoot(session.clone(), plan).await
        }
        Command::Focus { seconds } => focus(&session, Duration::from_secs(seconds)).await,
        Command::Liveview { seconds } => liveview(&session, Duration::from_secs(seconds)).await,
        Command::List { count } => list(&session, count).await,
    };

    session.disconnect();
    outcome
}

async fn info(session: &CameraSession) -> camctl::Result<()> {
    let state = session.shooting_state();
    println!(
        "shoot mode:  {}",
        state.shoot_mode.map(|m| m.as_str()).unwrap_or("-")
    );
    println!("recordable:  {}", session.recordable_images().await?);
    for setting in ExposureSetting::ALL {
        let available = session.available(setting);
        println!(
            "{:<22} {:<8} [{}]",
            setting.name(),
            session.current(setting).unwrap_or_else(|| "-".to_string()),
            available.join(", ")
        );
    }
    Ok(())
}

async fn shoot(session: Arc<CameraSession>, plan: IntervalPlan) -> camctl::Result<()> {
    let (intervalometer, mut events) = Intervalometer::new(session);
    println!(
        "interval {} ms, shots {}",
        plan.interval_ms,
        plan.total_shots
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );
    intervalometer.start(plan);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(IntervalEvent::Finished { images }) => {
                    println!("finished, {} images", images.len());
                    for url in images {
                        println!("  {url}");
                    }
                    return Ok(());
                }
                Some(IntervalEvent::Progress { shots_taken, total }) => match total {
                    Some(total) => println!("shot {shots_taken}/{total}"),
                    None => println!("shot {shots_taken}"),
                },
                Some(IntervalEvent::Countdown { remaining }) => {
                    println!("  exposing, {}s left", remaining.as_secs())
                }
                Some(IntervalEvent::Status(s)) => println!("{s}"),
                Some(IntervalEvent::Warning(w)) => println!("warning: {w}"),
                Some(IntervalEvent::Error(e)) => eprintln!("error: {e}"),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("stopping...");
                intervalometer.stop().await;
            }
        }
    }
}

async fn focus(session: &CameraSession, duration: Duration) -> camctl::Result<()> {
    let mut events = session.subscribe_events();
    session.start_focus_poll();
    session.start_auto_focus().await?;

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CameraEvent::Focus(status)) => println!("focus: {status}"),
                Ok(CameraEvent::Battery(level)) => {
                    if let Some(percent) = level.percent() {
                        println!("battery: {percent}%");
                    }
                }
                Ok(CameraEvent::RecordableImages(n)) => println!("recordable: {n}"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
        }
    }

    session.stop_auto_focus().await?;
    session.stop_focus_poll();
    Ok(())
}

async fn liveview(session: &CameraSession, duration: Duration) -> camctl::Result<()> {
    let frames = Arc::new(AtomicU64::new(0));
    let counter = frames.clone();
    let url = session
        .start_live_view(Arc::new(move |frame: LiveFrame| {
            if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                println!("first frame {}x{}", frame.width, frame.height);
            }
        }))
        .await?;
    println!("streaming {url}");

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    session.stop_live_view().await;

    let count = frames.load(Ordering::Relaxed);
    println!(
        "{count} frames in {:.1}s ({:.1} fps)",
        duration.as_secs_f64(),
        count as f64 / duration.as_secs_f64().max(0.001)
    );
    Ok(())
}

async fn list(session: &CameraSession, count: u32) -> camctl::Result<()> {
    session.enter_contents_transfer().await?;
    session
        .wait_for_idle(session.config().idle_timeout)
        .await?;

    let listed = session.recent_stills(count).await;
    if let Err(e) = session.enter_remote_shooting().await {
        eprintln!("could not return to remote shooting: {e}");
    }

    for item in listed? {
        println!(
            "{:<16} {:>14} {}",
            item.file_name.as_deref().unwrap_or("-"),
            item.created_at_ms,
            item.original_url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
