//! Automated burst and fixed-interval shooting.
//!
//! ```text
//! Idle ──start──> Running(Burst | Interval) ──done/stop──> Stopping ──> Idle
//! ```
//!
//! A run is one tokio task. Progress and results go out as
//! [`IntervalEvent`]s on the channel returned by [`Intervalometer::new`];
//! every run ends with exactly one [`IntervalEvent::Finished`] carrying all
//! image URLs in the order the shots were taken.
//!
//! ## Interval runs
//!
//! Each shot is timed from its start. BULB shots open the shutter for the
//! plan's bulb duration; exposures longer than a second run a countdown
//! next to the capture. If a shot overruns the interval the next one
//! starts at once and a warning is sent.
//!
//! ## Burst runs
//!
//! The camera's continuous mode does the shooting. Progress is the drop in
//! recordable-image count seen through long-polled `getEvent`. Afterwards
//! the run switches to contents transfer to collect the new files, then
//! restores remote shooting with single-shot still mode.

pub mod plan;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{CameraError, Result};
use crate::session::events;
use crate::session::{CameraSession, ExposureSetting, ShootMode, parse_shutter_speed_ms};
pub use plan::{
    BurstCounter, BurstProgress, IntervalPlan, interval_from_slider, shots_from_slider,
};

/// Exposures longer than this get a countdown.
pub const LONG_EXPOSURE_MS: u64 = 1_000;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Continuous sub-mode restored after a burst.
const SINGLE_SHOT_MODE: &str = "Single";

/// Everything a run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalEvent {
    Status(String),
    Progress {
        shots_taken: u32,
        total: Option<u32>,
    },
    /// Exposure time left on the shot in progress.
    Countdown {
        remaining: Duration,
    },
    /// Something went wrong but the run goes on.
    Warning(String),
    /// The run is ending because of this.
    Error(String),
    Finished {
        images: Vec<String>,
    },
}

struct ActiveRun {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs [`IntervalPlan`]s against one session, one at a time.
pub struct Intervalometer {
    session: Arc<CameraSession>,
    events: mpsc::UnboundedSender<IntervalEvent>,
    run: Mutex<Option<ActiveRun>>,
}

impl Intervalometer {
    pub fn new(session: Arc<CameraSession>) -> (Self, mpsc::UnboundedReceiver<IntervalEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let intervalometer = Self {
            session,
            events,
            run: Mutex::new(None),
        };
        (intervalometer, rx)
    }

    /// Start a run. A run already in progress is left alone and `false`
    /// returned, with a [`IntervalEvent::Status`] explaining why.
    pub fn start(&self, plan: IntervalPlan) -> bool {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            let _ = self
                .events
                .send(IntervalEvent::Status("a run is already in progress".to_string()));
            return false;
        }

        tracing::info!(
            interval_ms = plan.interval_ms,
            total_shots = ?plan.total_shots,
            "intervalometer run starting"
        );
        let (stop, stop_rx) = watch::channel(false);
        let runner = Runner {
            session: self.session.clone(),
            events: self.events.clone(),
            stop: stop_rx,
            plan,
            images: Vec::new(),
        };
        *run = Some(ActiveRun {
            stop,
            handle: tokio::spawn(runner.run()),
        });
        true
    }

    /// Ask the run to stop and wait until it has wound down, including the
    /// camera calls that restore its state. Returns at once when idle.
    pub async fn stop(&self) {
        let active = self.run.lock().take();
        let Some(active) = active else {
            return;
        };
        let _ = active.stop.send(true);
        if let Err(e) = active.handle.await {
            tracing::warn!(error = %e, "intervalometer task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

struct Runner {
    session: Arc<CameraSession>,
    events: mpsc::UnboundedSender<IntervalEvent>,
    stop: watch::Receiver<bool>,
    plan: IntervalPlan,
    images: Vec<String>,
}

impl Runner {
    async fn run(mut self) {
        let outcome = if self.plan.is_burst() {
            self.run_burst().await
        } else {
            self.run_interval().await
        };

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "intervalometer run failed");
            self.emit(IntervalEvent::Error(e.to_string()));
        }

        let images = std::mem::take(&mut self.images);
        tracing::info!(images = images.len(), "intervalometer run finished");
        self.emit(IntervalEvent::Finished { images });
    }

    fn emit(&self, event: IntervalEvent) {
        let _ = self.events.send(event);
    }

    fn warn(&self, message: String) {
        tracing::warn!("{message}");
        self.emit(IntervalEvent::Warning(message));
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep for `duration` unless a stop comes first. Returns whether
    /// the run should stop.
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            // Err means the controller is gone; treat it as a stop.
            _ = self.stop.changed() => true,
        }
    }

    /// Count down `total` in one-second steps. Returns whether a stop
    /// interrupted it.
    async fn countdown(&mut self, total: Duration) -> bool {
        let mut remaining = total;
        while !remaining.is_zero() {
            self.emit(IntervalEvent::Countdown { remaining });
            let step = remaining.min(COUNTDOWN_STEP);
            if self.sleep_or_stop(step).await {
                return true;
            }
            remaining -= step;
        }
        false
    }

    async fn run_interval(&mut self) -> Result<()> {
        let shutter = self
            .session
            .current_or_refresh(ExposureSetting::ShutterSpeed)
            .await?;
        let shutter_ms = parse_shutter_speed_ms(&shutter);
        if shutter_ms.is_none() && self.plan.bulb_duration_ms <= 0 {
            return Err(CameraError::Validation(format!(
                "BULB shutter needs a positive bulb duration, got {} ms",
                self.plan.bulb_duration_ms
            )));
        }

        let interval = Duration::from_millis(self.plan.interval_ms);
        let total = self.plan.total_shots;
        self.emit(IntervalEvent::Status(format!(
            "interval run: every {interval:?}, shutter {shutter}"
        )));

        let mut shots = 0u32;
        loop {
            if self.stop_requested() || total.is_some_and(|t| shots >= t) {
                break;
            }

            let started = Instant::now();
            let urls = match shutter_ms {
                None => self.bulb_shot().await?,
                Some(ms) if ms > LONG_EXPOSURE_MS => self.timed_shot(ms).await?,
                Some(_) => self.session.capture_still().await?.urls,
            };

            shots += 1;
            if urls.is_empty() {
                self.warn(format!("shot {shots} returned no image"));
            }
            self.images.extend(urls);
            self.emit(IntervalEvent::Progress {
                shots_taken: shots,
                total,
            });

            if total.is_some_and(|t| shots >= t) || self.stop_requested() {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed > interval {
                self.warn(format!(
                    "shot {shots} took {elapsed:?}, longer than the {interval:?} interval"
                ));
                continue;
            }
            if self.sleep_or_stop(interval - elapsed).await {
                break;
            }
        }
        Ok(())
    }

    /// Open the shutter, hold it for the bulb duration, close it. The
    /// shutter is closed even when a stop arrives mid-exposure.
    async fn bulb_shot(&mut self) -> Result<Vec<String>> {
        self.session.start_bulb_exposure().await?;

        let hold = Duration::from_millis(self.plan.bulb_duration_ms.max(0) as u64);
        if self.countdown(hold).await {
            tracing::info!("stop requested during bulb exposure, closing shutter");
        }

        match self.session.stop_bulb_exposure().await {
            Ok(result) => Ok(result.urls),
            Err(e) => {
                self.warn(format!("bulb exposure did not return an image: {e}"));
                Ok(Vec::new())
            }
        }
    }

    /// Capture with a countdown of the known exposure time alongside.
    async fn timed_shot(&mut self, exposure_ms: u64) -> Result<Vec<String>> {
        let session = self.session.clone();
        let (captured, _) = tokio::join!(
            session.capture_still(),
            self.countdown(Duration::from_millis(exposure_ms)),
        );
        Ok(captured?.urls)
    }

    async fn run_burst(&mut self) -> Result<()> {
        let shutter = self
            .session
            .current_or_refresh(ExposureSetting::ShutterSpeed)
            .await?;
        if parse_shutter_speed_ms(&shutter).is_none() {
            return Err(CameraError::Validation(
                "burst shooting is not available with a BULB shutter".to_string(),
            ));
        }

        self.session.set_shoot_mode(ShootMode::Still).await?;
        self.session
            .set_cont_shooting_mode(&self.plan.cont_shooting_mode)
            .await?;
        let baseline = self.session.recordable_images().await?;
        if baseline < 0 {
            return Err(CameraError::Validation(
                "memory card is not ready for a burst".to_string(),
            ));
        }
        let counter = BurstCounter::new(baseline, self.plan.total_shots);

        self.session.start_continuous_shooting().await?;
        self.emit(IntervalEvent::Status(format!(
            "burst started, {baseline} images recordable"
        )));

        let mut taken = 0;
        let counted = self.count_burst(counter, &mut taken).await;
        self.finish_burst(taken).await;
        counted
    }

    async fn count_burst(&mut self, counter: BurstCounter, taken: &mut u32) -> Result<()> {
        let session = self.session.clone();
        let version = session.config().idle_event_version.clone();

        loop {
            if self.stop_requested() {
                return Ok(());
            }
            let result = tokio::select! {
                result = session.get_event(true, &version) => result?,
                _ = self.stop.changed() => return Ok(()),
            };

            let Some(progress) =
                events::recordable_images(&result).and_then(|count| counter.observe(count))
            else {
                continue;
            };
            if progress.shots_taken != *taken {
                *taken = progress.shots_taken;
                self.emit(IntervalEvent::Progress {
                    shots_taken: *taken,
                    total: self.plan.total_shots,
                });
            }
            if progress.done {
                return Ok(());
            }
        }
    }

    /// Stop the camera, collect the burst's files and restore single-shot
    /// remote shooting. Failures here are warnings.
    async fn finish_burst(&mut self, taken: u32) {
        let session = self.session.clone();
        let idle = session.config().shutdown_idle_timeout;

        if let Err(e) = session.stop_continuous_shooting().await {
            self.warn(format!("stopContShooting failed: {e}"));
        }
        if let Err(e) = session.wait_for_idle(idle).await {
            self.warn(format!("camera not idle after burst: {e}"));
        }

        if taken > 0 {
            match self.fetch_recent_images(taken).await {
                Ok(urls) => self.images.extend(urls),
                Err(e) => self.warn(format!("could not collect burst images: {e}")),
            }
        }

        if let Err(e) = session.enter_remote_shooting().await {
            self.warn(format!("could not return to remote shooting: {e}"));
        } else if let Err(e) = session.wait_for_idle(idle).await {
            self.warn(format!("camera not idle after mode switch: {e}"));
        }
        if let Err(e) = session.set_cont_shooting_mode(SINGLE_SHOT_MODE).await {
            self.warn(format!("could not restore single shooting: {e}"));
        }
        if let Err(e) = session.set_shoot_mode(ShootMode::Still).await {
            self.warn(format!("could not restore still mode: {e}"));
        }
    }

    /// The newest `count` stills, oldest first.
    async fn fetch_recent_images(&self, count: u32) -> Result<Vec<String>> {
        let idle = self.session.config().shutdown_idle_timeout;
        self.session.enter_contents_transfer().await?;
        self.session.wait_for_idle(idle).await?;

        let items = self.session.recent_stills(count).await?;
        Ok(items
            .into_iter()
            .rev()
            .filter_map(|item| item.original_url)
            .collect())
    }
}
