use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::time::Tick;

/// Scales simulated time to wall-clock time and drives a periodic render tick, independent of
/// the executive's own dispatch loop.
///
/// `log10_scale` is `log10(simulated seconds per wall second)`: `0.0` means unthrottled (the
/// default), positive values slow the simulation down to let a human watch it, negative values
/// would speed it past real time (rejected — throttling only ever holds time back).
pub struct ExecController {
	log10_scale: f64,
	frame_period: Option<Duration>,
	wall_baseline: Instant,
	sim_baseline: Tick,
}

impl ExecController {
	#[must_use]
	pub fn new(log10_scale: f64, frame_rate: u8) -> Self {
		assert!((0..=25).contains(&frame_rate), "frame_rate must be in 0..=25");
		Self {
			log10_scale,
			frame_period: (frame_rate > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(frame_rate))),
			wall_baseline: Instant::now(),
			sim_baseline: Tick::zero(),
		}
	}

	/// Resets the wall/sim baseline to "now"; call after a pause so the throttle doesn't try
	/// to make up for time spent paused.
	pub fn reset_baseline(&mut self, sim_now: Tick) {
		self.wall_baseline = Instant::now();
		self.sim_baseline = sim_now;
	}

	/// Computes how long to sleep, if at all, to keep wall-clock progress from outrunning
	/// `log10_scale`'s target ratio, capped at one frame period so a throttled run still
	/// renders smoothly.
	#[must_use]
	pub fn clock_about_to_change(&self, sim_now: Tick) -> Option<Duration> {
		if self.log10_scale <= 0.0 {
			return None;
		}
		let ratio = 10f64.powf(self.log10_scale);
		let elapsed_sim_ticks = sim_now.0.saturating_sub(self.sim_baseline.0);
		#[allow(clippy::cast_precision_loss)]
		let target_wall_secs = elapsed_sim_ticks as f64 / ratio;
		let actual_wall_secs = self.wall_baseline.elapsed().as_secs_f64();
		if target_wall_secs <= actual_wall_secs {
			return None;
		}
		let mut delay = Duration::from_secs_f64(target_wall_secs - actual_wall_secs);
		if let Some(cap) = self.frame_period {
			delay = delay.min(cap);
		}
		Some(delay)
	}

	/// Sleeps for [`Self::clock_about_to_change`]'s delay, if any. The daemon "nap" event the
	/// design calls for in an executive-driven model is just this awaited directly from the
	/// dispatch loop between events.
	pub async fn throttle(&self, sim_now: Tick) {
		if let Some(delay) = self.clock_about_to_change(sim_now) {
			tokio::time::sleep(delay).await;
		}
	}
}

/// Drives a user-supplied render callback at a fixed wall-clock cadence, independent of
/// simulated time. Uses `tokio::time::interval` with `Skip` behavior so a slow render never
/// queues up a backlog of ticks — at most one render is ever "pending".
pub struct RenderLoop {
	handle: Option<tokio::task::JoinHandle<()>>,
	cancel: Arc<Notify>,
}

impl RenderLoop {
	pub fn spawn<F>(frame_period: Duration, mut render: F) -> Self
	where
		F: FnMut() + Send + 'static,
	{
		let cancel = Arc::new(Notify::new());
		let cancel_for_task = cancel.clone();
		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(frame_period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				tokio::select! {
					_ = ticker.tick() => render(),
					() = cancel_for_task.notified() => break,
				}
			}
		});
		Self { handle: Some(handle), cancel }
	}

	pub fn stop(&mut self) {
		self.cancel.notify_waiters();
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}
}

impl Drop for RenderLoop {
	fn drop(&mut self) {
		self.stop();
	}
}
