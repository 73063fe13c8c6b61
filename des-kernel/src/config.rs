use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Which executive implementation drives dispatch.
#[derive(Parser, ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutiveKind {
	/// Full dispatch disciplines, pause/resume, causality diagnostics, detachables.
	Full,
	/// Single-threaded, no pause, no detachables, forced zero priority.
	Light,
	/// Light dispatch that additionally rolls back the state machine on abort.
	LightWithRollback,
}

impl Default for ExecutiveKind {
	fn default() -> Self {
		Self::Full
	}
}

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct KernelConfig {
	#[arg(
		long,
		env = "DES_IGNORE_CAUSALITY_VIOLATIONS",
		default_value = "false",
		help = "Clamp out-of-order enqueues to the current time instead of erroring"
	)]
	pub ignore_causality_violations: bool,

	#[arg(long, env = "DES_EXECUTIVE_KIND", value_enum, default_value_t = ExecutiveKind::Full, help = "Dispatch discipline the executive uses")]
	pub executive_kind: ExecutiveKind,

	#[arg(long, env = "DES_MIN_WORKER_THREADS", default_value = "1", help = "Minimum tokio worker threads reserved for asynchronous events")]
	pub min_worker_threads: usize,

	#[arg(long, env = "DES_MAX_WORKER_THREADS", default_value = "4", help = "Maximum tokio worker threads for asynchronous events")]
	pub max_worker_threads: usize,

	#[arg(
		long,
		env = "DES_FRAME_RATE",
		default_value = "0",
		value_parser = parse_frame_rate,
		help = "Render ticks per wall-clock second, 0 disables rendering, max 25"
	)]
	pub frame_rate: u8,

	#[arg(long, env = "DES_SCALE", default_value = "0.0", help = "log10 of the simulated-time-to-wall-time ratio; 0.0 means unthrottled")]
	pub scale: f64,
}

impl KernelConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}

	#[must_use]
	pub fn frame_period(&self) -> Option<std::time::Duration> {
		if self.frame_rate == 0 {
			None
		} else {
			Some(std::time::Duration::from_secs_f64(1.0 / f64::from(self.frame_rate)))
		}
	}

	#[cfg(test)]
	#[must_use]
	pub fn test() -> Self {
		Self {
			ignore_causality_violations: false,
			executive_kind: ExecutiveKind::Full,
			min_worker_threads: 1,
			max_worker_threads: 2,
			frame_rate: 0,
			scale: 0.0,
		}
	}
}

impl Default for KernelConfig {
	fn default() -> Self {
		Self {
			ignore_causality_violations: false,
			executive_kind: ExecutiveKind::Full,
			min_worker_threads: 1,
			max_worker_threads: 4,
			frame_rate: 0,
			scale: 0.0,
		}
	}
}

fn parse_frame_rate(s: &str) -> Result<u8, String> {
	let value: u8 = s.parse().map_err(|_| format!("not a valid frame rate: {s}"))?;
	if value > 25 {
		return Err(format!("frame_rate must be in 0..=25, got {value}"));
	}
	Ok(value)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_unthrottled() {
		let config = KernelConfig::default();
		assert_eq!(config.executive_kind, ExecutiveKind::Full);
		assert_eq!(config.frame_rate, 0);
		assert!(config.frame_period().is_none());
	}

	#[test]
	fn frame_rate_rejects_out_of_range() {
		assert!(parse_frame_rate("26").is_err());
		assert!(parse_frame_rate("25").is_ok());
	}

	#[test]
	fn config_parser_reads_flags() {
		let args = vec!["program", "--executive-kind", "light", "--frame-rate", "10", "--scale", "2.0"];
		let config = KernelConfig::try_parse_from(args).unwrap();
		assert_eq!(config.executive_kind, ExecutiveKind::Light);
		assert_eq!(config.frame_rate, 10);
		assert!((config.scale - 2.0).abs() < f64::EPSILON);
	}
}
