//! Scheduling helpers for polling loops.

use rand::Rng;
use std::time::Duration;

/// Returns `period` randomly scaled into `[0.9 * period, 1.1 * period]`.
///
/// Polling loops sleep for a jittered period so that many relayers started at
/// the same moment do not hit the RPC node in lockstep.
pub fn with_jitter(period: Duration) -> Duration {
	if period.is_zero() {
		return period;
	}
	let factor = rand::thread_rng().gen_range(0.9..=1.1);
	period.mul_f64(factor)
}
