//! Metric emitters; every function compiles to a no-op without the `metrics` feature.

// self
use crate::obs::{FlowKind, FlowOutcome};

/// Increments `venue_api_flow_total{flow,outcome}`.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"venue_api_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many callers were answered by one refresh call, the leader excluded.
pub fn record_refresh_fan_out(waiters: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("venue_api_refresh_waiters").record(waiters as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = waiters;
	}
}

/// Adds the number of cache keys restored by a rolled-back mutation.
pub fn record_rolled_back_keys(mutation: &'static str, keys: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("venue_api_rolled_back_keys_total", "mutation" => mutation)
			.increment(keys as u64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (mutation, keys);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn emitters_accept_calls_without_a_recorder() {
		record_flow_outcome(FlowKind::Mutation, FlowOutcome::RolledBack);
		record_refresh_fan_out(4);
		record_rolled_back_keys("favorite", 2);
	}
}
