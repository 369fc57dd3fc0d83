//! Optional observability helpers for session and mutation flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `venue_api.flow` with the `flow` and `stage`
//!   (call site) fields. The `outcome` field is filled in when the flow settles. Recoverable
//!   anomalies become warn-level events.
//! - Enable `metrics` to increment the `venue_api_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`. Refreshes also record the
//!   `venue_api_refresh_waiters` histogram and rollbacks add to
//!   `venue_api_rolled_back_keys_total{mutation}`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Session refresh against the identity endpoints.
	Refresh,
	/// Authenticated API request through the interceptor.
	Request,
	/// Optimistic cache mutation.
	Mutation,
	/// Login, register, logout, and vault lifecycle.
	Session,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Request => "request",
			FlowKind::Mutation => "mutation",
			FlowKind::Session => "session",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Optimistic state restored after a failure.
	RolledBack,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::RolledBack => "rolled_back",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
