//! Engagement scoring for events.
//!
//! Votes are weighted (`envie` 1, `grande-envie` 3, `decouvrir` 2, `pas-envie` −1), summed into
//! a score, and mapped onto a gauge where a score of 15 reads as 100%. The gauge is clamped to
//! `[0, 150]`; badge tiers start at 50%, 75%, 100%, and 150%.
//!
//! Everything here is pure. [`EngagementState`] keeps its derived values private and only
//! builds them from counts, so a state can never disagree with its own counts.

// self
use crate::_prelude::*;

/// Score that maps onto a 100% gauge.
pub const FULL_GAUGE_SCORE: f64 = 15.0;
/// Upper bound of the gauge.
pub const MAX_PERCENTAGE: f64 = 150.0;

/// Kind of vote a user can cast on an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngagementType {
	/// "I want to go."
	Envie,
	/// "I really want to go."
	GrandeEnvie,
	/// "Curious to discover."
	Decouvrir,
	/// "Not interested."
	PasEnvie,
}
impl EngagementType {
	/// Every vote kind, in display order.
	pub const ALL: [EngagementType; 4] = [
		EngagementType::Envie,
		EngagementType::GrandeEnvie,
		EngagementType::Decouvrir,
		EngagementType::PasEnvie,
	];

	/// Score contribution of one vote.
	pub const fn weight(self) -> i64 {
		match self {
			EngagementType::Envie => 1,
			EngagementType::GrandeEnvie => 3,
			EngagementType::Decouvrir => 2,
			EngagementType::PasEnvie => -1,
		}
	}

	/// Wire name of the vote.
	pub const fn as_str(self) -> &'static str {
		match self {
			EngagementType::Envie => "envie",
			EngagementType::GrandeEnvie => "grande-envie",
			EngagementType::Decouvrir => "decouvrir",
			EngagementType::PasEnvie => "pas-envie",
		}
	}
}
impl Display for EngagementType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Vote tallies for one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementCounts {
	/// `envie` votes.
	pub envie: u32,
	/// `grande-envie` votes.
	#[serde(rename = "grande-envie")]
	pub grande_envie: u32,
	/// `decouvrir` votes.
	pub decouvrir: u32,
	/// `pas-envie` votes.
	#[serde(rename = "pas-envie")]
	pub pas_envie: u32,
}
impl EngagementCounts {
	/// Returns the tally for `kind`.
	pub fn count(&self, kind: EngagementType) -> u32 {
		match kind {
			EngagementType::Envie => self.envie,
			EngagementType::GrandeEnvie => self.grande_envie,
			EngagementType::Decouvrir => self.decouvrir,
			EngagementType::PasEnvie => self.pas_envie,
		}
	}

	fn slot(&mut self, kind: EngagementType) -> &mut u32 {
		match kind {
			EngagementType::Envie => &mut self.envie,
			EngagementType::GrandeEnvie => &mut self.grande_envie,
			EngagementType::Decouvrir => &mut self.decouvrir,
			EngagementType::PasEnvie => &mut self.pas_envie,
		}
	}

	/// Adds one vote of `kind`.
	pub fn increment(&mut self, kind: EngagementType) {
		let slot = self.slot(kind);

		*slot = slot.saturating_add(1);
	}

	/// Removes one vote of `kind`, stopping at zero.
	pub fn decrement(&mut self, kind: EngagementType) {
		let slot = self.slot(kind);

		*slot = slot.saturating_sub(1);
	}

	/// Total number of votes.
	pub fn total(&self) -> u64 {
		EngagementType::ALL.iter().map(|kind| u64::from(self.count(*kind))).sum()
	}
}

/// Moves a user's vote from `previous` to `new`.
///
/// Voting the same kind again still counts, matching the server's behaviour.
pub fn apply_vote(
	counts: EngagementCounts,
	previous: Option<EngagementType>,
	new: EngagementType,
) -> EngagementCounts {
	let mut next = counts;

	if let Some(previous) = previous.filter(|previous| *previous != new) {
		next.decrement(previous);
	}

	next.increment(new);

	next
}

/// Weighted sum of the votes.
pub fn score(counts: &EngagementCounts) -> i64 {
	EngagementType::ALL.iter().map(|kind| i64::from(counts.count(*kind)) * kind.weight()).sum()
}

/// Gauge reading for `score`, clamped to `[0, 150]`.
pub fn percentage(score: i64) -> f64 {
	(score as f64 / FULL_GAUGE_SCORE * 100.0).clamp(0.0, MAX_PERCENTAGE)
}

/// Badge earned at `percentage`, if any.
pub fn badge(percentage: f64) -> Option<BadgeTier> {
	BadgeTier::ALL.into_iter().find(|tier| percentage >= tier.threshold())
}

/// Badge tiers, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BadgeTier {
	/// 150% and above.
	Violet,
	/// 100% and above.
	Gold,
	/// 75% and above.
	Silver,
	/// 50% and above.
	Bronze,
}
impl BadgeTier {
	/// Every tier, highest first.
	pub const ALL: [BadgeTier; 4] =
		[BadgeTier::Violet, BadgeTier::Gold, BadgeTier::Silver, BadgeTier::Bronze];

	/// Lowest gauge reading (inclusive) that earns the tier.
	pub const fn threshold(self) -> f64 {
		match self {
			BadgeTier::Violet => 150.0,
			BadgeTier::Gold => 100.0,
			BadgeTier::Silver => 75.0,
			BadgeTier::Bronze => 50.0,
		}
	}

	/// Stable identifier used on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			BadgeTier::Violet => "violet",
			BadgeTier::Gold => "gold",
			BadgeTier::Silver => "silver",
			BadgeTier::Bronze => "bronze",
		}
	}

	/// Display label.
	pub const fn label(self) -> &'static str {
		match self {
			BadgeTier::Violet => "C'EST LE FEU !",
			BadgeTier::Gold => "Coup de Cœur",
			BadgeTier::Silver => "Populaire",
			BadgeTier::Bronze => "Apprécié",
		}
	}

	/// Background colour as a hex string.
	pub const fn color(self) -> &'static str {
		match self {
			BadgeTier::Violet => "#9C27B0",
			BadgeTier::Gold => "#FFD700",
			BadgeTier::Silver => "#C0C0C0",
			BadgeTier::Bronze => "#CD7F32",
		}
	}

	/// Emoji shown next to the label.
	pub const fn emoji(self) -> &'static str {
		match self {
			BadgeTier::Violet => "🔥",
			BadgeTier::Gold => "🏆",
			BadgeTier::Silver => "⭐",
			BadgeTier::Bronze => "👍",
		}
	}
}
impl Serialize for BadgeTier {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		#[derive(Serialize)]
		struct BadgeView {
			r#type: &'static str,
			label: &'static str,
			color: &'static str,
			emoji: &'static str,
		}

		BadgeView {
			r#type: self.as_str(),
			label: self.label(),
			color: self.color(),
			emoji: self.emoji(),
		}
		.serialize(serializer)
	}
}

/// Engagement snapshot for one event as seen by the current user.
///
/// Serializes to the API's shape. Deserializing keeps only the counts and the user's vote
/// and recomputes everything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "EngagementWire")]
pub struct EngagementState {
	#[serde(rename = "stats")]
	counts: EngagementCounts,
	score: i64,
	percentage: f64,
	badge: Option<BadgeTier>,
	user_engagement: Option<EngagementType>,
	total_engagements: u64,
}
impl EngagementState {
	/// Builds a state from raw counts and the user's current vote.
	pub fn from_counts(counts: EngagementCounts, user_engagement: Option<EngagementType>) -> Self {
		let score = score(&counts);
		let percentage = percentage(score);

		Self {
			counts,
			score,
			percentage,
			badge: badge(percentage),
			user_engagement,
			total_engagements: counts.total(),
		}
	}

	/// Returns the state after the user votes `new`.
	pub fn with_vote(&self, new: EngagementType) -> Self {
		Self::from_counts(apply_vote(self.counts, self.user_engagement, new), Some(new))
	}

	/// Vote tallies.
	pub fn counts(&self) -> &EngagementCounts {
		&self.counts
	}

	/// Weighted score.
	pub fn score(&self) -> i64 {
		self.score
	}

	/// Gauge reading in `[0, 150]`.
	pub fn percentage(&self) -> f64 {
		self.percentage
	}

	/// Earned badge, if any.
	pub fn badge(&self) -> Option<BadgeTier> {
		self.badge
	}

	/// The current user's vote, if any.
	pub fn user_engagement(&self) -> Option<EngagementType> {
		self.user_engagement
	}

	/// Total number of votes.
	pub fn total_engagements(&self) -> u64 {
		self.total_engagements
	}
}
impl Default for EngagementState {
	fn default() -> Self {
		Self::from_counts(EngagementCounts::default(), None)
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngagementWire {
	#[serde(default)]
	stats: EngagementCounts,
	#[serde(default)]
	user_engagement: Option<EngagementType>,
}
impl From<EngagementWire> for EngagementState {
	fn from(wire: EngagementWire) -> Self {
		Self::from_counts(wire.stats, wire.user_engagement)
	}
}
