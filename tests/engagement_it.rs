#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::engine;
use venue_api_core::{
	error::Error,
	scoring::{BadgeTier, EngagementType},
};

const STATS: &str = r#"{
	"stats": { "envie": 5, "grande-envie": 0, "decouvrir": 0, "pas-envie": 0 },
	"totalScore": 5,
	"percentage": 33.3,
	"badge": null,
	"userEngagement": "envie",
	"totalEngagements": 5
}"#;

#[tokio::test]
async fn vote_switch_is_scored_locally_then_replaced_by_the_server() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/events/ev-7/engagement");
			then.status(200).header("content-type", "application/json").body(STATS);
		})
		.await;

	let engage = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/events/ev-7/engage")
				.json_body(serde_json::json!({ "type": "grande-envie" }));
			then.status(200).header("content-type", "application/json").body(
				r#"{"stats":{"envie":4,"grande-envie":5,"decouvrir":0,"pas-envie":0},"userEngagement":"grande-envie"}"#,
			);
		})
		.await;
	let engine = engine(&server).await;
	let fetched = engine.fetch_engagement("ev-7").await.expect("Stats should load.");

	assert_eq!(fetched.score(), 5);
	assert_eq!(fetched.badge(), None);

	let state = engine
		.engage_event("ev-7", EngagementType::GrandeEnvie)
		.await
		.expect("Vote should succeed.");

	assert_eq!(state.score(), 19);
	assert_eq!(state.badge(), Some(BadgeTier::Gold));
	assert_eq!(state.user_engagement(), Some(EngagementType::GrandeEnvie));
	assert_eq!(engine.cached_engagement("ev-7"), Some(state));

	engage.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_vote_rolls_back_to_the_fetched_stats() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/events/ev-7/engagement");
			then.status(200).header("content-type", "application/json").body(STATS);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/events/ev-7/engage");
			then.status(400).body(r#"{"message":"Event is over."}"#);
		})
		.await;

	let engine = engine(&server).await;
	let fetched = engine.fetch_engagement("ev-7").await.expect("Stats should load.");
	let err = engine
		.engage_event("ev-7", EngagementType::PasEnvie)
		.await
		.expect_err("Vote should be rejected.");

	assert!(
		matches!(err, Error::Validation { status: 400, ref message } if message == "Event is over."),
		"Unexpected error: {err:?}."
	);
	assert_eq!(engine.cached_engagement("ev-7"), Some(fetched));
}
