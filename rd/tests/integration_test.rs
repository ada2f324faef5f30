//! Integration tests for replydash
//!
//! These drive whole packets through the runner with simulated strategies.

use std::sync::Arc;
use std::time::Duration;

use replydash::dashboard::DashboardConfig;
use replydash::domain::{EventKind, MainReply, Reply};
use replydash::runner::PacketRunner;
use replydash::strategy::{SimRule, SimStrategy, SimStrategyConfig};

fn config(strict_order: bool, soft_ms: u64, hard_ms: u64) -> DashboardConfig {
    DashboardConfig {
        strict_order,
        soft_timeout_ms: soft_ms,
        hard_timeout_ms: hard_ms,
        shutdown_grace_ms: 500,
    }
}

fn runner(config: DashboardConfig, strategies: Vec<SimStrategyConfig>) -> PacketRunner {
    strategies.into_iter().fold(PacketRunner::new(config), |runner, s| {
        let tries = s.max_tries;
        runner.with_strategy(Arc::new(SimStrategy::new(s)), tries)
    })
}

fn identifiers(replies: &[Reply]) -> Vec<&str> {
    replies.iter().map(|r| r.identifier.as_str()).collect()
}

fn source(reply: &Reply) -> &str {
    match &reply.main {
        MainReply::Delivered(d) => &d.strategy,
        MainReply::NoReply { .. } => "",
    }
}

// =============================================================================
// Release
// =============================================================================

#[tokio::test]
async fn test_single_strategy_answers_everything() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![SimStrategyConfig::new("primary").with_default_kind(EventKind::StrongMain)],
    );

    let outcome = runner.run(["a", "b", "c"]).await.expect("run failed");

    assert_eq!(outcome.replies.len(), 3);
    assert!(outcome.replies.iter().all(|r| r.strength() == EventKind::StrongMain));
    assert!(!outcome.runner.hard_timeout);
    assert_eq!(outcome.runner.workers_started, 1);
    assert_eq!(outcome.dashboard.replies_sent, 3);
}

#[tokio::test]
async fn test_strong_answer_beats_weak_cache() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("cache")
                .with_default_kind(EventKind::WeakMain)
                .forecasting_ahead(),
            SimStrategyConfig::new("primary")
                .with_latency(30, 0)
                .with_default_kind(EventKind::StrongMain),
        ],
    );

    let outcome = runner.run(["a", "b"]).await.expect("run failed");

    assert_eq!(outcome.replies.len(), 2);
    for reply in &outcome.replies {
        assert_eq!(reply.strength(), EventKind::StrongMain);
        assert_eq!(source(reply), "primary");
    }
    assert_eq!(outcome.dashboard.main_replacements, 4);
}

fn split_sources() -> Vec<SimStrategyConfig> {
    vec![
        SimStrategyConfig::new("fast")
            .with_rule(SimRule::new("b", Some(EventKind::StrongMain)))
            .forecasting_ahead(),
        SimStrategyConfig::new("slow")
            .with_latency(50, 0)
            .with_rule(SimRule::new("a", Some(EventKind::StrongMain)))
            .with_rule(SimRule::new("c", Some(EventKind::StrongMain)))
            .forecasting_ahead(),
    ]
}

#[tokio::test]
async fn test_strict_order_holds_early_answers() {
    let outcome = runner(config(true, 1_000, 5_000), split_sources())
        .run(["a", "b", "c"])
        .await
        .expect("run failed");

    assert_eq!(identifiers(&outcome.replies), vec!["a", "b", "c"]);
    assert_eq!(source(&outcome.replies[1]), "fast");
    assert!(outcome.replies.iter().all(|r| !r.is_no_reply()));
}

#[tokio::test]
async fn test_unordered_release_follows_completion() {
    let outcome = runner(config(false, 1_000, 5_000), split_sources())
        .run(["a", "b", "c"])
        .await
        .expect("run failed");

    assert_eq!(identifiers(&outcome.replies)[0], "b");
    assert_eq!(outcome.replies.len(), 3);
}

#[tokio::test]
async fn test_supplementary_and_missing_results() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("primary")
                .with_default_kind(EventKind::StrongMain)
                .with_rule(SimRule::new("extra", Some(EventKind::StrongMain)).with_supplementary())
                .with_rule(SimRule::new("gone", None)),
        ],
    );

    let outcome = runner.run(["extra", "gone"]).await.expect("run failed");

    let extra = outcome.replies.iter().find(|r| r.identifier == "extra").unwrap();
    assert_eq!(extra.supplementary.len(), 1);

    let gone = outcome.replies.iter().find(|r| r.identifier == "gone").unwrap();
    assert_eq!(
        gone.main,
        MainReply::NoReply {
            tried: vec!["primary".to_string()]
        }
    );
}

// =============================================================================
// Timeouts and retries
// =============================================================================

#[tokio::test]
async fn test_hard_timeout_answers_with_no_reply() {
    let runner = runner(
        config(false, 50, 200),
        vec![
            SimStrategyConfig::new("stuck")
                .with_latency(60_000, 0)
                .with_default_kind(EventKind::StrongMain),
        ],
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.run(["a", "b"]))
        .await
        .expect("runner did not honor the hard deadline")
        .expect("run failed");

    assert!(outcome.runner.hard_timeout);
    assert_eq!(outcome.replies.len(), 2);
    assert!(outcome.replies.iter().all(|r| r.is_no_reply()));
    assert_eq!(outcome.runner.workers_aborted, 0);
    assert_eq!(outcome.dashboard.hard_timeouts, 1);
}

#[tokio::test]
async fn test_soft_timeout_starts_retry() {
    let runner = runner(
        config(false, 50, 5_000),
        vec![
            SimStrategyConfig::new("slow")
                .with_max_tries(2)
                .with_latency(300, 0)
                .with_default_kind(EventKind::StrongMain),
        ],
    );

    let outcome = runner.run(["a"]).await.expect("run failed");

    assert_eq!(outcome.runner.workers_started, 2);
    assert!(outcome.runner.soft_timeouts >= 1);
    assert!(!outcome.runner.hard_timeout);
    assert_eq!(outcome.replies[0].strength(), EventKind::StrongMain);
}

#[tokio::test]
async fn test_failed_try_is_retried() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("flaky")
                .with_max_tries(2)
                .failing_first(1)
                .with_default_kind(EventKind::StrongMain),
        ],
    );

    let outcome = runner.run(["a", "b"]).await.expect("run failed");

    assert_eq!(outcome.runner.workers_started, 2);
    assert!(outcome.replies.iter().all(|r| r.strength() == EventKind::StrongMain));
    match &outcome.replies[0].main {
        MainReply::Delivered(d) => assert_eq!(d.payload["attempt"], 2),
        MainReply::NoReply { .. } => panic!("expected a delivered reply"),
    }
}

#[tokio::test]
async fn test_exhausted_retries_report_tried_strategies() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("broken")
                .with_max_tries(2)
                .failing_first(5)
                .with_default_kind(EventKind::StrongMain),
        ],
    );

    let outcome = runner.run(["a"]).await.expect("run failed");

    assert_eq!(outcome.runner.workers_started, 2);
    assert_eq!(
        outcome.replies[0].main,
        MainReply::NoReply {
            tried: vec!["broken".to_string()]
        }
    );
    assert!(!outcome.runner.hard_timeout);
}

// =============================================================================
// Rendezvous
// =============================================================================

#[tokio::test]
async fn test_fetcher_waits_for_resolved_alias() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("resolver")
                .with_latency(50, 0)
                .with_rule(SimRule::new("acc-1", None).with_synonyms(["gi-1"]))
                .forecasting_ahead(),
            SimStrategyConfig::new("fetcher")
                .with_rule(SimRule::new("gi-1", Some(EventKind::StrongMain)))
                .awaiting_synonyms(2_000),
        ],
    );

    let outcome = runner.run(["acc-1"]).await.expect("run failed");

    let reply = &outcome.replies[0];
    assert_eq!(reply.strength(), EventKind::StrongMain);
    assert_eq!(source(reply), "fetcher");
    assert_eq!(reply.synonyms, vec!["gi-1".to_string()]);
    assert_eq!(outcome.dashboard.rendezvous_wakeups, 1);
}

#[tokio::test]
async fn test_fetcher_gives_up_without_resolver() {
    let runner = runner(
        config(false, 1_000, 5_000),
        vec![
            SimStrategyConfig::new("fetcher")
                .with_rule(SimRule::new("gi-1", Some(EventKind::StrongMain)))
                .awaiting_synonyms(2_000),
        ],
    );

    let outcome = tokio::time::timeout(Duration::from_secs(1), runner.run(["acc-1"]))
        .await
        .expect("an unsatisfiable wait should return at once")
        .expect("run failed");

    assert!(outcome.replies[0].is_no_reply());
}
