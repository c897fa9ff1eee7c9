// Driver scenarios against in-memory stores

use cadence_shared::ProspectStatus;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::config::EngineConfig;
use crate::tests::fixtures::{branching_workflow, linear_workflow, prospect, ProspectFixture};
use crate::tests::helpers::{TestHarness, CAMPAIGN_ID};
use crate::workflows::state::STALE_LEASE_ERROR;
use crate::workflows::{Clock, WorkflowError};

#[tokio::test]
async fn test_end_to_end_linear_workflow() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(prospect()).await;
    let start = h.clock.now();

    // start -> intro
    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("intro"));
    assert_eq!(state.status, ProspectStatus::Ready);

    // intro sends, then waits on the delay node
    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("wait"));
    assert_eq!(state.status, ProspectStatus::Waiting);
    assert_eq!(state.scheduled_for, start + Duration::days(1));
    assert_eq!(h.email.sent().len(), 1);

    // nothing due until a day passes
    assert_eq!(h.process().await, 0);
    h.clock.advance(Duration::hours(23));
    assert_eq!(h.process().await, 0);
    h.clock.advance(Duration::hours(1));

    // wait -> follow-up
    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("follow-up"));
    assert_eq!(state.status, ProspectStatus::Ready);

    // follow-up call runs and the workflow ends
    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.status, ProspectStatus::Completed);
    assert_eq!(state.current_node_id, None);
    assert!(state.completed_at.is_some());

    assert_eq!(h.process().await, 0);
    assert_eq!(h.email.sent().len(), 1);
    let handled = h.actions.handled();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].node_id, "follow-up");
}

#[tokio::test]
async fn test_email_is_personalised_for_the_prospect() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let fixture = ProspectFixture::default();
    let expected_subject = format!("Hi {}", fixture.first_name);
    let expected_to = fixture.email.clone().unwrap();
    h.enroll(fixture.into_prospect()).await;

    h.process().await;
    h.process().await;

    let sent = h.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, expected_subject);
    assert_eq!(sent[0].to_email, expected_to);
    assert_eq!(sent[0].from_email.as_deref(), Some("dana@cadence.test"));
}

#[tokio::test]
async fn test_initialization_is_idempotent() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(prospect()).await;

    let first = h.state(&cp);
    let again = h.engine.initialize_prospect_workflow(cp.id, "start").await.unwrap();
    let other_start = h.engine.initialize_prospect_workflow(cp.id, "intro").await.unwrap();

    assert_eq!(again, first);
    assert_eq!(other_start, first);
    assert_eq!(h.states.len(), 1);
    assert_eq!(first.status, ProspectStatus::Ready);
    assert_eq!(first.current_node_id.as_deref(), Some("start"));
}

#[tokio::test]
async fn test_initialization_does_not_reset_progress() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(prospect()).await;
    h.process().await;

    let state = h.engine.initialize_campaign_prospect(cp.id).await.unwrap();
    assert_eq!(state.current_node_id.as_deref(), Some("intro"));
}

#[tokio::test]
async fn test_initialization_requires_start_node() {
    let h = TestHarness::new();
    let cp = h.directory.assign(CAMPAIGN_ID, prospect());

    let err = h.engine.initialize_campaign_prospect(cp.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::MissingStartNode(id) if id == CAMPAIGN_ID));

    let err = h.engine.initialize_campaign_prospect(9999).await.unwrap_err();
    assert!(matches!(err, WorkflowError::CampaignProspectNotFound(9999)));
}

#[tokio::test]
async fn test_campaign_backfill_only_creates_missing_states() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let enrolled = h.enroll(prospect()).await;
    h.process().await;
    let a = h.directory.assign(CAMPAIGN_ID, prospect());
    let b = h.directory.assign(CAMPAIGN_ID, prospect());

    assert_eq!(h.engine.initialize_campaign(CAMPAIGN_ID).await.unwrap(), 2);
    assert_eq!(h.engine.initialize_campaign(CAMPAIGN_ID).await.unwrap(), 0);

    assert_eq!(h.state(&a).current_node_id.as_deref(), Some("start"));
    assert_eq!(h.state(&b).current_node_id.as_deref(), Some("start"));
    assert_eq!(h.state(&enrolled).current_node_id.as_deref(), Some("intro"));

    let err = h.engine.initialize_campaign(555).await.unwrap_err();
    assert!(matches!(err, WorkflowError::CampaignNotFound(555)));
}

#[tokio::test]
async fn test_no_outgoing_edges_completes() {
    let h = TestHarness::new();
    h.graph.add_node(CAMPAIGN_ID, "start", "start", json!({}));
    let cp = h.enroll(prospect()).await;

    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.status, ProspectStatus::Completed);
    assert_eq!(state.current_node_id, None);
}

#[tokio::test]
async fn test_condition_follows_only_the_selected_branch() {
    let h = TestHarness::with_branch("no");
    branching_workflow(&h.graph, CAMPAIGN_ID, json!({"question": "Replied?"}));
    let cp = h.enroll(prospect()).await;

    h.process().await;
    h.process().await;
    assert_eq!(h.state(&cp).current_node_id.as_deref(), Some("no-task"));
}

#[tokio::test]
async fn test_no_branch_never_follows_yes_edge() {
    let h = TestHarness::with_branch("no");
    h.graph.add_node(CAMPAIGN_ID, "start", "start", json!({}));
    h.graph.add_node(CAMPAIGN_ID, "check", "condition", json!({"question": "Replied?"}));
    h.graph.add_node(CAMPAIGN_ID, "yes-task", "task", json!({"title": "Book a demo"}));
    h.graph.add_edge(CAMPAIGN_ID, "e1", "start", "check", None);
    h.graph.add_edge(CAMPAIGN_ID, "e-yes", "check", "yes-task", Some("yes"));
    h.graph.add_edge(CAMPAIGN_ID, "e-default", "check", "yes-task", None);
    let cp = h.enroll(prospect()).await;

    h.process().await;
    h.process().await;

    let state = h.state(&cp);
    assert_eq!(state.status, ProspectStatus::Completed);
    assert!(h.actions.handled().is_empty());
}

#[tokio::test]
async fn test_rule_condition_routes_on_prospect_attributes() {
    let h = TestHarness::with_branch("no");
    branching_workflow(
        &h.graph,
        CAMPAIGN_ID,
        json!({"question": "Is a CTO?", "rule": {"field": "title", "operator": "equals", "value": "cto"}}),
    );
    let mut cto = prospect();
    cto.title = Some("CTO".to_string());
    let cp = h.enroll(cto).await;

    h.process().await;
    h.process().await;
    assert_eq!(h.state(&cp).current_node_id.as_deref(), Some("yes-task"));
}

#[tokio::test]
async fn test_first_edge_by_insertion_order_wins() {
    let h = TestHarness::new();
    h.graph.add_node(CAMPAIGN_ID, "start", "start", json!({}));
    h.graph.add_node(CAMPAIGN_ID, "b", "task", json!({"title": "B"}));
    h.graph.add_node(CAMPAIGN_ID, "a", "task", json!({"title": "A"}));
    h.graph.add_edge(CAMPAIGN_ID, "z-edge", "start", "b", None);
    h.graph.add_edge(CAMPAIGN_ID, "a-edge", "start", "a", Some(""));
    let cp = h.enroll(prospect()).await;

    h.process().await;
    assert_eq!(h.state(&cp).current_node_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_failures_are_isolated_per_prospect() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let ok = h.enroll(prospect()).await;
    let broken = h.enroll(ProspectFixture::without_email().into_prospect()).await;
    let bounced_fixture = ProspectFixture::default();
    h.email.bounce(bounced_fixture.email.as_deref().unwrap());
    let bounced = h.enroll(bounced_fixture.into_prospect()).await;

    assert_eq!(h.process().await, 3);

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.advanced, 1);
    assert_eq!(report.failed, 2);

    assert_eq!(h.state(&ok).current_node_id.as_deref(), Some("wait"));

    for cp in [&broken, &bounced] {
        let state = h.state(cp);
        assert_eq!(state.status, ProspectStatus::Ready);
        assert_eq!(state.current_node_id.as_deref(), Some("intro"));
        assert_eq!(state.failure_count, 1);
        assert!(state.error.is_some());
    }
    assert!(h.state(&broken).error.unwrap().contains("no email address"));

    // retried on the next poll
    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(h.state(&broken).failure_count, 2);
}

#[tokio::test]
async fn test_success_clears_previous_error() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let fixture = ProspectFixture::default();
    let address = fixture.email.clone().unwrap();
    h.email.bounce(&address);
    let cp = h.enroll(fixture.into_prospect()).await;

    h.process().await;
    h.process().await;
    assert!(h.state(&cp).error.is_some());

    h.email.unbounce(&address);
    h.process().await;

    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("wait"));
    assert_eq!(state.error, None);
    assert_eq!(state.failure_count, 0);
}

#[tokio::test]
async fn test_retry_backoff_when_enabled() {
    let h = TestHarness::with_config(EngineConfig {
        retry_backoff_seconds: 60,
        retry_backoff_max_seconds: 90,
        ..EngineConfig::default()
    });
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(ProspectFixture::without_email().into_prospect()).await;
    h.process().await;
    let failed_at = h.clock.now();

    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.status, ProspectStatus::Waiting);
    assert_eq!(state.scheduled_for, failed_at + Duration::seconds(60));

    assert_eq!(h.process().await, 0);
    h.clock.advance(Duration::seconds(60));
    assert_eq!(h.process().await, 1);

    // second failure doubles, capped at the maximum
    let state = h.state(&cp);
    assert_eq!(state.failure_count, 2);
    assert_eq!(state.scheduled_for, h.clock.now() + Duration::seconds(90));
}

#[tokio::test]
async fn test_oversized_retry_backoff_parks_at_latest_instant() {
    let h = TestHarness::with_config(EngineConfig {
        retry_backoff_seconds: i64::MAX,
        retry_backoff_max_seconds: i64::MAX,
        ..EngineConfig::default()
    });
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(ProspectFixture::without_email().into_prospect()).await;
    h.process().await;

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors, 0);

    let state = h.state(&cp);
    assert_eq!(state.status, ProspectStatus::Waiting);
    assert_eq!(state.scheduled_for, DateTime::<Utc>::MAX_UTC);
    assert_eq!(h.engine.retry_at(5, h.clock.now()), Some(DateTime::<Utc>::MAX_UTC));
}

#[tokio::test]
async fn test_missing_prospect_leaves_row_untouched() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(prospect()).await;
    let before = h.state(&cp);
    h.directory.remove_prospect(cp.prospect_id);

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.state(&cp), before);
}

#[tokio::test]
async fn test_missing_current_node_leaves_row_untouched() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.enroll(prospect()).await;
    h.process().await;
    h.graph.remove_node(CAMPAIGN_ID, "intro");
    let before = h.state(&cp);

    assert_eq!(h.process().await, 0);
    assert_eq!(h.state(&cp), before);
}

#[tokio::test]
async fn test_edge_to_missing_node_advances_with_error() {
    let h = TestHarness::new();
    h.graph.add_node(CAMPAIGN_ID, "start", "start", json!({}));
    h.graph.add_edge(CAMPAIGN_ID, "e1", "start", "ghost", None);
    let cp = h.enroll(prospect()).await;

    assert_eq!(h.process().await, 1);
    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("ghost"));
    assert_eq!(state.status, ProspectStatus::Ready);
    assert!(state.error.unwrap().contains("ghost"));

    // graph edits are picked up on the next poll
    h.graph.add_node(CAMPAIGN_ID, "ghost", "task", json!({"title": "Late addition"}));
    assert_eq!(h.process().await, 1);
    assert_eq!(h.state(&cp).status, ProspectStatus::Completed);
}

#[tokio::test]
async fn test_finished_cursor_is_completed() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.directory.assign(CAMPAIGN_ID, prospect());
    h.states
        .insert(cp.id, None, ProspectStatus::Ready, h.clock.now());

    assert_eq!(h.process().await, 1);
    assert_eq!(h.state(&cp).status, ProspectStatus::Completed);
}

#[tokio::test]
async fn test_stale_lease_is_reclaimed() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let stale = h.directory.assign(CAMPAIGN_ID, prospect());
    let fresh = h.directory.assign(CAMPAIGN_ID, prospect());
    let now = h.clock.now();
    h.states
        .insert(stale.id, Some("intro"), ProspectStatus::Executing, now - Duration::minutes(20));
    h.states
        .insert(fresh.id, Some("intro"), ProspectStatus::Executing, now - Duration::minutes(5));

    assert_eq!(h.engine.reclaim_stale_executions().await.unwrap(), 1);

    let state = h.state(&stale);
    assert_eq!(state.status, ProspectStatus::Ready);
    assert_eq!(state.error.as_deref(), Some(STALE_LEASE_ERROR));
    assert_eq!(h.state(&fresh).status, ProspectStatus::Executing);
}

#[tokio::test]
async fn test_poll_reclaims_before_selecting() {
    let h = TestHarness::new();
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.directory.assign(CAMPAIGN_ID, prospect());
    let now = h.clock.now();
    h.states
        .insert(cp.id, Some("intro"), ProspectStatus::Executing, now - Duration::hours(1));

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.processed, 1);

    let state = h.state(&cp);
    assert_eq!(state.current_node_id.as_deref(), Some("wait"));
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn test_reclaim_disabled_with_zero_ttl() {
    let h = TestHarness::with_config(EngineConfig {
        stale_after_minutes: 0,
        ..EngineConfig::default()
    });
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.directory.assign(CAMPAIGN_ID, prospect());
    let now = h.clock.now();
    h.states
        .insert(cp.id, Some("intro"), ProspectStatus::Executing, now - Duration::days(1));

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(h.state(&cp).status, ProspectStatus::Executing);
}

#[tokio::test]
async fn test_oversized_stale_ttl_reclaims_nothing() {
    let h = TestHarness::with_config(EngineConfig {
        stale_after_minutes: i64::MAX,
        ..EngineConfig::default()
    });
    linear_workflow(&h.graph, CAMPAIGN_ID);
    let cp = h.directory.assign(CAMPAIGN_ID, prospect());
    let now = h.clock.now();
    h.states
        .insert(cp.id, Some("intro"), ProspectStatus::Executing, now - Duration::days(365));

    let report = h.engine.poll().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(h.engine.reclaim_stale_executions().await.unwrap(), 0);
    assert_eq!(h.state(&cp).status, ProspectStatus::Executing);
}

#[tokio::test]
async fn test_batch_size_limits_one_poll() {
    let h = TestHarness::with_config(EngineConfig {
        batch_size: 2,
        ..EngineConfig::default()
    });
    linear_workflow(&h.graph, CAMPAIGN_ID);
    for _ in 0..3 {
        h.enroll(prospect()).await;
    }

    assert_eq!(h.process().await, 2);
    // the limit applies to every poll
    assert_eq!(h.process().await, 2);
}
