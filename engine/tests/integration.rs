//! Integration tests for the sync engine
//!
//! These drive the store through its public operations against the
//! in-memory backend, with the change-feed reconciler running, and check
//! how local mutations interleave with remote events.

mod common;

use common::{TestFixtures, TestHelpers};
use pipeline_engine::services::{BackendOperation, InMemoryBackend};
use pipeline_engine::traits::MockPersistence;
use pipeline_engine::*;
use shared::{
    AccountPatch, Entity, EntityId, EntityKind, FeedRecord, NewReportDraft, NewVisit, OpportunityPatch,
    ReportStatus, Stage, Tier, VisitPatch, Wave,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

async fn plain_harness(backend: &InMemoryBackend) -> common::Harness<InMemoryBackend> {
    TestHelpers::harness(Arc::new(backend.clone()), backend).await
}

#[tokio::test]
async fn test_account_to_won_opportunity_end_to_end() {
    // Arrange
    let backend = InMemoryBackend::new();
    let store = &TestHelpers::detached_store(&backend).await;

    // Act: account with scores 5,4,4,3,5
    let account = store
        .create_account(TestFixtures::new_account("Fabrikam"))
        .await
        .unwrap()
        .committed()
        .unwrap();

    // Assert
    assert!(!account.id.is_temporary());
    assert_eq!(account.score_total, 21);
    assert_eq!(account.tier, Tier::A);
    assert_eq!(account.wave, Wave::First);

    let opportunity = store
        .create_opportunity(TestFixtures::new_opportunity(&account.id))
        .await
        .unwrap()
        .committed()
        .unwrap();
    assert_eq!(opportunity.stage, Stage::Selected);

    // A second active opportunity is refused
    match store
        .create_opportunity(TestFixtures::new_opportunity(&account.id))
        .await
        .unwrap()
    {
        Outcome::Rejected(Rejection::ActiveOpportunityExists { existing, .. }) => assert_eq!(existing, opportunity.id),
        other => panic!("expected an active conflict, got {other:?}"),
    }

    // Skipping a stage is refused without touching the store
    let outcome = store
        .move_opportunity_stage(&opportunity.id, Stage::Meeting, StageExtra::default())
        .await
        .unwrap();
    assert_eq!(
        outcome.rejection(),
        Some(&Rejection::InvalidTransition {
            from: Stage::Selected,
            to: Stage::Meeting
        })
    );
    assert_eq!(
        store.get_opportunity(&opportunity.id).await.unwrap().stage,
        Stage::Selected
    );

    for target in [Stage::Contacted, Stage::Meeting, Stage::Proposal, Stage::Negotiation] {
        let moved = store
            .move_opportunity_stage(&opportunity.id, target, StageExtra::default())
            .await
            .unwrap()
            .committed()
            .unwrap();
        assert_eq!(moved.stage, target);
    }
    let won = store
        .move_opportunity_stage(&opportunity.id, Stage::Won, StageExtra::default())
        .await
        .unwrap()
        .committed()
        .unwrap();

    assert_eq!(won.stage, Stage::Won);
    assert_eq!(won.closed_mrr, Some(TestFixtures::ESTIMATED_MRR));
    assert!(won.close_date.is_some());

    // Won is terminal, so a new opportunity may start
    let next = store
        .create_opportunity(TestFixtures::new_opportunity(&account.id))
        .await
        .unwrap();
    assert!(next.is_committed());
    assert_eq!(store.opportunities_for_account(&account.id).await.len(), 2);
}

#[tokio::test]
async fn test_plain_update_cannot_change_stage() {
    let backend = TestHelpers::seeded_backend().await;
    let harness = plain_harness(&backend).await;
    let id = TestHelpers::id(TestFixtures::OPPORTUNITY_1);

    let outcome = harness
        .store
        .update_opportunity(
            &id,
            OpportunityPatch {
                stage: Some(Stage::Won),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Rejected(Rejection::StageChangeRequiresMove));
    assert_eq!(harness.store.get_opportunity(&id).await.unwrap().stage, Stage::Proposal);
}

#[tokio::test]
async fn test_temporary_ids_cannot_be_mutated() {
    let backend = InMemoryBackend::new();
    let harness = plain_harness(&backend).await;
    let temporary = EntityId::temporary();

    let outcome = harness
        .store
        .update_account(
            &temporary,
            AccountPatch {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Rejected(Rejection::PendingCreate { .. })));
}

#[tokio::test]
async fn test_report_status_advances_then_frees_the_visit() {
    // Arrange
    let backend = TestHelpers::seeded_backend().await;
    let store = &TestHelpers::detached_store(&backend).await;
    let visit = store
        .create_visit(NewVisit {
            opportunity_id: TestHelpers::id(TestFixtures::OPPORTUNITY_1),
            account_id: TestHelpers::id(TestFixtures::ACCOUNT_1),
            visited_on: chrono::Utc::now().date_naive(),
            attendees: Vec::new(),
            diagnostics: BTreeMap::new(),
            summary: None,
        })
        .await
        .unwrap()
        .committed()
        .unwrap();
    let input = NewReportDraft {
        account_id: TestHelpers::id(TestFixtures::ACCOUNT_1),
        visit_id: Some(visit.id.clone()),
        title: "Diagnostic".to_string(),
        body: String::new(),
    };
    let report = store
        .create_report_draft(input.clone())
        .await
        .unwrap()
        .committed()
        .unwrap();

    // Act / Assert: one open report per visit
    let duplicate = store.create_report_draft(input.clone()).await.unwrap();
    assert!(matches!(duplicate, Outcome::Rejected(Rejection::OpenReportExists { .. })));

    let review = store.advance_report_status(&report.id).await.unwrap().committed().unwrap();
    assert_eq!(review.status, ReportStatus::Review);
    let sent = store.advance_report_status(&report.id).await.unwrap().committed().unwrap();
    assert_eq!(sent.status, ReportStatus::Sent);
    assert_eq!(store.advance_report_status(&report.id).await.unwrap(), Outcome::Unchanged);

    // Sent reports no longer block the visit
    assert!(store.create_report_draft(input).await.unwrap().is_committed());
}

#[tokio::test]
async fn test_failed_update_restores_the_exact_snapshot() {
    // Arrange
    let backend = TestHelpers::seeded_backend().await;
    let harness = plain_harness(&backend).await;
    let before = harness.store.snapshot().await;
    backend.fail_next(BackendOperation::Update, Some(EntityKind::Account)).await;

    // Act
    let result = harness
        .store
        .update_account(
            &TestHelpers::id(TestFixtures::ACCOUNT_1),
            AccountPatch {
                potential: Some(5),
                sponsor_access: Some(5),
                ..Default::default()
            },
        )
        .await;

    // Assert
    assert_err!(result);
    assert_eq!(harness.store.snapshot().await, before);
}

#[tokio::test]
async fn test_failed_cascade_delete_restores_positions() {
    // Arrange
    let backend = TestHelpers::seeded_backend().await;
    let harness = plain_harness(&backend).await;
    let before = harness.store.snapshot().await;
    backend.fail_next(BackendOperation::Delete, Some(EntityKind::Account)).await;

    // Act
    let result = harness.store.delete_account(&TestHelpers::id(TestFixtures::ACCOUNT_1)).await;

    // Assert
    assert_err!(result);
    assert_eq!(harness.store.snapshot().await, before);
}

#[tokio::test]
async fn test_failed_create_removes_the_optimistic_entry() {
    let backend = InMemoryBackend::new();
    let harness = plain_harness(&backend).await;
    backend.fail_next(BackendOperation::Create, None).await;

    let result = harness.store.create_account(TestFixtures::new_account("Doomed")).await;

    assert_err!(result);
    assert!(harness.store.accounts().await.is_empty());
}

#[tokio::test]
async fn test_account_delete_cascades_before_persistence_answers() {
    // Arrange
    let (persistence, harness) = TestHelpers::gated_harness().await;
    let store = harness.store.clone();
    let account_id = TestHelpers::id(TestFixtures::ACCOUNT_1);
    let gate = persistence.gate(BackendOperation::Delete);

    // Act
    let pending = tokio::spawn({
        let store = store.clone();
        let account_id = account_id.clone();
        async move { store.delete_account(&account_id).await }
    });
    gate.entered().await;

    // Assert: account and every dependent already gone locally
    let snapshot = store.snapshot().await;
    assert!(snapshot.accounts.iter().all(|a| a.id != account_id));
    assert!(snapshot.opportunities.iter().all(|o| o.account_id != account_id));
    assert!(snapshot.visits.iter().all(|v| v.account_id != account_id));
    assert!(snapshot.report_drafts.iter().all(|r| r.account_id != account_id));
    assert_eq!(snapshot.opportunities.len(), 1);

    gate.release();
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Committed(1 + TestFixtures::ACCOUNT_1_DEPENDENTS));
}

#[tokio::test]
async fn test_feed_echo_during_create_yields_one_entry() {
    // Arrange
    let (persistence, harness) = TestHelpers::gated_harness().await;
    let store = harness.store.clone();
    let accounts_before = store.accounts().await.len();
    let gate = persistence.gate(BackendOperation::Create);

    // Act: the backend has stored and published the account, the response is held
    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.create_account(TestFixtures::new_account("Fabrikam")).await }
    });
    gate.entered().await;

    let canonical = persistence.backend().records(EntityKind::Account).await[0].clone();
    let canonical_id = canonical.id().clone();
    {
        let store = &store;
        let id = &canonical_id;
        TestHelpers::wait_until(|| async move { store.get_account(id).await.is_some() }).await;
    }
    // The optimistic entry and the feed copy coexist until the response lands
    assert_eq!(store.accounts().await.len(), accounts_before + 2);

    // Duplicate delivery of the same insert
    persistence
        .backend()
        .publish(FeedRecord::insert(&canonical).unwrap())
        .await;
    let stats = harness.reconciler.stats();
    TestHelpers::wait_until(|| async move { stats.ignored() >= 1 }).await;

    gate.release();
    let committed = pending.await.unwrap().unwrap().committed().unwrap();

    // Assert
    assert_eq!(committed.id, canonical_id);
    let accounts = store.accounts().await;
    assert_eq!(accounts.len(), accounts_before + 1);
    assert_eq!(accounts.iter().filter(|a| a.id == canonical_id).count(), 1);
    assert!(accounts.iter().all(|a| !a.id.is_temporary()));
}

#[tokio::test]
async fn test_remote_delete_during_failed_update_is_not_resurrected() {
    // Arrange
    let (persistence, harness) = TestHelpers::gated_harness().await;
    let store = harness.store.clone();
    let account_id = TestHelpers::id(TestFixtures::ACCOUNT_2);
    persistence
        .backend()
        .fail_next(BackendOperation::Update, Some(EntityKind::Account))
        .await;
    let gate = persistence.gate(BackendOperation::Update);

    // Act
    let pending = tokio::spawn({
        let store = store.clone();
        let account_id = account_id.clone();
        async move {
            store
                .update_account(
                    &account_id,
                    AccountPatch {
                        name: Some("Renamed".to_string()),
                        ..Default::default()
                    },
                )
                .await
        }
    });
    gate.entered().await;
    assert_eq!(store.get_account(&account_id).await.unwrap().name, "Renamed");

    persistence
        .backend()
        .publish(FeedRecord::delete(EntityKind::Account, &account_id))
        .await;
    {
        let store = &store;
        let id = &account_id;
        TestHelpers::wait_until(|| async move { store.get_account(id).await.is_none() }).await;
    }
    gate.release();

    // Assert
    assert_err!(pending.await.unwrap());
    assert!(store.get_account(&account_id).await.is_none());
    assert!(store.opportunities().await.iter().all(|o| o.account_id != account_id));
}

#[tokio::test]
async fn test_remote_delete_during_failed_account_delete_is_not_resurrected() {
    // Arrange
    let (persistence, harness) = TestHelpers::gated_harness().await;
    let store = harness.store.clone();
    let account_id = TestHelpers::id(TestFixtures::ACCOUNT_2);
    persistence
        .backend()
        .fail_next(BackendOperation::Delete, Some(EntityKind::Account))
        .await;
    let gate = persistence.gate(BackendOperation::Delete);
    let ignored_before = harness.reconciler.stats().ignored();

    // Act
    let pending = tokio::spawn({
        let store = store.clone();
        let account_id = account_id.clone();
        async move { store.delete_account(&account_id).await }
    });
    gate.entered().await;
    assert!(store.get_account(&account_id).await.is_none());

    persistence
        .backend()
        .publish(FeedRecord::delete(EntityKind::Account, &account_id))
        .await;
    persistence
        .backend()
        .publish(FeedRecord::delete(EntityKind::Opportunity, &TestHelpers::id("opp-4")))
        .await;
    {
        let stats = harness.reconciler.stats();
        TestHelpers::wait_until(|| async move { stats.ignored() >= ignored_before + 2 }).await;
    }
    gate.release();

    // Assert
    assert_err!(pending.await.unwrap());
    assert!(store.get_account(&account_id).await.is_none());
    assert!(store.get_opportunity(&TestHelpers::id("opp-4")).await.is_none());
    assert!(store.get_visit(&TestHelpers::id("visit-3")).await.is_none());
    assert!(store.opportunities().await.iter().all(|o| o.account_id != account_id));
}

#[tokio::test]
async fn test_failed_cascade_delete_keeps_dependent_deleted_remotely() {
    // Arrange
    let (persistence, harness) = TestHelpers::gated_harness().await;
    let store = harness.store.clone();
    let account_id = TestHelpers::id(TestFixtures::ACCOUNT_2);
    let opportunity_id = TestHelpers::id("opp-4");
    persistence
        .backend()
        .fail_next(BackendOperation::Delete, Some(EntityKind::Account))
        .await;
    let gate = persistence.gate(BackendOperation::Delete);
    let ignored_before = harness.reconciler.stats().ignored();
    let mut changes = store.subscribe_changes();

    // Act
    let pending = tokio::spawn({
        let store = store.clone();
        let account_id = account_id.clone();
        async move { store.delete_account(&account_id).await }
    });
    gate.entered().await;
    persistence
        .backend()
        .publish(FeedRecord::delete(EntityKind::Opportunity, &opportunity_id))
        .await;
    {
        let stats = harness.reconciler.stats();
        TestHelpers::wait_until(|| async move { stats.ignored() > ignored_before }).await;
    }
    gate.release();

    // Assert
    assert_err!(pending.await.unwrap());
    assert!(store.get_account(&account_id).await.is_some());
    assert!(store.get_visit(&TestHelpers::id("visit-3")).await.is_some());
    assert!(store.get_opportunity(&opportunity_id).await.is_none());

    let mut upserted = Vec::new();
    while let Ok(change) = changes.try_recv() {
        if let StoreChange::Upserted { id, .. } = change {
            upserted.push(id);
        }
    }
    assert!(upserted.contains(&account_id));
    assert!(!upserted.contains(&opportunity_id));
}

#[tokio::test]
async fn test_remote_account_delete_is_counted_and_cascaded() {
    // Arrange
    let backend = TestHelpers::seeded_backend().await;
    let harness = plain_harness(&backend).await;
    let account_id = TestHelpers::id(TestFixtures::ACCOUNT_1);
    assert_eq!(backend.subscriber_count().await, 1);

    // Act: another client deletes the account
    assert_ok!(backend.delete(EntityKind::Account, account_id.clone()).await);

    // Assert: the account event cascades, the dependents' own events find nothing
    let stats = harness.reconciler.stats();
    let dependents = TestFixtures::ACCOUNT_1_DEPENDENTS as u64;
    TestHelpers::wait_until(|| async move { stats.ignored() >= dependents }).await;
    assert_eq!(stats.cascaded(), dependents);
    assert_eq!(stats.applied(), 1);
    assert!(harness.store.get_account(&account_id).await.is_none());
    assert_eq!(harness.store.snapshot().await.total(), TestFixtures::pipeline().len() - 1 - TestFixtures::ACCOUNT_1_DEPENDENTS);

    assert!(harness.reconciler.is_running());
    harness.reconciler.stop().await;
    assert_eq!(backend.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_partial_hydration_degrades_one_kind() {
    // Arrange
    let mut persistence = MockPersistence::new();
    persistence.expect_fetch_all().times(4).returning(|kind| match kind {
        EntityKind::Opportunity => Err(SyncError::persistence(kind, "fetch_all", "unavailable")),
        kind => Ok(TestFixtures::pipeline()
            .into_iter()
            .filter(|entity| entity.kind() == kind)
            .collect()),
    });
    let store = EntityStore::new(Arc::new(persistence));
    let loader = HydrationLoader::new(store.clone());
    assert!(!store.is_initialized());

    // Act
    let report = loader.load().await;
    // Loading again reuses the first result
    let again = loader.load().await;

    // Assert
    assert_eq!(report, again);
    assert_eq!(report.degraded, vec![EntityKind::Opportunity]);
    assert!(!report.is_complete());
    assert_eq!(report.loaded(EntityKind::Account), 2);
    assert_eq!(report.loaded(EntityKind::Opportunity), 0);
    assert!(store.is_initialized());
    assert!(store.opportunities().await.is_empty());
    assert_eq!(store.visits().await.len(), 3);
}

#[tokio::test]
async fn test_autosave_writes_latest_draft_only_when_changed() {
    // Arrange
    let backend = TestHelpers::seeded_backend().await;
    let harness = plain_harness(&backend).await;
    let visit_id = TestHelpers::id(TestFixtures::VISIT_1);
    let saver = VisitAutoSaver::start(harness.store.clone(), visit_id.clone(), Duration::from_millis(20));

    // Act
    saver.stage(VisitPatch {
        summary: Some("first pass".to_string()),
        ..Default::default()
    });
    {
        let saver = &saver;
        TestHelpers::wait_until(|| async move { saver.issued() >= 1 }).await;
    }
    saver.stage(VisitPatch {
        summary: Some("second pass".to_string()),
        ..Default::default()
    });
    {
        let backend = &backend;
        let id = &visit_id;
        TestHelpers::wait_until(|| async move {
            backend.records(EntityKind::Visit).await.iter().any(|entity| match entity {
                Entity::Visit(visit) => &visit.id == id && visit.summary.as_deref() == Some("second pass"),
                _ => false,
            })
        })
        .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Assert
    assert_eq!(saver.issued(), 2);
    assert_eq!(
        harness.store.get_visit(&visit_id).await.unwrap().summary.as_deref(),
        Some("second pass")
    );
    saver.stop().await;
}
