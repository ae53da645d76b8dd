//! Test fixtures and data for engine tests
//!
//! A seeded two-account pipeline plus constructors for each entity kind.

use chrono::{NaiveDate, TimeZone, Utc};
use shared::{
    Account, Entity, EntityId, NewAccount, NewOpportunity, Opportunity, ReportDraft, ReportStatus, ScoreDimensions,
    Stage, Tier, Visit, Wave,
};
use std::collections::BTreeMap;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const ACCOUNT_1: &'static str = "acct-1";
    pub const ACCOUNT_2: &'static str = "acct-2";
    pub const OPPORTUNITY_1: &'static str = "opp-1";
    pub const VISIT_1: &'static str = "visit-1";

    pub const ESTIMATED_MRR: f64 = 4200.0;

    /// Scores of the reference account: 21 points, tier A, wave 1
    pub fn reference_scores() -> ScoreDimensions {
        ScoreDimensions::new(5, 4, 4, 3, 5)
    }

    pub fn new_account(name: &str) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            sector: Some("Retail".to_string()),
            scores: Self::reference_scores(),
            ..Default::default()
        }
    }

    pub fn new_opportunity(account_id: &EntityId) -> NewOpportunity {
        NewOpportunity {
            account_id: account_id.clone(),
            title: "Store rollout".to_string(),
            estimated_mrr: Self::ESTIMATED_MRR,
            ..Default::default()
        }
    }

    pub fn account(id: &str) -> Account {
        let at = Utc.with_ymd_and_hms(2026, 1, 12, 8, 30, 0).unwrap();
        Account {
            id: EntityId::new(id),
            name: format!("Account {id}"),
            sector: None,
            city: Some("Lyon".to_string()),
            owner: None,
            notes: None,
            scores: ScoreDimensions::new(3, 3, 2, 2, 2),
            score_total: 12,
            tier: Tier::B,
            wave: Wave::Second,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn opportunity(id: &str, account_id: &str, stage: Stage) -> Opportunity {
        let at = Utc.with_ymd_and_hms(2026, 1, 13, 10, 0, 0).unwrap();
        Opportunity {
            id: EntityId::new(id),
            account_id: EntityId::new(account_id),
            title: format!("Deal {id}"),
            stage,
            estimated_mrr: Self::ESTIMATED_MRR,
            closed_mrr: None,
            loss_reason: None,
            close_date: None,
            next_step: None,
            next_step_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn visit(id: &str, opportunity_id: &str, account_id: &str) -> Visit {
        let at = Utc.with_ymd_and_hms(2026, 1, 20, 14, 0, 0).unwrap();
        Visit {
            id: EntityId::new(id),
            opportunity_id: EntityId::new(opportunity_id),
            account_id: EntityId::new(account_id),
            visited_on: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            attendees: vec!["CFO".to_string()],
            diagnostics: BTreeMap::new(),
            summary: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn report(id: &str, account_id: &str, visit_id: Option<&str>, status: ReportStatus) -> ReportDraft {
        let at = Utc.with_ymd_and_hms(2026, 1, 21, 9, 0, 0).unwrap();
        ReportDraft {
            id: EntityId::new(id),
            account_id: EntityId::new(account_id),
            visit_id: visit_id.map(EntityId::new),
            title: format!("Report {id}"),
            body: String::new(),
            status,
            created_at: at,
            updated_at: at,
        }
    }

    /// Account 1 with three opportunities (one active), two visits and two
    /// reports, plus account 2 with one active opportunity
    pub fn pipeline() -> Vec<Entity> {
        vec![
            Entity::Account(Self::account(Self::ACCOUNT_1)),
            Entity::Account(Self::account(Self::ACCOUNT_2)),
            Entity::Opportunity(Self::opportunity(Self::OPPORTUNITY_1, Self::ACCOUNT_1, Stage::Proposal)),
            Entity::Opportunity(Self::opportunity("opp-2", Self::ACCOUNT_1, Stage::Lost)),
            Entity::Opportunity(Self::opportunity("opp-3", Self::ACCOUNT_1, Stage::Won)),
            Entity::Opportunity(Self::opportunity("opp-4", Self::ACCOUNT_2, Stage::Meeting)),
            Entity::Visit(Self::visit(Self::VISIT_1, Self::OPPORTUNITY_1, Self::ACCOUNT_1)),
            Entity::Visit(Self::visit("visit-2", Self::OPPORTUNITY_1, Self::ACCOUNT_1)),
            Entity::Visit(Self::visit("visit-3", "opp-4", Self::ACCOUNT_2)),
            Entity::ReportDraft(Self::report("report-1", Self::ACCOUNT_1, Some(Self::VISIT_1), ReportStatus::Draft)),
            Entity::ReportDraft(Self::report("report-2", Self::ACCOUNT_1, None, ReportStatus::Sent)),
        ]
    }

    /// Dependents of account 1 in [`TestFixtures::pipeline`]
    pub const ACCOUNT_1_DEPENDENTS: usize = 3 + 2 + 2;
}
