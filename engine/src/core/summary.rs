//! Pipeline summary computed from a store snapshot

use super::rules;
use crate::types::StoreSnapshot;
use serde::Serialize;
use shared::{Stage, Tier, Wave};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub accounts: usize,
    pub opportunities_by_stage: BTreeMap<Stage, usize>,
    pub accounts_by_tier: BTreeMap<Tier, usize>,
    pub accounts_by_wave: BTreeMap<Wave, usize>,
    /// Sum of estimated MRR over active opportunities
    pub active_estimated_mrr: f64,
    /// Sum of closed MRR over won opportunities
    pub won_closed_mrr: f64,
    pub open_reports: usize,
}

impl PipelineSummary {
    pub fn from_snapshot(snapshot: &StoreSnapshot) -> Self {
        let mut summary = PipelineSummary {
            accounts: snapshot.accounts.len(),
            open_reports: snapshot.open_reports().count(),
            ..Default::default()
        };

        for account in &snapshot.accounts {
            *summary.accounts_by_tier.entry(account.tier).or_default() += 1;
            *summary.accounts_by_wave.entry(account.wave).or_default() += 1;
        }

        for opportunity in &snapshot.opportunities {
            *summary.opportunities_by_stage.entry(opportunity.stage).or_default() += 1;
            if rules::is_active(opportunity.stage) {
                summary.active_estimated_mrr += opportunity.estimated_mrr;
            } else if opportunity.stage == Stage::Won {
                summary.won_closed_mrr += opportunity.closed_mrr.unwrap_or(opportunity.estimated_mrr);
            }
        }

        summary
    }

    pub fn stage_count(&self, stage: Stage) -> usize {
        self.opportunities_by_stage.get(&stage).copied().unwrap_or(0)
    }

    /// Won over won-plus-lost, `None` before anything closed
    pub fn win_rate(&self) -> Option<f64> {
        let won = self.stage_count(Stage::Won);
        let closed = won + self.stage_count(Stage::Lost);
        (closed > 0).then(|| won as f64 / closed as f64)
    }
}
