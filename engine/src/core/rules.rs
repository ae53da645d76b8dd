//! Business rules: scoring, tiering and the pipeline stage machine
//!
//! Pure functions with no state and no failure modes beyond the returned
//! value. Every channel that writes an account into the store goes through
//! [`normalize_account`] so the derived triple always matches the dimensions.

use shared::{Account, ReportStatus, ScoreDimensions, Stage, Tier, Wave, MAX_DIMENSION_SCORE};

/// The linear pipeline; `Lost` sits outside it and is reachable from any active stage
pub const PIPELINE: [Stage; 6] = [
    Stage::Selected,
    Stage::Contacted,
    Stage::Meeting,
    Stage::Proposal,
    Stage::Negotiation,
    Stage::Won,
];

const TIER_A_THRESHOLD: u8 = 20;
const TIER_B_THRESHOLD: u8 = 12;

/// Derived scoring fields, always computed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub score_total: u8,
    pub tier: Tier,
    pub wave: Wave,
}

/// Sum of the five dimensions, 0-25 for valid input
pub fn score_total(dimensions: &ScoreDimensions) -> u8 {
    dimensions
        .named()
        .iter()
        .fold(0u8, |total, (_, value)| total.saturating_add(*value))
}

pub fn tier(score_total: u8) -> Tier {
    if score_total >= TIER_A_THRESHOLD {
        Tier::A
    } else if score_total >= TIER_B_THRESHOLD {
        Tier::B
    } else {
        Tier::C
    }
}

pub fn wave(tier: Tier) -> Wave {
    match tier {
        Tier::A => Wave::First,
        Tier::B => Wave::Second,
        Tier::C => Wave::Third,
    }
}

pub fn derive(dimensions: &ScoreDimensions) -> Derived {
    let total = score_total(dimensions);
    let tier = tier(total);
    Derived {
        score_total: total,
        tier,
        wave: wave(tier),
    }
}

/// First dimension above the allowed maximum, if any
pub fn validate_dimensions(dimensions: &ScoreDimensions) -> Result<(), (&'static str, u8)> {
    match dimensions
        .named()
        .into_iter()
        .find(|(_, value)| *value > MAX_DIMENSION_SCORE)
    {
        Some(offender) => Err(offender),
        None => Ok(()),
    }
}

/// Recompute the derived triple from the dimensions; returns whether anything changed
pub fn normalize_account(account: &mut Account) -> bool {
    let derived = derive(&account.scores);
    let stale = account.score_total != derived.score_total || account.tier != derived.tier || account.wave != derived.wave;
    account.score_total = derived.score_total;
    account.tier = derived.tier;
    account.wave = derived.wave;
    stale
}

pub fn is_active(stage: Stage) -> bool {
    !matches!(stage, Stage::Won | Stage::Lost)
}

fn position(stage: Stage) -> Option<usize> {
    PIPELINE.iter().position(|s| *s == stage)
}

/// `to` is the immediate successor of `from`, or `to` is `Lost` and `from` is active
pub fn can_advance(from: Stage, to: Stage) -> bool {
    if to == Stage::Lost {
        return is_active(from);
    }
    match (position(from), position(to)) {
        (Some(f), Some(t)) => is_active(from) && t == f + 1,
        _ => false,
    }
}

/// Immediate predecessor of `from`, `None` for the first stage and terminal stages
pub fn can_regress(from: Stage) -> Option<Stage> {
    if !is_active(from) {
        return None;
    }
    match position(from) {
        Some(index) if index > 0 => Some(PIPELINE[index - 1]),
        _ => None,
    }
}

/// Single-step advance, single-step regress, or any active stage to `Lost`
pub fn is_legal_move(from: Stage, to: Stage) -> bool {
    can_advance(from, to) || can_regress(from) == Some(to)
}

/// Next report status, `None` once sent
pub fn next_report_status(status: ReportStatus) -> Option<ReportStatus> {
    match status {
        ReportStatus::Draft => Some(ReportStatus::Review),
        ReportStatus::Review => Some(ReportStatus::Sent),
        ReportStatus::Sent => None,
    }
}
