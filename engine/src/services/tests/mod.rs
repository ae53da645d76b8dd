//! Service-specific tests
//!
//! Each service has its own test file; shared fixtures live in `common`.


pub mod common {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use shared::{Account, EntityId, ScoreDimensions, Tier, Wave};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }

    pub fn account(id: &str, scores: ScoreDimensions) -> Account {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        Account {
            id: EntityId::new(id),
            name: format!("Account {id}"),
            sector: Some("Retail".to_string()),
            city: None,
            owner: None,
            notes: None,
            scores,
            score_total: 0,
            tier: Tier::C,
            wave: Wave::Third,
            created_at: at,
            updated_at: at,
        }
    }

    /// Account as the REST service sends it
    pub fn account_payload(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Acme",
            "sector": "Retail",
            "city": null,
            "owner": null,
            "notes": null,
            "potential": 5,
            "maturity": 4,
            "pain_intensity": 4,
            "churn_risk": 3,
            "sponsor_access": 5,
            "score_total": 21,
            "tier": "A",
            "wave": 1,
            "created_at": "2026-02-01T09:00:00Z",
            "updated_at": "2026-02-01T09:00:00Z"
        })
    }
}
