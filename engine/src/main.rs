//! Host binary for the pipeline sync engine
//!
//! Wires the store to a REST backend and a WebSocket change feed, or with
//! `--demo` to a seeded in-memory backend, then keeps the cache in sync and
//! logs a pipeline summary until interrupted.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use pipeline_engine::{
    services::{InMemoryBackend, RestPersistence, WebSocketChangeFeed},
    ChangeFeed, ChangeFeedReconciler, EntityStore, HydrationLoader, Outcome, Persistence, PipelineSummary,
    StageExtra, SyncConfig, VisitAutoSaver,
};
use shared::{
    logging, sync_info, sync_warn, Account, AxisNotes, Component, DiagnosticAxis, Entity, EntityId, NewAccount,
    NewOpportunity, NewReportDraft, NewVisit, ScoreDimensions, Stage, Tier, VisitPatch, Wave,
};

/// Keeps a local pipeline cache in sync with a remote service
#[derive(Parser)]
#[command(name = "pipeline-engine")]
#[command(about = "Client-side sync engine for a commercial pipeline")]
pub struct Args {
    /// Base URL of the REST persistence service
    #[arg(long, env = "PIPELINE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// WebSocket URL of the change feed
    #[arg(long, env = "PIPELINE_FEED_URL")]
    pub feed_url: Option<String>,

    /// Run against a seeded in-memory backend and play a sample session
    #[arg(long, env = "PIPELINE_DEMO")]
    pub demo: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PIPELINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seconds between pipeline summaries
    #[arg(long, env = "PIPELINE_SUMMARY_INTERVAL_SECS", default_value = "60")]
    pub summary_interval_secs: u64,

    /// Seconds between visit auto-saves
    #[arg(long, env = "PIPELINE_AUTOSAVE_INTERVAL_SECS", default_value = "30")]
    pub autosave_interval_secs: u64,

    /// REST request timeout in milliseconds
    #[arg(long, env = "PIPELINE_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init_tracing_with_level(Some(&args.log_level));

    let config = SyncConfig {
        autosave_interval: Duration::from_secs(args.autosave_interval_secs),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        ..Default::default()
    };
    config.validate().context("invalid configuration")?;
    let summary_interval = Duration::from_secs(args.summary_interval_secs.max(1));

    if args.demo {
        logging::log_startup(Component::Host, "pipeline engine (demo backend)");
        let backend = Arc::new(InMemoryBackend::new().with_feed_buffer(config.feed_buffer));
        backend.seed(demo_accounts()).await;
        run(Arc::clone(&backend), backend.as_ref(), config, summary_interval, true).await
    } else {
        let backend_url = args
            .backend_url
            .context("--backend-url is required unless --demo is set")?;
        let feed_url = args.feed_url.context("--feed-url is required unless --demo is set")?;
        logging::log_startup(Component::Host, &format!("pipeline engine against {backend_url}"));
        let persistence = Arc::new(
            RestPersistence::new(&backend_url, config.request_timeout).context("could not build REST client")?,
        );
        let feed = WebSocketChangeFeed::new(&feed_url, config.feed_buffer).context("invalid feed URL")?;
        run(persistence, &feed, config, summary_interval, false).await
    }
}

async fn run<P, F>(persistence: Arc<P>, feed: &F, config: SyncConfig, summary_interval: Duration, demo: bool) -> Result<()>
where
    P: Persistence + 'static,
    F: ChangeFeed,
{
    let store = EntityStore::with_config(persistence, &config);

    // Subscribed first so changes made during the fetch are not lost. Events
    // applied before the bulk replace are overwritten by an older snapshot.
    let reconciler = ChangeFeedReconciler::start(store.clone(), feed, config.feed_kinds.clone())
        .await
        .context("could not subscribe to the change feed")?;

    let report = HydrationLoader::new(store.clone()).load().await;
    sync_info!(
        Component::Host,
        loaded = ?report.loaded,
        degraded = ?report.degraded,
        "Initial load finished"
    );

    let autosaver = if demo {
        play_demo_session(&store, &config).await.unwrap_or_else(|e| {
            logging::log_error(Component::Host, "Demo session", &e);
            None
        })
    } else {
        None
    };

    let mut ticker = tokio::time::interval(summary_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                log_summary(&PipelineSummary::from_snapshot(&store.snapshot().await));
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => logging::log_shutdown(Component::Host, "Received Ctrl+C signal"),
                    Err(err) => logging::log_error(Component::Host, "Signal handling", &err),
                }
                break;
            }
        }
    }

    sync_info!(
        Component::Host,
        applied = reconciler.stats().applied(),
        ignored = reconciler.stats().ignored(),
        "Change feed totals"
    );
    if let Some(saver) = autosaver {
        saver.stop().await;
    }
    reconciler.stop().await;
    logging::log_success(Component::Host, "Pipeline engine stopped gracefully");
    Ok(())
}

fn log_summary(summary: &PipelineSummary) {
    let stages: BTreeMap<String, usize> = summary
        .opportunities_by_stage
        .iter()
        .map(|(stage, count)| (stage.to_string(), *count))
        .collect();
    sync_info!(
        Component::Host,
        accounts = summary.accounts,
        stages = ?stages,
        active_mrr = summary.active_estimated_mrr,
        won_mrr = summary.won_closed_mrr,
        open_reports = summary.open_reports,
        "📊 Pipeline summary"
    );
}

fn demo_accounts() -> Vec<Entity> {
    let now = Utc::now();
    [
        ("acct-northwind", "Northwind Traders", ScoreDimensions::new(4, 3, 4, 2, 3)),
        ("acct-contoso", "Contoso Retail", ScoreDimensions::new(2, 2, 3, 1, 2)),
    ]
    .into_iter()
    .map(|(id, name, scores)| {
        Entity::Account(Account {
            id: EntityId::new(id),
            name: name.to_string(),
            sector: Some("Retail".to_string()),
            city: None,
            owner: None,
            notes: None,
            scores,
            // Recomputed by the backend on seed
            score_total: 0,
            tier: Tier::C,
            wave: Wave::Third,
            created_at: now,
            updated_at: now,
        })
    })
    .collect()
}

/// A short scripted session through the store's public operations; the
/// returned saver keeps auto-saving the demo visit until shutdown
async fn play_demo_session<P>(
    store: &EntityStore<P>,
    config: &SyncConfig,
) -> pipeline_engine::SyncResult<Option<VisitAutoSaver>>
where
    P: Persistence + 'static,
{
    let Some(account) = store
        .create_account(NewAccount {
            name: "Fabrikam".to_string(),
            sector: Some("Manufacturing".to_string()),
            scores: ScoreDimensions::new(5, 4, 4, 3, 5),
            ..Default::default()
        })
        .await?
        .committed()
    else {
        return Ok(None);
    };
    sync_info!(
        Component::Host,
        id = %account.id,
        score = account.score_total,
        tier = %account.tier,
        wave = %account.wave,
        "Account created"
    );

    let opportunity_input = NewOpportunity {
        account_id: account.id.clone(),
        title: "Store rollout".to_string(),
        estimated_mrr: 4200.0,
        ..Default::default()
    };
    let Some(opportunity) = store
        .create_opportunity(opportunity_input.clone())
        .await?
        .committed()
    else {
        return Ok(None);
    };
    if let Outcome::Rejected(rejection) = store.create_opportunity(opportunity_input).await? {
        sync_info!(Component::Host, %rejection, "Second opportunity refused");
    }

    let visit = store
        .create_visit(NewVisit {
            opportunity_id: opportunity.id.clone(),
            account_id: account.id.clone(),
            visited_on: Utc::now().date_naive(),
            attendees: vec!["Operations lead".to_string()],
            diagnostics: BTreeMap::new(),
            summary: None,
        })
        .await?
        .committed();

    let mut autosaver = None;
    if let Some(visit) = &visit {
        let saver = VisitAutoSaver::start(store.clone(), visit.id.clone(), config.autosave_interval);
        saver.stage(VisitPatch {
            diagnostics: Some(BTreeMap::from([(
                DiagnosticAxis::Operations,
                AxisNotes {
                    observations: "Manual replenishment".to_string(),
                    pain_points: "Stock-outs every week".to_string(),
                    recommendations: "Automate reorder points".to_string(),
                },
            )])),
            ..Default::default()
        });
        autosaver = Some(saver);
        store
            .update_visit(
                &visit.id,
                VisitPatch {
                    summary: Some("Strong fit, clear operational pain".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(report) = store
            .create_report_draft(NewReportDraft {
                account_id: account.id.clone(),
                visit_id: Some(visit.id.clone()),
                title: "Diagnostic report".to_string(),
                body: String::new(),
            })
            .await?
            .committed()
        {
            store.advance_report_status(&report.id).await?;
        }
    }

    for target in [Stage::Contacted, Stage::Meeting, Stage::Proposal, Stage::Negotiation, Stage::Won] {
        match store
            .move_opportunity_stage(&opportunity.id, target, StageExtra::default())
            .await?
        {
            Outcome::Committed(moved) => {
                sync_info!(Component::Host, stage = %moved.stage, closed_mrr = ?moved.closed_mrr, "Opportunity moved");
            }
            other => {
                sync_warn!(Component::Host, stage = %target, outcome = ?other, "Move not applied");
                break;
            }
        }
    }
    Ok(autosaver)
}
