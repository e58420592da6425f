//! deadline-scout: binary entrypoint.
//!
//! Usage: `deadline-scout [once|recalc|daemon]` (default `once`).
//!   once    run one batch over every due institution
//!   recalc  recompute tiers and the "frequently changes" flag
//!   daemon  hourly clock that fires the weekly/monthly/recalc triggers
//!
//! State lives under `storage.data_dir`; see `config/scout.toml`.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deadline_scout::fetch::HttpFetcher;
use deadline_scout::notify::{LogSink, NotificationSink, WebhookSink};
use deadline_scout::pipeline::{self, Engine};
use deadline_scout::scheduler::{self, DueInstitutions, SchedulerState, Trigger};
use deadline_scout::{store, EngineConfig, InstitutionRef};
use tokio::sync::Notify;

const DAEMON_TICK: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Recalc,
    Daemon,
}

impl Mode {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg.unwrap_or("once") {
            "once" => Ok(Mode::Once),
            "recalc" => Ok(Mode::Recalc),
            "daemon" => Ok(Mode::Daemon),
            other => bail!("unknown mode {other:?} (expected once | recalc | daemon)"),
        }
    }
}

/// Compact logs by default, JSON lines when SCOUT_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deadline_scout=info,warn"));
    let json = std::env::var("SCOUT_LOG_JSON").ok().is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let arg = std::env::args().nth(1);
    let mode = Mode::parse(arg.as_deref())?;
    let cfg = EngineConfig::load_default().context("loading engine config")?;
    tracing::info!(?mode, data_dir = %cfg.storage.data_dir.display(), workers = cfg.run.workers, "deadline-scout starting");

    let fetcher = Arc::new(HttpFetcher::new(&cfg.fetch.user_agent)?);
    let sink: Arc<dyn NotificationSink> = match &cfg.notify.webhook_url {
        Some(url) => Arc::new(
            WebhookSink::new(url.clone())
                .with_timeout(cfg.notify.timeout_secs)
                .with_retries(cfg.notify.max_retries, cfg.notify.backoff_base_ms),
        ),
        None => Arc::new(LogSink),
    };
    let engine = Engine::open(cfg.clone(), fetcher, sink)?;
    let shutdown = listen_for_ctrl_c(&engine);

    match mode {
        Mode::Once => {
            let registry = store::load_registry(&cfg.storage.registry_path())?;
            let due = scheduler::select_due_institutions(Utc::now(), &registry, &cfg.scheduler);
            run_batch(&engine, due).await?;
        }
        Mode::Recalc => recalc(&engine)?,
        Mode::Daemon => daemon(&engine, &shutdown).await?,
    }
    Ok(())
}

/// One listener for the whole process. A Ctrl-C closes batch admission and
/// wakes the daemon loop; in-flight institutions still finish.
fn listen_for_ctrl_c(engine: &Engine) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let engine = engine.clone();
    let wake = notify.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received; finishing in-flight institutions");
            engine.request_stop();
            // stores a permit when nobody is waiting yet
            wake.notify_one();
        }
    });
    notify
}

async fn run_batch(engine: &Engine, due: DueInstitutions) -> Result<()> {
    let storage = &engine.config().storage;
    let outcome = engine.run_batch(due, Utc::now()).await;
    let updated: Vec<InstitutionRef> = outcome.updated_institutions().cloned().collect();

    // the registry may have changed while the batch ran
    pipeline::merge_into_registry(&storage.registry_path(), &updated)?;
    engine.save_state()?;
    pipeline::append_summary(&storage.summary_path(), &outcome.summary)?;
    Ok(())
}

fn recalc(engine: &Engine) -> Result<()> {
    let cfg = engine.config();
    let path = cfg.storage.registry_path();
    let mut registry = store::load_registry(&path)?;
    scheduler::recalculate_tiers(Utc::now(), &mut registry, engine.audit(), &cfg.scheduler);
    pipeline::merge_into_registry(&path, &registry)
}

async fn daemon(engine: &Engine, shutdown: &Notify) -> Result<()> {
    let cfg = engine.config();
    let state_path = cfg.storage.scheduler_state_path();
    let mut state = SchedulerState::load(&state_path)?;
    let mut ticker = tokio::time::interval(DAEMON_TICK);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => break,
        }
        if engine.stop_requested() {
            break;
        }

        let now = Utc::now();
        let triggers = scheduler::due_triggers(now, &state, &cfg.scheduler);
        if triggers.is_empty() {
            continue;
        }
        tracing::info!(target: "scheduler", ?triggers, "triggers due");

        if triggers.contains(&Trigger::Recalculate) {
            if let Err(e) = recalc(engine) {
                tracing::error!(error = %e, "tier recalculation failed");
            } else {
                state.mark(Trigger::Recalculate, now);
            }
        }

        // fresh registry every tick: institutions and signals change between runs
        let registry = match store::load_registry(&cfg.storage.registry_path()) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "loading registry failed; retrying next tick");
                continue;
            }
        };
        let due = scheduler::select_for_triggers(now, &registry, &cfg.scheduler, &triggers);
        if !due.is_empty() {
            // a failed save is logged; the next tick retries with the same state
            if let Err(e) = run_batch(engine, due).await {
                tracing::error!(error = %e, "persisting batch results failed");
            }
        }
        // a stopped batch is left unmarked so the next start picks it up again
        if !engine.stop_requested() {
            for t in triggers.iter().filter(|t| **t != Trigger::Recalculate) {
                state.mark(*t, now);
            }
        }
        state.save(&state_path)?;
    }

    tracing::info!("daemon stopped");
    engine.save_state()?;
    state.save(&state_path)
}
