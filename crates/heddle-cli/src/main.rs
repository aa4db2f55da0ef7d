use std::sync::Arc;

use anyhow::{Context, Result};
use heddle_core::app::{HeartbeatLoop, ReaperLoop};
use heddle_core::domain::{MessageTarget, MessageType, NewMessage, NewTask, Outcome};
use heddle_core::impls::InMemoryStore;
use heddle_core::ports::{CoordinationStore, SystemClock};
use heddle_core::resolver::AvailableQuery;
use heddle_core::{Coordinator, HeddleConfig};
use heddle_pg::{Database, PgSettings, PgStore};
use tracing::{info, warn};

type Engine = Coordinator<dyn CoordinationStore, SystemClock>;

const DEMO_PROJECT: &str = "heddle-demo";

fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

/// PostgreSQL when connection settings are present, otherwise in-memory.
async fn open_store() -> Result<Arc<dyn CoordinationStore>> {
    let configured = ["HEDDLE_DATABASE_URL", "HEDDLE_DB_HOST"]
        .iter()
        .any(|var| std::env::var(var).is_ok());
    if !configured {
        warn!("no database configured, using the in-memory store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let settings = PgSettings::from_env().context("Invalid database settings")?;
    let db = Database::connect(&settings)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.migrate().await.context("Failed to migrate schema")?;
    Ok(Arc::new(PgStore::new(&db)))
}

/// planner が 2 段の作業を積み、coder が順に片付ける
async fn coordination_round(engine: &Engine) -> Result<()> {
    engine.seed_default_roles().await?;

    let planner = engine.register(DEMO_PROJECT, "/srv/planner", "demo-model").await?;
    let coder = engine.register(DEMO_PROJECT, "/srv/coder", "demo-model").await?;

    let schema = engine
        .create_task(
            NewTask::new(DEMO_PROJECT, "design schema")
                .role("planner")
                .priority(5)
                .file_scope(["db/schema.sql"])
                .created_by(planner.token.as_str()),
        )
        .await?;
    let api = engine
        .create_task(
            NewTask::new(DEMO_PROJECT, "implement api")
                .role("coder")
                .file_scope(["src/api", "db/schema.sql"])
                .depends_on([schema.id])
                .created_by(planner.token.as_str()),
        )
        .await?;

    let query = AvailableQuery::default().project(DEMO_PROJECT);
    for task in engine.list_available(&query).await? {
        info!(task = %task.id, title = %task.title, "available");
    }

    let claim = engine.claim(schema.id, &planner.token).await?;
    engine.start(claim.task.id, &planner.token).await?;
    engine
        .complete(schema.id, &planner.token, Outcome::Done, Some("schema committed".into()))
        .await?;

    engine
        .send(
            NewMessage::new(
                planner.token.clone(),
                DEMO_PROJECT,
                MessageTarget::Instance(coder.token.clone()),
                MessageType::Done,
                "schema is ready",
            )
            .body(format!("{} can start", api.id)),
        )
        .await?;

    for message in engine.inbox(&coder.token, DEMO_PROJECT).await? {
        info!(from = %message.from_instance, subject = %message.subject, "inbox");
        engine.mark_read(message.id).await?;
    }

    let claim = engine.claim(api.id, &coder.token).await?;
    if let Some(role) = &claim.role {
        info!(role = %role.name, "dispatching with role");
    }
    engine
        .complete(api.id, &coder.token, Outcome::Done, Some("api merged".into()))
        .await?;

    let report = engine.run_recovery_sweep().await?;
    info!(
        reclaimed = report.reclaimed.len(),
        reaped = report.reaped.len(),
        purged = report.purged_messages,
        pruned = report.pruned_activity,
        "sweep finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = HeddleConfig::load().context("Failed to load configuration")?;
    let store = open_store().await?;
    let engine: Arc<Engine> = Arc::new(Coordinator::new(store, SystemClock, &config)?);

    let observer = engine.register(DEMO_PROJECT, "/srv/observer", "demo-model").await?;
    let heartbeat =
        HeartbeatLoop::spawn(Arc::clone(&engine), observer.token.clone(), config.heartbeat_interval);
    let reaper = ReaperLoop::spawn(Arc::clone(&engine), config.sweep_interval);

    let outcome = tokio::select! {
        result = coordination_round(&engine) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Ok(())
        }
    };

    heartbeat.shutdown_and_join().await;
    reaper.shutdown_and_join().await;
    engine.deregister(&observer.token).await?;
    outcome?;

    let status = engine.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
