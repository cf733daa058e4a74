/**
 * SYMBION LIVESTATE - Point d'entrée du kernel livestate
 *
 * RÔLE : Orchestration des modules : config, store, realm racine, recompute
 * de démarrage, historique livesynthesis, ingestion MQTT et API REST.
 *
 * ARCHITECTURE : check results via MQTT + API REST, compteurs tenus à jour par
 * les hooks du cycle de vie des items.
 */

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use symbion_livestate::config::load_config;
use symbion_livestate::health::HealthTracker;
use symbion_livestate::http::{self, AppState};
use symbion_livestate::lifecycle::ensure_root_realm;
use symbion_livestate::livesynthesis::{recompute, retention};
use symbion_livestate::store::{LiveStore, MemoryStore};
use symbion_livestate::mqtt;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("symbion_livestate=info")),
        )
        .init();

    let cfg = load_config().await;

    // store : persistant si data_dir est configuré
    let store: Arc<dyn LiveStore> = match &cfg.data_dir {
        Some(dir) => Arc::new(
            MemoryStore::open(dir.join("livestate.json"))
                .with_context(|| format!("failed to open store in {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let root = ensure_root_realm(store.as_ref(), &cfg.root_realm).context("failed to create root realm")?;
    info!(realm = %root.id, name = %root.name, "root realm ready");

    // auto-réparation des compteurs au démarrage
    let report = recompute(store.as_ref(), None).context("boot recompute failed")?;
    info!(created = report.created.len(), recounted = report.recounted.len(), "livesynthesis checked");

    retention::spawn_history_job(store.clone(), cfg.livesynthesis);

    let health_tracker = HealthTracker::new();
    match &cfg.mqtt {
        Some(conf) => mqtt::spawn_mqtt_listener(store.clone(), conf.clone(), health_tracker.clone()),
        None => info!("no mqtt broker configured, check ingestion disabled"),
    }

    let addr: SocketAddr = cfg.listen.parse().with_context(|| format!("invalid listen address {}", cfg.listen))?;
    let app = http::build_router(AppState {
        store,
        cfg: Arc::new(cfg),
        health_tracker,
    });

    info!(%addr, "listening");
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
