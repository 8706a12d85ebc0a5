mod age_filter;
mod brain_api;
mod dates;
mod errors;
mod models;
mod pace;
mod reconcile;
mod rozetka_api;
mod scheduler;
mod session;
mod settings;
mod store;
mod web;

use once_cell::sync::Lazy;
use tokio::task::JoinHandle;

use crate::scheduler::Jobs;
use crate::settings::Settings;
use crate::store::Store;
use crate::web::AppState;

// `.conf` plus whatever extension `config` finds (`.conf.yaml`, ...) unless told otherwise.
static CONF_PATH: Lazy<String> =
    Lazy::new(|| std::env::var("RECONCILER_CONF_FILE").unwrap_or_else(|_| ".conf".to_string()));

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load(&CONF_PATH)?;
    let store = Store::open(&settings.db_path)?;

    if settings.rules.is_empty() {
        log::warn!("No reconcile rules configured, only the web server will run");
    }
    let jobs = Jobs::new(settings.rules.clone(), settings.rozetka.clone(), store.clone())?;
    let handles = jobs.spawn();

    let app = web::router(AppState {
        jobs,
        brain: settings.brain.clone(),
    });
    let listener = tokio::net::TcpListener::bind(settings.web.listen).await?;
    log::info!("Listening on {}", settings.web.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    handles.iter().for_each(JoinHandle::abort);
    store.flush().await?;
    Ok(())
}

async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Can't listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
