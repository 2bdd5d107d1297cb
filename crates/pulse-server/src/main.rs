use tracing::info;

use pulse_api::AppStateInner;
use pulse_db::Database;
use pulse_gateway::{Dispatcher, TokenVerifier};
use pulse_server::config::Config;
use pulse_server::{app, cleanup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    pulse_server::init_logging();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    let db = Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let dispatcher = Dispatcher::new(TokenVerifier::new(&config.jwt_secret));
    let state = AppStateInner::new(db, dispatcher);

    tokio::spawn(cleanup::run_story_sweep(state.clone(), config.story_sweep_secs));

    let app = app::router(state);

    info!("Pulse server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
