use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use face_api::engine::{CommandEngine, FaceEngine};
use face_api::materialize::Materializer;
use face_api::server::{self, AppState};
use face_api::settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, process};

use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./face-api [config file]";

fn get_args() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => None,
        2 if args[1] != "-h" && args[1] != "--help" => Some(PathBuf::from(&args[1])),
        _ => {
            println!("{USAGE}");
            process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config_file = get_args();
    let settings = Settings::load(config_file.as_deref()).context("loading settings")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("face-api starting with {settings:?}");

    let engine: Arc<dyn FaceEngine> = Arc::new(
        CommandEngine::from_command_line(&settings.engine_command)
            .ok_or_else(|| anyhow!("engine_command is empty"))?,
    );

    let materializer = Materializer::with_fetch_timeout(settings.temp_dir(), settings.fetch_timeout())
        .context("building HTTP client")?;

    let state = web::Data::new(
        AppState::new(engine, materializer).with_max_payload_bytes(settings.max_payload_bytes),
    );

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(server::configure)
    })
    .workers(settings.workers)
    .keep_alive(settings.keep_alive())
    .shutdown_timeout(settings.shutdown_timeout_secs)
    .bind(&settings.bind)
    .with_context(|| format!("binding {}", settings.bind))?
    .run()
    .await?;

    info!("face-api stopped");
    Ok(())
}
