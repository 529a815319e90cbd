mod factory;

use std::sync::Arc;

use scrobconfig::get_config;
use scrobcore::registry::warn_name_collisions;
use scrobcore::{Dispatcher, Registry, Role, ScrobbleServerExt, ScrobbleState};
use scrobserver::logs::{LoggingOptions, init_logging};
use scrobserver::{LiveLog, Server};
use scrobwebhooks::WebhookServerExt;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let options = LoggingOptions::from_env();
    let live = match init_logging(options.clone()) {
        Ok(live) => live,
        Err(e) => {
            // Sans fichier de log plutôt que sans logs du tout
            eprintln!("Could not initialize file logging ({}), logging to console only", e);
            match init_logging(LoggingOptions {
                directory: None,
                ..options
            }) {
                Ok(live) => live,
                Err(e) => {
                    eprintln!("Could not initialize logging: {}", e);
                    return;
                }
            }
        }
    };

    let config = get_config();
    info!("Using configuration {}", config.path());

    let mut server = Server::new_configured(&config);
    if let Err(e) = run(&mut server, live).await {
        error!("Exited with uncaught error: {:#}", e);
    }

    // Le serveur continue de répondre même si le démarrage a échoué après l'écoute
    server.wait().await;
}

async fn run(server: &mut Server, live: LiveLog) -> anyhow::Result<()> {
    let config = get_config();
    let base_url = server.base_url().to_string();

    server.add_live_log(live.clone()).await;

    // ========== Clients et sources ==========
    let clients = Arc::new(Registry::build_from_config(
        Role::Client,
        Vec::new(),
        config.client_blocks(),
        |block| factory::build_client(block, &base_url),
    ));
    let sources = Arc::new(Registry::build_from_config(
        Role::Source,
        config.legacy_source_blocks(),
        config.source_blocks(),
        |block| factory::build_source(block, &base_url),
    ));

    clients.initialize_all().await;
    sources.initialize_all().await;
    warn_name_collisions(&sources, &clients);

    // ========== Routes ==========
    let state = ScrobbleState::new(sources.clone(), clients.clone(), live.clone(), &base_url);
    let poller = state.poller.clone();
    server.init_scrobble_routes(state).await?;
    server
        .init_webhook_routes(Dispatcher::new(sources, clients))
        .await?;

    // ========== Démarrage ==========
    server.start().await?;
    live.spawn_ticker();

    let report = poller.run_startup_poll().await;
    info!(
        "{} source(s) polling, {} waiting for authorization",
        report.started.len(),
        report.not_ready.len()
    );
    Ok(())
}
