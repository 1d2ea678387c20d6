use clap::Parser;
use log::{error, info};
use server::authority::SessionAuthority;
use server::clock::SystemClock;
use server::config::ServerArgs;
use server::game::Game;
use server::network::{Server, ServerMessage};
use server::persistence::{load_saved_game, JsonFileStore, MemoryStore, SnapshotStore};
use server::roles::RoleAssigner;
use std::sync::Arc;

/// Parses the command line, restores any saved game and runs the server
/// until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let args = ServerArgs::parse();
    let config = args.game_config();

    let store: Arc<dyn SnapshotStore> = match &args.data_dir {
        Some(dir) => Arc::new(JsonFileStore::open(dir)?),
        None => {
            info!("No data directory given, game state lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let roles = match args.role_seed {
        Some(seed) => RoleAssigner::seeded(seed, config.traitor_count, config.min_players),
        None => RoleAssigner::from_entropy(config.traitor_count, config.min_players),
    };
    let (snapshot, players) = load_saved_game(store.as_ref());
    let game = Game::restore(config, roles, Arc::new(SystemClock), snapshot, players);
    let authority = SessionAuthority::new(game, args.admin_secret.clone());

    let mut server = Server::new(
        &args.bind_address(),
        args.max_clients,
        args.client_timeout(),
        authority,
        store,
    )
    .await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                if shutdown.send(ServerMessage::Shutdown).is_err() {
                    error!("Server loop already stopped");
                }
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
