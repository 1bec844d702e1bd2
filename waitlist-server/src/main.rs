use waitlist_server::{Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. .env, config, work dir, logging
    let config = setup_environment()?;

    print_banner(&config);

    tracing::info!("Waitlist server starting...");

    // 2. Ledger, directory, coordinator
    let state = ServerState::initialize(&config).await?;

    // 3. HTTP server (starts background tasks)
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
