use std::path::PathBuf;
use std::sync::Arc;

use chat_server::config::Config;
use chat_server::filters::{PassthroughFilter, ProfanityFilter, WordListProfanityFilter};
use chat_server::handlers::client::handle_client;
use chat_server::message_models::ServerEnvelope;
use chat_server::profile_store::MemoryProfileStore;
use chat_server::router::ChatRouter;
use chat_server::server_state::ServerState;
use clap::Parser;
use flexi_logger::Logger;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "chat_server", about = "Moderated chat server")]
struct Args {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides network.bind_address and network.port, e.g. 0.0.0.0:7777
    #[arg(short, long)]
    bind: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let _logger = Logger::try_with_str(&args.log_level)?
        .log_to_stderr()
        .start()?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let store = match &config.store.path {
        Some(path) => MemoryProfileStore::open(path).await?,
        None => MemoryProfileStore::new(),
    };
    store.seed_admins(&config.admins()).await?;

    let filter: Arc<dyn ProfanityFilter> = match &config.filter.word_list {
        Some(path) => Arc::new(WordListProfanityFilter::load(path).await?),
        None => Arc::new(PassthroughFilter),
    };

    let server_state = ServerState::new();
    let router = Arc::new(
        ChatRouter::builder(server_state.clone(), Arc::new(store))
            .filter(filter)
            .settings(config.router_settings())
            .build(),
    );

    let bind = args.bind.clone().unwrap_or_else(|| config.bind_addr());
    let listener = TcpListener::bind(&bind).await?;
    info!("{} listening on {bind}", config.server.name);

    let max_connections = config.network.max_connections;
    let outbound_queue = config.limits.outbound_queue;
    loop {
        let (mut socket, addr) = listener.accept().await?;
        if server_state.connection_count() >= max_connections {
            warn!("refusing {addr}: {max_connections} connections already open");
            tokio::spawn(async move {
                let full = ServerEnvelope::LoginRejected {
                    reason: "Server is full.".to_owned(),
                };
                if let Ok(line) = full.to_line() {
                    let _ = socket.write_all(line.as_bytes()).await;
                }
            });
            continue;
        }

        let router = router.clone();
        tokio::spawn(async move {
            handle_client(socket, addr, router, outbound_queue).await;
        });
    }
}
