use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chat_server::channels::ChatChannel;
use chat_server::message_models::{ChatBroadcast, ClientEnvelope};
use clap::Parser;
use flexi_logger::Logger;
use log::{info, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{self, Duration};

#[derive(Parser, Debug)]
#[command(name = "chat_load_test", about = "Opens many chat connections and sends Global chat")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:7777")]
    addr: String,

    /// Total virtual users
    #[arg(long, default_value_t = 100)]
    clients: usize,

    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Default)]
struct Counters {
    sent: AtomicUsize,
    received: AtomicUsize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _logger = Logger::try_with_str(&args.log_level)?
        .log_to_stderr()
        .start()?;

    info!("starting stress test: {} clients on {}", args.clients, args.addr);
    let counters = Arc::new(Counters::default());

    for i in 0..args.clients {
        let addr = args.addr.clone();
        let counters = counters.clone();
        let interval = args.interval_ms;
        tokio::spawn(async move {
            if let Err(e) = run_client(i, &addr, interval, counters).await {
                warn!("client {i} error: {e}");
            }
        });

        // Small delay between spawns to avoid overwhelming the accept() queue
        time::sleep(Duration::from_millis(5)).await;
    }

    let mut report = time::interval(Duration::from_secs(10));
    loop {
        report.tick().await;
        info!(
            "sent {} / received {}",
            counters.sent.load(Ordering::Relaxed),
            counters.received.load(Ordering::Relaxed)
        );
    }
}

fn envelope_line(envelope: &ClientEnvelope) -> io::Result<String> {
    let mut line = serde_json::to_string(envelope).map_err(io::Error::other)?;
    line.push('\n');
    Ok(line)
}

async fn run_client(
    id: usize,
    addr: &str,
    interval: u64,
    counters: Arc<Counters>,
) -> io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = io::split(stream);
    let nick = format!("bot{id}");

    // Keep reading so the server never sees a full outbound queue.
    let reader_counters = counters.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            reader_counters.received.fetch_add(1, Ordering::Relaxed);
        }
    });

    let login = ClientEnvelope::Login {
        identity: format!("load-test-{id}"),
        username: nick.clone(),
    };
    writer.write_all(envelope_line(&login)?.as_bytes()).await?;
    let scene = ClientEnvelope::EnterScene {
        scene: "stress_test".to_owned(),
    };
    writer.write_all(envelope_line(&scene)?.as_bytes()).await?;

    let mut ticker = time::interval(Duration::from_millis(interval));
    let mut cpt = 0_usize;
    loop {
        ticker.tick().await;
        let chat = ClientEnvelope::Chat(ChatBroadcast::new(
            format!("Message from {nick} - Load Testing...{cpt}"),
            ChatChannel::GLOBAL,
        ));
        cpt += 1;
        if writer
            .write_all(envelope_line(&chat)?.as_bytes())
            .await
            .is_err()
        {
            break; // Connection lost
        }
        counters.sent.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}
