use clap::Parser;
use log::{info, warn};
use remote_client::RemoteClient;
use remote_protocol::ClientSubscriptions;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:6969")]
    server: String,

    /// Script to run; without one the client only follows the log stream
    #[arg(short = 'e', long)]
    script: Option<String>,

    /// Subscribe to the host's log stream
    #[arg(short, long)]
    logging: bool,

    /// Seconds between keep-alive packets while following logs
    #[arg(short, long, default_value = "2")]
    keep_alive: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut client = RemoteClient::connect(&args.server).await?;
    let subscriptions = ClientSubscriptions {
        logging: args.logging,
        multiworld_updates: false,
    };
    client.handshake(subscriptions).await?;

    if let Some(script) = &args.script {
        let result = client.execute(script.as_bytes()).await?;
        for line in client.take_logs() {
            println!("[log] {}", String::from_utf8_lossy(&line));
        }
        if result.success {
            println!("{}", result.result_text());
        } else {
            eprintln!("error: {}", result.result_text());
        }
        if !args.logging {
            return Ok(());
        }
    }

    if !args.logging {
        warn!("Nothing to do: pass --script or --logging");
        return Ok(());
    }

    info!("Following log stream, Ctrl+C to stop");
    let mut keep_alive = interval(Duration::from_secs(args.keep_alive.max(1)));
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = client.next_log() => {
                println!("[log] {}", String::from_utf8_lossy(&line?));
            }
            _ = keep_alive.tick() => {
                client.keep_alive().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Disconnecting");
                return Ok(());
            }
        }
    }
}
