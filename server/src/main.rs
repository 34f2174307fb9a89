use clap::Parser;
use log::{info, warn};
use remote_server::{RemoteApi, RemoteConfig, ScriptExecutor, ScriptOutcome};
use std::path::PathBuf;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Demo host: serves the remote API and echoes every script back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to [default: 0.0.0.0, or the config file's]
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on [default: 6969, or the config file's]
    #[arg(short, long)]
    port: Option<u16>,

    /// Host frames per second; one script runs per frame at most
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Network thread tick in milliseconds
    #[arg(long)]
    net_tick_ms: Option<u64>,

    /// Seconds without a valid packet before the client is dropped
    #[arg(short, long)]
    keep_alive_secs: Option<u64>,

    /// JSON config file; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between heartbeat log lines sent to subscribed clients
    #[arg(short, long, default_value = "5")]
    log_interval: u64,
}

/// Answers each script with its own text
struct EchoExecutor {
    executed: u64,
}

impl ScriptExecutor for EchoExecutor {
    fn execute_script(&mut self, payload: &[u8]) -> ScriptOutcome {
        self.executed += 1;
        if payload.is_empty() {
            return ScriptOutcome::failure("empty script");
        }
        info!(
            "Script #{}: {}",
            self.executed,
            String::from_utf8_lossy(payload)
        );
        ScriptOutcome::success(payload)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RemoteConfig::from_json_file(path)?,
        None => RemoteConfig::default(),
    };
    config.override_bind(args.host.as_deref(), args.port);
    if let Some(tick) = args.net_tick_ms {
        config.tick_period_ms = tick;
    }
    if let Some(secs) = args.keep_alive_secs {
        config.keep_alive_timeout_ms = secs.saturating_mul(1_000);
    }

    info!("Starting remote host on {}", config.bind_addr);
    let mut api = RemoteApi::start(config)?;
    let handle = api.handle();

    let host_loop = async {
        let mut executor = EchoExecutor { executed: 0 };
        let mut frame_timer = interval(Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32));
        frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let log_every = Duration::from_secs(args.log_interval.max(1));
        let mut last_log = Instant::now();
        let mut frames: u64 = 0;

        loop {
            frame_timer.tick().await;
            frames += 1;

            handle.process_command(&mut executor);

            if last_log.elapsed() >= log_every {
                last_log = Instant::now();
                let line = format!("host alive: {} frames, {} scripts", frames, executor.executed);
                handle.send_log(line.as_bytes());
            }
        }
    };

    tokio::select! {
        _ = host_loop => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C, shutting down...");
        }
    }

    api.shutdown();
    Ok(())
}
