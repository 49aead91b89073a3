use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::{Handler, RemoteAddr, Request, Response};

/// Replay a burst of requests from one client against a policy.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML file with `replay` and `policy` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Accesses allowed per client (0 = unlimited)
    #[arg(long)]
    allow: Option<u64>,

    /// Idle window in seconds (0 = forever)
    #[arg(long)]
    per_secs: Option<u64>,

    /// Remote address the requests come from
    #[arg(long)]
    remote: Option<String>,

    /// Number of requests to send
    #[arg(short = 'n', long)]
    requests: Option<u64>,

    /// Pause between requests in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<TurnstileConfig> {
        let mut config = match &self.config {
            Some(path) => TurnstileConfig::from_file(path)?,
            None => TurnstileConfig::default(),
        };

        if let Some(allow) = self.allow {
            config.policy.allow = allow;
        }
        if let Some(per_secs) = self.per_secs {
            config.policy.per_secs = per_secs;
            config.policy.per_ms = 0;
        }
        if let Some(remote) = self.remote {
            config.replay.remote_addr = remote;
        }
        if let Some(requests) = self.requests {
            config.replay.requests = requests;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.replay.interval_ms = interval_ms;
        }

        Ok(config)
    }
}

fn app(res: &mut Response, _req: &Request) {
    *res.body_mut() = "ok".to_string();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Args::parse().into_config()?;
    info!(
        allow = config.policy.allow,
        window = ?config.policy.window(),
        reject_chain = config.policy.then.len(),
        "Configuration loaded"
    );

    let policy = config.policy.build().to(app);
    let interval = Duration::from_millis(config.replay.interval_ms);

    let replay = async {
        for n in 1..=config.replay.requests {
            let mut req = Request::default();
            req.extensions_mut()
                .insert(RemoteAddr(config.replay.remote_addr.clone()));

            let mut res = Response::default();
            policy.call(&mut res, &req);

            let key = policy.key_for(&req);
            info!(
                n,
                key = %key,
                status = %res.status(),
                count = ?policy.store().access_count(&key),
                banned = policy.store().is_banned(&key),
                "Request dispatched"
            );

            tokio::time::sleep(interval).await;
        }
    };

    tokio::select! {
        _ = replay => {
            info!("Replay finished");
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, stopping replay");
        }
    }

    Ok(())
}
