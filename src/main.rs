//! voicelink daemon entry point
//!
//! Loads configuration, wires the capability backends into a client and
//! keeps a session alive: reconnecting with backoff when the connection
//! drops, closing cleanly on SIGTERM/SIGINT.

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voicelink::audio::{CpalPlayer, CpalRecorder, OpusDecoder, OpusEncoder};
use voicelink::lifecycle::ShutdownSignal;
use voicelink::{transport, Capabilities, Client, Config, ExponentialBackoff};

/// Consecutive failed connection attempts before giving up
const MAX_CONNECT_RETRIES: u32 = 12;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voicelink starting");
    config.validate().context("invalid configuration")?;

    let shutdown = ShutdownSignal::new();
    let mut backoff = ExponentialBackoff::new();
    let mut failures = 0u32;

    loop {
        let mut client = build_client(&config).context("failed to build client")?;

        if let Err(e) = client.connect().await {
            failures += 1;
            if failures >= MAX_CONNECT_RETRIES {
                error!(error = %e, attempts = failures, "giving up after repeated connect failures");
                return Err(e.into());
            }
            let delay = backoff.next_delay();
            warn!(
                error = %e,
                attempt = failures,
                delay_secs = delay.as_secs(),
                "connect failed, retrying"
            );
            tokio::select! {
                _ = sleep(delay) => continue,
                _ = shutdown.wait() => {
                    info!("shutdown requested while waiting to reconnect");
                    return Ok(());
                }
            }
        }

        failures = 0;
        backoff.reset();
        let status = client.status();
        info!(state = %status.state, "session running");

        tokio::select! {
            _ = client.connection_lost() => {
                warn!("server connection lost");
                if let Err(e) = client.close().await {
                    error!(error = %e, "failed to close session");
                }
                let delay = backoff.next_delay();
                info!(delay_secs = delay.as_secs(), "reconnecting after delay");
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.wait() => {
                        info!("shutdown requested while waiting to reconnect");
                        return Ok(());
                    }
                }
            }
            _ = shutdown.wait() => {
                if let Err(e) = client.close().await {
                    error!(error = %e, "failed to close session");
                }
                break;
            }
        }
    }

    info!("voicelink stopped");
    Ok(())
}

/// Assemble a client from the configured capability backends. A fresh
/// client is built per connection attempt since a closed session is
/// terminal.
fn build_client(config: &Config) -> Result<Client> {
    let spec = config.frame_spec();
    let capabilities = Capabilities {
        transport: transport::from_config(config)?,
        recorder: Box::new(CpalRecorder::new(spec)),
        encoder: Box::new(OpusEncoder::new(spec)?),
        decoder: Box::new(OpusDecoder::new(spec)?),
        player: Box::new(CpalPlayer::new(spec)?),
    };
    Ok(Client::new(config.clone(), capabilities))
}
