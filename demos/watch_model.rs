//! Model watcher example
//!
//! Streams model changes with OpenTelemetry enabled and backs off on
//! transient server errors. Stops after Ctrl-C.
//!
//! Run with: MODELWIRE_ADDRESS=10.0.0.5:17070 MODELWIRE_PASSWORD=secret cargo run --example watch_model

use modelwire::client::{ExponentialBackoff, SessionBuilder, WatchEvent, WatcherConfig};
use modelwire::core::{Credentials, ObservabilityConfig, ProtocolGeneration};
use modelwire::WatcherLoop;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::var("MODELWIRE_ADDRESS").unwrap_or_else(|_| "127.0.0.1:17070".into());
    let password = std::env::var("MODELWIRE_PASSWORD").unwrap_or_default();
    let generation: ProtocolGeneration = std::env::var("MODELWIRE_PROTOCOL")
        .unwrap_or_else(|_| "v2".into())
        .parse()?;

    let otel_config = ObservabilityConfig::new("modelwire-watch-example").with_log_level("info");

    let session = SessionBuilder::new(address)
        .generation(generation)
        .connect_timeout(Duration::from_secs(10))
        .with_observability(otel_config)
        .connect()
        .await?;
    session.login(Credentials::new("admin", password)).await?;

    let config = WatcherConfig::new().with_retry(
        ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(10))
            .with_max_attempts(5)
            .with_jitter(),
    );
    let (watcher, mut events) = WatcherLoop::with_config(&session, config);
    watcher.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Some(WatchEvent::Batch(records)) => {
                    for record in records {
                        println!("{:<8} {:<12} {}", record.verb.as_str(), record.kind.as_str(), record.snapshot);
                    }
                }
                Some(WatchEvent::End) => {
                    println!("Watcher stopped by the controller");
                    break;
                }
                Some(WatchEvent::Failed(error)) => {
                    eprintln!("Watcher failed: {}", error);
                    break;
                }
                None => break,
            }
        }
    }

    watcher.stop().await;
    session.close().await;
    modelwire::core::shutdown_observability();
    Ok(())
}
