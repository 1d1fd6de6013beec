//! Controller/worker exchange over the in-process bus
//!
//! Run: cargo run --example ping_pong [-- path/to/strictbus.yml]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use strictbus::logging::setup_logging;
use strictbus::{Config, Contract, LocalHub, Payload, define_request, event_map, object_param};
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Progress {
    done: u32,
    total: u32,
}
object_param!(Progress { done: u32, total: u32 });

event_map!(ToController {
    Ping = "ping": fn(u32),
    Report = "report": Payload<Progress>,
});

event_map!(ToWorker {
    Pong = "pong": fn(u32, String),
});

define_request!(Square = "square": fn(i64) -> i64);
event_map!(Math { Square });

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config_log_level = Config::load_log_level(config_path.as_ref());
    let log_path = setup_logging(None, config_log_level.as_deref()).context("Failed to setup logging")?;
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;
    println!("Logging to {}", log_path.display());

    let hub = LocalHub::new(config.bus.clone());
    let channel = Contract::<ToController, ToWorker>::new()?;
    let math = Contract::<Math>::new()?;

    let controller = channel.controller(hub.controller());
    controller.on::<Ping, _>(|event, (n,)| {
        info!(sender = %event.sender(), n, "controller got ping");
        if let Err(e) = event.reply::<Pong>((n, format!("pong #{}", n))) {
            tracing::warn!("reply failed: {}", e);
        }
    });
    controller.on::<Report, _>(|event, (progress,)| {
        println!("{} reports {}/{}", event.sender(), progress.done, progress.total);
    });

    let handler = math.handler(hub.controller());
    handler.handle::<Square, _, _>(|_, (n,)| async move { Ok(n * n) })?;

    let port = hub.spawn_worker("pinger")?;
    let invoker = math.invoker(port.clone());
    let worker = channel.reversed().worker(port);

    let done = Arc::new(Notify::new());
    let finished = Arc::clone(&done);
    worker.on::<Pong, _>(move |_, (n, text)| {
        println!("worker got {} ({})", text, n);
        if n == 3 {
            finished.notify_one();
        }
    });

    for n in 1..=3 {
        worker.send::<Ping>((n,))?;
        worker.send::<Report>((Progress { done: n, total: 3 },))?;
    }

    tokio::time::timeout(Duration::from_secs(5), done.notified())
        .await
        .context("Timed out waiting for pong")?;

    let squared = invoker.invoke::<Square>((12,)).await?;
    println!("square(12) = {}", squared);

    println!("{}", serde_json::to_string_pretty(&hub.metrics())?);
    hub.shutdown();
    Ok(())
}
