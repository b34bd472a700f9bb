//! The single consolidated KV-watch loop (§9: the two near-identical watch
//! loops in `examples/original_source/sense.py`,
//! `consul_kv_refresh`/`consul_service_refresh`, are folded into one here).
//!
//! Blocks on the coordination store's blocking-index `kv_get`; on any
//! transport error, sleeps 10s and retries with the last known index
//! (§4.A, §6.4).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch as shutdown_watch;

use crate::consul::ConsulOps;

use super::cache::Sensor;

pub async fn watch_loop(
    consul: Arc<dyn ConsulOps>,
    sensor: Arc<Sensor>,
    backoff: Duration,
    mut shutdown_rx: shutdown_watch::Receiver<bool>,
) {
    let mut index: Option<u64> = None;
    loop {
        if *shutdown_rx.borrow() {
            tracing::info!("kv-watch loop shutting down");
            return;
        }

        let watch = consul.kv_get("tarantool/", true, index);
        tokio::select! {
            result = watch => {
                match result {
                    Ok((new_index, _entries)) => {
                        if Some(new_index) != index {
                            index = Some(new_index);
                            if let Err(e) = sensor.update().await {
                                tracing::warn!(error = %e, "snapshot refresh after kv-watch trigger failed");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "kv-watch transport error, retrying after backoff");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("kv-watch loop shutting down");
                    return;
                }
            }
        }
    }
}
