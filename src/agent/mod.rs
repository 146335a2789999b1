use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::io::Cursor;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{Config, BATCH_SIZE};
use crate::digest::{ChangeTracker, Digest};
use crate::fetch;
use crate::influx::InfluxStore;
use crate::process::RowLoader;

/// Gate in front of load dispatch: owns the last-triggered digest and the
/// in-flight load task.
///
/// At most one load runs at a time. While one is in flight the tick skips
/// the digest comparison entirely, so the retained digest does not advance
/// and a dropped trigger is retried on the next tick.
struct LoadGate {
    tracker: ChangeTracker,
    task: Option<JoinHandle<()>>,
}

impl LoadGate {
    fn new() -> Self {
        Self {
            tracker: ChangeTracker::new(),
            task: None,
        }
    }

    /// True while a previously dispatched load is still running.
    fn load_in_flight(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Compare `payload` against the last triggered snapshot, advancing the
    /// retained digest when it differs. Only call when no load is in flight.
    fn should_dispatch(&mut self, payload: &[u8]) -> bool {
        self.tracker.observe(payload)
    }

    fn dispatch<F>(&mut self, load: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.task = Some(tokio::spawn(load));
    }

    fn last_digest(&self) -> Option<&Digest> {
        self.tracker.last()
    }
}

/// Drives the check-and-reload loop: fetch the CSV on a fixed interval,
/// compare its digest against the last snapshot, and dispatch a load when
/// the content changed.
pub struct Agent {
    client: Client,
    store: InfluxStore,
    config: Config,
    gate: LoadGate,
}

impl Agent {
    pub fn new(client: Client, store: InfluxStore, config: Config) -> Self {
        Self {
            client,
            store,
            config,
            gate: LoadGate::new(),
        }
    }

    /// Run forever. The first check fires immediately, then once per
    /// configured interval.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval(self.config.check_interval);
        loop {
            ticker.tick().await;
            self.check_for_updates().await;
        }
    }

    async fn check_for_updates(&mut self) {
        // no point downloading a payload this tick would have to discard
        if self.gate.load_in_flight() {
            warn!("previous load still running; skipping this tick");
            return;
        }

        let payload = match fetch::fetch_csv(&self.client, &self.config.data_url).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "fetch failed; retrying on the next tick");
                return;
            }
        };

        if self.gate.should_dispatch(&payload) {
            // the digest advances here, at trigger time, not on completion
            let digest = self.gate.last_digest().expect("digest set by observe");
            info!(%digest, bytes = payload.len(), "snapshot changed; reloading");
            let store = self.store.clone();
            self.gate.dispatch(async move {
                if let Err(err) = run_load(store, payload).await {
                    // CSV structure and store failures are fatal
                    error!(error = %err, "load failed");
                    std::process::exit(1);
                }
            });
        }
    }
}

async fn run_load(mut store: InfluxStore, payload: Vec<u8>) -> Result<()> {
    info!(bytes = payload.len(), "updating data");
    let (rows, batches) = RowLoader::new(&mut store, BATCH_SIZE)
        .load(Cursor::new(payload))
        .await?;
    info!(rows, batches, "load complete");
    Ok(())
}
