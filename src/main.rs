use anyhow::Result;
use covidscraper::{
    agent::Agent,
    config::{Config, DATABASE, MEASUREMENT},
    influx::InfluxStore,
};
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configure ────────────────────────────────────────────────
    let config = Config::from_env();
    info!(
        server = %config.influxdb_server,
        url = %config.data_url,
        interval = ?config.check_interval,
        "configured"
    );

    // ─── 3) recreate the target database ─────────────────────────────
    let store = InfluxStore::new(&config.influxdb_server, DATABASE, MEASUREMENT);
    store.ensure_database().await?;

    // ─── 4) run the check-and-reload loop ────────────────────────────
    let agent = Agent::new(Client::new(), store, config);
    agent.run().await
}
