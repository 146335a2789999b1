use std::env;
use std::time::Duration;

/// URL of the upstream timeseries CSV.
pub const DATA_URL: &str = "https://coronadatascraper.com/timeseries.csv";

/// Target database and measurement names. Fixed, not configurable.
pub const DATABASE: &str = "covid";
pub const MEASUREMENT: &str = "cases";

/// Points accumulated before a batch is written out.
pub const BATCH_SIZE: usize = 1000;

/// How often to re-check the upstream CSV for changes.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

const DEFAULT_INFLUXDB_SERVER: &str = "http://localhost:8086";

/// Runtime configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub influxdb_server: String,
    pub data_url: String,
    pub check_interval: Duration,
}

impl Config {
    /// Read configuration from the environment. `INFLUXDB_SERVER` is the
    /// only variable consulted; everything else is fixed.
    pub fn from_env() -> Self {
        let influxdb_server = env::var("INFLUXDB_SERVER")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INFLUXDB_SERVER.to_string());

        Config {
            influxdb_server,
            data_url: DATA_URL.to_string(),
            check_interval: CHECK_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_when_env_unset() {
        temp_env::with_var("INFLUXDB_SERVER", None::<&str>, || {
            let cfg = Config::from_env();
            assert_eq!(cfg.influxdb_server, DEFAULT_INFLUXDB_SERVER);
            assert_eq!(cfg.check_interval, Duration::from_secs(300));
        });
    }

    #[test]
    fn server_from_env() {
        temp_env::with_var("INFLUXDB_SERVER", Some("http://influx.internal:8086"), || {
            let cfg = Config::from_env();
            assert_eq!(cfg.influxdb_server, "http://influx.internal:8086");
        });
    }

    #[test]
    fn empty_server_var_falls_back_to_default() {
        temp_env::with_var("INFLUXDB_SERVER", Some(""), || {
            let cfg = Config::from_env();
            assert_eq!(cfg.influxdb_server, DEFAULT_INFLUXDB_SERVER);
        });
    }
}
