use anyhow::{Context, Result};
use async_trait::async_trait;
use influxdb::{Client, ReadQuery, Timestamp, WriteQuery};
use tracing::info;

use crate::process::{FieldValue, MeasurementSink, Point};

/// Handle to the target InfluxDB database and measurement.
///
/// Cloneable; the underlying HTTP client is shared.
#[derive(Clone)]
pub struct InfluxStore {
    client: Client,
    database: String,
    measurement: String,
}

impl InfluxStore {
    pub fn new(server: &str, database: &str, measurement: &str) -> Self {
        Self {
            client: Client::new(server, database),
            database: database.to_string(),
            measurement: measurement.to_string(),
        }
    }

    /// Create the target database, dropping it first if it already exists.
    /// Runs once at startup; prior data is always discarded.
    pub async fn ensure_database(&self) -> Result<()> {
        let resp = self
            .client
            .query(ReadQuery::new("SHOW DATABASES"))
            .await
            .context("listing databases")?;
        if database_listed(&resp, &self.database)? {
            info!(database = %self.database, "dropping existing database");
            self.client
                .query(ReadQuery::new(format!("DROP DATABASE {}", self.database)))
                .await
                .with_context(|| format!("dropping database {}", self.database))?;
        }
        self.client
            .query(ReadQuery::new(format!("CREATE DATABASE {}", self.database)))
            .await
            .with_context(|| format!("creating database {}", self.database))?;
        info!(database = %self.database, "database ready");
        Ok(())
    }

    fn to_write_query(&self, point: &Point) -> WriteQuery {
        let nanos = point.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let mut query = WriteQuery::new(
            Timestamp::Nanoseconds(nanos as u128),
            self.measurement.clone(),
        );
        for (key, value) in &point.tags {
            query = query.add_tag(key.clone(), value.clone());
        }
        for (key, value) in &point.fields {
            query = match value {
                FieldValue::Int(v) => query.add_field(key.clone(), *v),
                FieldValue::Float(v) => query.add_field(key.clone(), *v),
            };
        }
        query
    }
}

#[async_trait]
impl MeasurementSink for InfluxStore {
    async fn drop_measurement(&mut self) -> Result<()> {
        self.client
            .query(ReadQuery::new(format!(
                "DROP MEASUREMENT {}",
                self.measurement
            )))
            .await
            .with_context(|| format!("dropping measurement {}", self.measurement))?;
        Ok(())
    }

    async fn write_batch(&mut self, points: Vec<Point>) -> Result<()> {
        let queries: Vec<WriteQuery> = points.iter().map(|p| self.to_write_query(p)).collect();
        self.client
            .query(queries)
            .await
            .context("writing batch to InfluxDB")?;
        Ok(())
    }
}

/// Pull the database names out of a `SHOW DATABASES` response and check for
/// `name`. The response shape is
/// `{"results":[{"series":[{"values":[["db1"],["db2"]]}]}]}`; a missing
/// series means no databases exist yet.
fn database_listed(body: &str, name: &str) -> Result<bool> {
    let parsed: serde_json::Value =
        serde_json::from_str(body).context("parsing SHOW DATABASES response")?;
    let listed = parsed["results"][0]["series"][0]["values"]
        .as_array()
        .map(|rows| rows.iter().any(|row| row[0].as_str() == Some(name)))
        .unwrap_or(false);
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_DATABASES: &str = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["covid"]]}]}]}"#;

    #[test]
    fn finds_existing_database() {
        assert!(database_listed(SHOW_DATABASES, "covid").unwrap());
        assert!(!database_listed(SHOW_DATABASES, "weather").unwrap());
    }

    #[test]
    fn empty_server_has_no_databases() {
        let body = r#"{"results":[{"statement_id":0}]}"#;
        assert!(!database_listed(body, "covid").unwrap());
    }

    #[test]
    fn garbage_response_is_an_error() {
        assert!(database_listed("<html>nope</html>", "covid").is_err());
    }
}
