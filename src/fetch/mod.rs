use anyhow::{Context, Result};
use reqwest::Client;

/// Download the full CSV payload from `url`.
///
/// The body is buffered in memory; the caller hashes it before deciding
/// whether to parse. Any transport or HTTP-status failure is returned to the
/// caller, which abandons the tick and waits for the next one.
pub async fn fetch_csv(client: &Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()
        .with_context(|| format!("bad status from {}", url))?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body from {}", url))?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_full_body() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/timeseries.csv")
            .with_body("name,cases\nTown,5\n")
            .expect(1)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/timeseries.csv", server.url());
        let body = fetch_csv(&client, &url).await.unwrap();
        assert_eq!(&body[..], b"name,cases\nTown,5\n");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/timeseries.csv")
            .with_status(503)
            .create_async()
            .await;

        let client = Client::new();
        let url = format!("{}/timeseries.csv", server.url());
        assert!(fetch_csv(&client, &url).await.is_err());
    }
}
