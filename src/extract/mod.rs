//! HTTP extraction client (ambient): a thin paginated fetcher that writes
//! each tenant-service page verbatim to the staging directory, built on
//! `reqwest` wrapped in `reqwest-middleware`'s retry-with-backoff layer.

use std::path::Path;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::errors::Result;

/// A guard against a misbehaving tenant service that never returns an empty
/// page; real catalogs top out at a few dozen pages per table.
const MAX_PAGES: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct Source {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub page_size: u32,
}

pub struct Extractor {
    client: ClientWithMiddleware,
    source: Source,
}

impl Extractor {
    /// Build the retrying HTTP client. `insecure` mirrors the CLI's
    /// `--nossl`/`--unsafe` flags: disables TLS certificate verification,
    /// for local development against self-signed tenant sandboxes only.
    pub fn new(source: Source, insecure: bool) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(Duration::from_secs(30))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, source })
    }

    /// Page through `source_path` until the tenant service returns an empty
    /// `records` array (or `MAX_PAGES` is hit), writing
    /// `<staging_dir>/<table_name>_<page>.json` for each response body and
    /// `<staging_dir>/<table_name>_count.txt` once pagination finishes.
    pub async fn extract_table(
        &self,
        table_name: &str,
        source_path: &str,
        staging_dir: &Path,
    ) -> Result<()> {
        let mut page = 0u32;
        loop {
            let url = format!(
                "{}{}?page={}&page_size={}",
                self.source.base_url.trim_end_matches('/'),
                source_path,
                page,
                self.source.page_size
            );

            let mut request = self.client.get(&url);
            if let Some(token) = &self.source.auth_token {
                request = request.bearer_auth(token);
            }
            let body = request.send().await?.text().await?;

            let page_path = staging_dir.join(format!("{table_name}_{page}.json"));
            tokio::fs::write(&page_path, &body).await?;

            let exhausted = Self::records_array_is_empty(&body);
            page += 1;
            if exhausted || page >= MAX_PAGES {
                break;
            }
        }

        let count_path = staging_dir.join(format!("{table_name}_count.txt"));
        tokio::fs::write(&count_path, page.to_string()).await?;
        tracing::info!(table = table_name, pages = page, "extraction complete");
        Ok(())
    }

    /// A body that isn't even valid JSON is treated as exhausted rather than
    /// retried forever; `PageScanner` will separately reject it as malformed
    /// when the staged page is later scanned.
    fn records_array_is_empty(body: &str) -> bool {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => value
                .get("records")
                .and_then(|r| r.as_array())
                .map(|records| records.is_empty())
                .unwrap_or(true),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_records_array_signals_exhaustion() {
        assert!(Extractor::records_array_is_empty(r#"{"records":[]}"#));
        assert!(!Extractor::records_array_is_empty(
            r#"{"records":[{"id":"a"}]}"#
        ));
        assert!(Extractor::records_array_is_empty("not json"));
    }
}
