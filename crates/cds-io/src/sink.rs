use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cds_core::error::CdsError;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Publishes constructed resources: an optional HTTP upsert against a remote endpoint, and/or an
/// NDJSON append. Per-`id` upserts are serialized; NDJSON appends to the same file are serialized
/// independently.
pub struct ResourceSink {
    client: reqwest::Client,
    base_url: Option<String>,
    no_fhir_server: bool,
    retry_count: u32,
    ndjson_root: Option<PathBuf>,
    cancel: CancellationToken,
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Outcome of one sink attempt for a single resource, distinguishing the HTTP and NDJSON legs so
/// callers can assert on each independently — NDJSON writes succeed even when the HTTP leg is
/// disabled or exhausts its retries.
#[derive(Debug, Default)]
pub struct SinkOutcome {
    pub http_sent: bool,
    pub ndjson_written: bool,
}

impl ResourceSink {
    pub fn new(
        base_url: Option<String>,
        no_fhir_server: bool,
        retry_count: u32,
        ndjson_root: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builds with default settings");
        Self {
            client,
            base_url,
            no_fhir_server,
            retry_count,
            ndjson_root,
            cancel,
            id_locks: Mutex::new(HashMap::new()),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(registry: &Mutex<HashMap<String, Arc<Mutex<()>>>>, key: &str) -> Arc<Mutex<()>> {
        let mut guard = registry.lock().await;
        guard.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Publishes one constructed `resource` of the given `resource_type`. Never returns an `Err`
    /// that should abort the pipeline — HTTP failures are reported via the returned outcome and
    /// logged instead of propagated.
    pub async fn publish(&self, resource_type: &str, resource: &Value) -> SinkOutcome {
        let mut outcome = SinkOutcome::default();

        if let Some(base_url) = self.base_url.clone() {
            if !self.no_fhir_server {
                let id = resource.get("id").and_then(Value::as_str).map(str::to_string);
                let lock_key = id.clone().unwrap_or_else(|| format!("{resource_type}:new"));
                let lock = Self::lock_for(&self.id_locks, &lock_key).await;
                let _guard = lock.lock().await;
                outcome.http_sent = self.upsert_with_retry(&base_url, resource_type, id.as_deref(), resource).await;
            }
        }

        if let Some(root) = &self.ndjson_root {
            let lock = Self::lock_for(&self.file_locks, resource_type).await;
            let _guard = lock.lock().await;
            match self.append_ndjson(root, resource_type, resource).await {
                Ok(()) => outcome.ndjson_written = true,
                Err(e) => error!(resource_type, error = %e, "failed to append NDJSON line"),
            }
        }

        outcome
    }

    async fn upsert_with_retry(
        &self,
        base_url: &str,
        resource_type: &str,
        id: Option<&str>,
        resource: &Value,
    ) -> bool {
        let url = match id {
            Some(id) => format!("{base_url}/{resource_type}/{id}"),
            None => format!("{base_url}/{resource_type}"),
        };

        let mut attempts_left = self.retry_count + 1;
        loop {
            if self.cancel.is_cancelled() {
                warn!(url, "resource upsert cancelled before completion");
                return false;
            }

            let result = self.send_once(&url, id.is_some(), resource).await;
            match result {
                Ok(true) => return true,
                Ok(false) => {
                    warn!(url, "resource upsert rejected by server");
                    return false;
                }
                Err(e) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        error!(url, error = %e, "resource upsert exhausted retries");
                        return false;
                    }
                    warn!(url, error = %e, attempts_left, "resource upsert connection failure, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                        _ = self.cancel.cancelled() => {
                            warn!(url, "resource upsert cancelled during retry backoff");
                            return false;
                        }
                    }
                }
            }
        }
    }

    async fn send_once(&self, url: &str, has_id: bool, resource: &Value) -> Result<bool, CdsError> {
        let request = if has_id {
            self.client.put(url)
        } else {
            self.client.post(url)
        };

        let response = request
            .header("Content-Type", "application/fhir+json")
            .json(resource)
            .send()
            .await
            .map_err(|e| CdsError::TransportFailure {
                url: url.to_string(),
                source: e.into(),
            })?;

        let status = response.status();
        Ok(status.as_u16() == 200 || status.as_u16() == 201)
    }

    async fn append_ndjson(&self, root: &PathBuf, resource_type: &str, resource: &Value) -> Result<(), CdsError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| CdsError::Other(anyhow::anyhow!("creating {:?}: {e}", root)))?;
        let path = root.join(format!("{resource_type}.ndjson"));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CdsError::Other(anyhow::anyhow!("opening {:?}: {e}", path)))?;

        let mut line = serde_json::to_string(resource)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("serializing resource: {e}")))?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CdsError::Other(anyhow::anyhow!("writing {:?}: {e}", path)))?;
        info!(resource_type, "appended resource to NDJSON sink");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_put_is_reported_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/Patient/7"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = ResourceSink::new(Some(server.uri()), false, 2, None, CancellationToken::new());
        let resource = json!({"resourceType": "Patient", "id": "7"});
        let outcome = sink.publish("Patient", &resource).await;
        assert!(outcome.http_sent);
        assert!(!outcome.ndjson_written);
    }

    #[tokio::test]
    async fn rejecting_server_does_not_retry_but_still_writes_ndjson() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Patient"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("cds-sink-test-{}", std::process::id()));
        let sink = ResourceSink::new(Some(server.uri()), false, 2, Some(dir.clone()), CancellationToken::new());
        let resource = json!({"resourceType": "Patient", "name": "Jane"});
        let outcome = sink.publish("Patient", &resource).await;
        assert!(!outcome.http_sent);
        assert!(outcome.ndjson_written);

        let contents = tokio::fs::read_to_string(dir.join("Patient.ndjson")).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn connection_failure_retries_exactly_retry_count_times_then_gives_up() {
        // Bind a listener and drop it immediately: the port stays reserved long enough to be
        // distinct from other tests, but nothing accepts connections, so every attempt hits a
        // genuine `TransportFailure` (connection refused) rather than an HTTP-level rejection.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = ResourceSink::new(
            Some(format!("http://{addr}")),
            false,
            2,
            None,
            CancellationToken::new(),
        );
        let resource = json!({"resourceType": "Patient", "name": "Jane"});
        let started = tokio::time::Instant::now();
        let outcome = sink.publish("Patient", &resource).await;
        let elapsed = started.elapsed();

        assert!(!outcome.http_sent);
        // retry_count=2 means 3 attempts total and exactly 2 backoff sleeps in between.
        assert!(elapsed >= RETRY_BACKOFF * 2, "expected at least two backoff sleeps, waited {elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_aborts_an_in_flight_retry_backoff() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let sink = ResourceSink::new(Some(format!("http://{addr}")), false, 5, None, cancel.clone());
        let resource = json!({"resourceType": "Patient", "name": "Jane"});

        let cancel_for_task = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_for_task.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome = sink.publish("Patient", &resource).await;
        let elapsed = started.elapsed();

        assert!(!outcome.http_sent);
        // Cancellation during the first backoff sleep should cut the run well short of all five
        // retries completing (which would take 5 * RETRY_BACKOFF).
        assert!(elapsed < RETRY_BACKOFF * 2, "cancellation should have cut the retry loop short, waited {elapsed:?}");
    }

    #[tokio::test]
    async fn no_fhir_server_skips_http_but_still_appends() {
        let dir = std::env::temp_dir().join(format!("cds-sink-test-nohttp-{}", std::process::id()));
        let sink = ResourceSink::new(
            Some("http://localhost:1".to_string()),
            true,
            0,
            Some(dir.clone()),
            CancellationToken::new(),
        );
        let resource = json!({"resourceType": "Patient", "id": "9"});
        let outcome = sink.publish("Patient", &resource).await;
        assert!(!outcome.http_sent);
        assert!(outcome.ndjson_written);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
