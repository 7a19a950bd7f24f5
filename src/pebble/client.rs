//! Minimal client of the Pebble REST API, spoken over the container's unix socket.

use std::path::Path;
use std::path::PathBuf;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::header::HOST;
use http::Method;
use http::Request;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::net::UnixStream;

use crate::error::Error;
use crate::error::Result;

const BOUNDARY: &str = "omec-charms-pebble-push";

/// The envelope of every Pebble response.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    type_: String,
    #[serde(rename = "status-code")]
    status_code: u16,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    change: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceInfo {
    name: String,
    current: String,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    err: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileResult {
    path: String,
    #[serde(default)]
    error: Option<Value>,
}

/// Client bound to the Pebble socket of one container.
#[derive(Debug, Clone)]
pub struct PebbleClient {
    container: String,
    socket: PathBuf,
}

impl PebbleClient {
    pub fn new(container: impl Into<String>, socket: impl AsRef<Path>) -> Self {
        PebbleClient {
            container: container.into(),
            socket: socket.as_ref().to_path_buf(),
        }
    }

    /// Sends one request on a fresh connection and unwraps the response envelope.
    async fn request(&self, method: Method, path: &str, content_type: &str, body: Vec<u8>) -> Result<Envelope> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|source| Error::WorkloadUnavailable {
                container: self.container.clone(),
                source,
            })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        let container = self.container.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::debug!(container = container.as_str(); "Pebble connection closed: {e}");
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from(body)))?;
        let response = sender.send_request(request).await?;
        let raw = response.into_body().collect().await?.to_bytes();

        parse_envelope(&raw)
    }

    async fn get(&self, path: &str) -> Result<Envelope> {
        self.request(Method::GET, path, "application/json", Vec::new()).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Envelope> {
        self.request(Method::POST, path, "application/json", serde_json::to_vec(body)?)
            .await
    }

    /// Adds (or with `combine` merges) a layer under `label`.
    pub async fn add_layer(&self, label: &str, layer_yaml: &str, combine: bool) -> Result<()> {
        let body = json!({
            "action": "add",
            "label": label,
            "combine": combine,
            "format": "yaml",
            "layer": layer_yaml,
        });
        self.post("/v1/layers", &body).await?;
        Ok(())
    }

    /// Whether `service` is known and currently active.
    pub async fn is_running(&self, service: &str) -> Result<bool> {
        let envelope = self.get(&format!("/v1/services?names={service}")).await?;
        let services: Vec<ServiceInfo> = serde_json::from_value(envelope.result)?;
        Ok(services
            .iter()
            .any(|info| info.name == service && info.current == "active"))
    }

    /// Runs a service action (`start`, `autostart`) and waits for the resulting change.
    pub async fn service_action(&self, action: &str, services: &[String]) -> Result<()> {
        let body = json!({ "action": action, "services": services });
        let envelope = self.post("/v1/services", &body).await?;
        match envelope.change {
            Some(change) => self.wait_change(&change).await,
            None => Ok(()),
        }
    }

    async fn wait_change(&self, id: &str) -> Result<()> {
        let envelope = self.get(&format!("/v1/changes/{id}/wait")).await?;
        let change: Change = serde_json::from_value(envelope.result)?;
        match change.err {
            Some(err) => Err(Error::Pebble {
                code: envelope.status_code,
                message: format!("change {id} failed: {err}"),
            }),
            None if !change.ready => Err(Error::Pebble {
                code: envelope.status_code,
                message: format!("change {id} is not ready"),
            }),
            None => Ok(()),
        }
    }

    /// Writes `data` to `path`, creating parent directories.
    pub async fn push(&self, path: &str, data: Vec<u8>, permissions: u32) -> Result<()> {
        let metadata = json!({
            "action": "write",
            "files": [{
                "path": path,
                "make-dirs": true,
                "permissions": format!("{permissions:03o}"),
            }],
        });
        let body = multipart_body(&serde_json::to_vec(&metadata)?, path, &data);
        let envelope = self
            .request(
                Method::POST,
                "/v1/files",
                &format!("multipart/form-data; boundary={BOUNDARY}"),
                body,
            )
            .await?;

        let results: Vec<FileResult> = serde_json::from_value(envelope.result)?;
        match results.into_iter().find(|result| result.error.is_some()) {
            Some(failed) => Err(Error::Pebble {
                code: envelope.status_code,
                message: format!("cannot write {}: {}", failed.path, failed.error.unwrap_or_default()),
            }),
            None => Ok(()),
        }
    }
}

fn parse_envelope(raw: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(raw)?;
    if envelope.type_ == "error" || envelope.status_code >= 400 {
        let message = envelope
            .result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();
        return Err(Error::Pebble {
            code: envelope.status_code,
            message,
        });
    }
    Ok(envelope)
}

fn multipart_body(metadata: &[u8], path: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 512);
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"request\"\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
    body.extend_from_slice(format!("Content-Disposition: form-data; name=\"files\"; filename=\"{path}\"\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_becomes_pebble_error() {
        // Given: Pebble rejecting a layer
        let raw = br#"{"type":"error","status-code":400,"status":"Bad Request","result":{"message":"layer \"mme\" already exists"}}"#;

        // Then: Code and message are kept
        match parse_envelope(raw) {
            Err(Error::Pebble { code, message }) => {
                assert_eq!(code, 400);
                assert_eq!(message, "layer \"mme\" already exists");
            }
            other => panic!("Expected Pebble error, got {other:?}"),
        }
    }

    #[test]
    fn test_async_envelope_carries_change_id() {
        let raw = br#"{"type":"async","status-code":202,"status":"Accepted","change":"42","result":null}"#;

        let envelope = parse_envelope(raw).unwrap();

        assert_eq!(envelope.change.as_deref(), Some("42"));
    }

    #[test]
    fn test_multipart_body_has_request_and_file_parts() {
        // Given: A file push
        let body = multipart_body(br#"{"action":"write"}"#, "/opt/dp/scripts/run.sh", b"#!/bin/bash\n");
        let body = String::from_utf8(body).unwrap();

        // Then: Both parts are delimited by the boundary and the body is terminated
        assert!(body.starts_with(&format!("--{BOUNDARY}\r\n")));
        assert!(body.contains("name=\"request\"\r\n\r\n{\"action\":\"write\"}\r\n"));
        assert!(body.contains("filename=\"/opt/dp/scripts/run.sh\"\r\n\r\n#!/bin/bash\n\r\n"));
        assert!(body.ends_with(&format!("--{BOUNDARY}--\r\n")));
    }

    #[tokio::test]
    async fn test_missing_socket_is_workload_unavailable() {
        // Given: A container whose Pebble socket does not exist yet
        let dir = tempfile::tempdir().unwrap();
        let client = PebbleClient::new("mme", dir.path().join("pebble.socket"));

        // When: Asking for a service
        let result = client.is_running("mme").await;

        // Then: The container is reported unavailable
        match result {
            Err(Error::WorkloadUnavailable { container, .. }) => assert_eq!(container, "mme"),
            other => panic!("Expected WorkloadUnavailable, got {other:?}"),
        }
    }
}
