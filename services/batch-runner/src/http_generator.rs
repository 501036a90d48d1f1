//! HTTP generation backend
//!
//! POSTs each unit's text as JSON to a single endpoint, authenticating with
//! the active credential as a bearer token. A 2xx response body is the
//! artifact and is written to the unit's output path as-is.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use common::Secret;
use generator::{Artifact, GenerateError, Generator, WorkUnit};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blocks;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instruction: Option<&'a str>,
}

pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    instruction: Option<String>,
    /// Where processed source blocks are moved after a successful write
    done_dir: Option<PathBuf>,
}

impl HttpGenerator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            instruction: None,
            done_dir: None,
        }
    }

    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.instruction = instruction;
        self
    }

    pub fn with_done_dir(mut self, done_dir: Option<PathBuf>) -> Self {
        self.done_dir = done_dir;
        self
    }

    async fn request(&self, credential: &Secret<String>, unit: &WorkUnit) -> generator::Result<Artifact> {
        let body = GenerateRequest {
            id: &unit.id,
            text: &unit.content,
            instruction: self.instruction.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Other(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerateError::Other(format!("failed to read response body: {e}")))?;

        if let Some(parent) = unit.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(unit, e))?;
        }
        tokio::fs::write(&unit.output, &bytes)
            .await
            .map_err(|e| write_error(unit, e))?;
        debug!(unit = %unit.id, bytes = bytes.len(), "artifact written");

        self.archive(unit).await;
        Ok(Artifact {
            location: unit.output.clone(),
        })
    }

    /// Move the source block out of the input directory. Failure only warns;
    /// the artifact already exists.
    async fn archive(&self, unit: &WorkUnit) {
        let (Some(source), Some(done_dir)) = (unit.source.clone(), self.done_dir.clone()) else {
            return;
        };
        let moved = tokio::task::spawn_blocking(move || blocks::archive(&source, &done_dir)).await;
        match moved {
            Ok(Ok(target)) => info!(unit = %unit.id, archived = %target.display(), "block archived"),
            Ok(Err(e)) => warn!(unit = %unit.id, error = %e, "artifact created but block could not be archived"),
            Err(e) => warn!(unit = %unit.id, error = %e, "archive task failed"),
        }
    }
}

fn write_error(unit: &WorkUnit, e: std::io::Error) -> GenerateError {
    GenerateError::Other(format!(
        "failed to write {}: {e}",
        unit.output.display()
    ))
}

impl Generator for HttpGenerator {
    fn id(&self) -> &str {
        "http"
    }

    fn generate<'a>(
        &'a self,
        credential: &'a Secret<String>,
        unit: &'a WorkUnit,
    ) -> Pin<Box<dyn Future<Output = generator::Result<Artifact>> + Send + 'a>> {
        Box::pin(self.request(credential, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use generator::Classification;
    use tokio::net::TcpListener;

    /// Mock upstream: `/ok` returns fake audio bytes when authorized,
    /// `/quota` always answers 429, `/boom` answers 500.
    async fn start_upstream() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            let app = axum::Router::new()
                .route(
                    "/ok",
                    post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default();
                        if auth != "Bearer key-good" {
                            return (StatusCode::UNAUTHORIZED, "bad key".to_string());
                        }
                        let instruction = body["instruction"].as_str().unwrap_or("none");
                        (
                            StatusCode::OK,
                            format!("AUDIO[{}|{}]", body["text"].as_str().unwrap_or(""), instruction),
                        )
                    }),
                )
                .route(
                    "/quota",
                    post(|| async {
                        (
                            StatusCode::TOO_MANY_REQUESTS,
                            "429 RESOURCE_EXHAUSTED: quota exceeded for project",
                        )
                    }),
                )
                .route(
                    "/boom",
                    post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "internal error") }),
                );
            axum::serve(listener, app).await.unwrap();
        });

        (url, handle)
    }

    fn key(value: &str) -> Secret<String> {
        Secret::new(value.to_string())
    }

    #[tokio::test]
    async fn success_writes_artifact_and_archives_source() {
        let (url, _server) = start_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("block1.txt");
        std::fs::write(&source, "hello").unwrap();
        let output = dir.path().join("out").join("block1.wav");
        let done = dir.path().join("converted");

        let generator = HttpGenerator::new(reqwest::Client::new(), format!("{url}/ok"))
            .with_instruction(Some("calm".into()))
            .with_done_dir(Some(done.clone()));
        let unit = WorkUnit::new("block1.txt", "hello", &output).with_source(&source);

        let artifact = generator.generate(&key("key-good"), &unit).await.unwrap();
        assert_eq!(artifact.location, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "AUDIO[hello|calm]");
        assert!(!source.exists());
        assert!(done.join("block1.txt").exists());
    }

    #[tokio::test]
    async fn success_without_done_dir_leaves_source() {
        let (url, _server) = start_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("block1.txt");
        std::fs::write(&source, "hi").unwrap();
        let output = dir.path().join("block1.wav");

        let generator = HttpGenerator::new(reqwest::Client::new(), format!("{url}/ok"));
        let unit = WorkUnit::new("block1.txt", "hi", &output).with_source(&source);

        generator.generate(&key("key-good"), &unit).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "AUDIO[hi|none]");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn quota_response_is_classified_as_quota() {
        let (url, _server) = start_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("block1.wav");

        let generator = HttpGenerator::new(reqwest::Client::new(), format!("{url}/quota"));
        let unit = WorkUnit::new("block1.txt", "hello", &output);

        let err = generator.generate(&key("key-good"), &unit).await.unwrap_err();
        assert!(matches!(err, GenerateError::Upstream { status: 429, .. }), "got: {err:?}");
        assert_eq!(generator.classify_error(&err), Classification::QuotaExceeded);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn server_error_and_bad_key_are_not_quota() {
        let (url, _server) = start_upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let unit = WorkUnit::new("block1.txt", "hello", dir.path().join("block1.wav"));

        let boom = HttpGenerator::new(reqwest::Client::new(), format!("{url}/boom"));
        let err = boom.generate(&key("key-good"), &unit).await.unwrap_err();
        assert_eq!(
            err,
            GenerateError::Upstream {
                status: 500,
                body: "internal error".into()
            }
        );
        assert_eq!(boom.classify_error(&err), Classification::NonQuota);

        let ok = HttpGenerator::new(reqwest::Client::new(), format!("{url}/ok"));
        let err = ok.generate(&key("key-wrong"), &unit).await.unwrap_err();
        assert!(matches!(err, GenerateError::Upstream { status: 401, .. }));
        assert_eq!(ok.classify_error(&err), Classification::NonQuota);
    }

    #[tokio::test]
    async fn connection_failure_is_other() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let unit = WorkUnit::new("block1.txt", "hello", dir.path().join("block1.wav"));
        let generator = HttpGenerator::new(reqwest::Client::new(), format!("http://{addr}/ok"));

        let err = generator.generate(&key("key-good"), &unit).await.unwrap_err();
        assert!(matches!(err, GenerateError::Other(_)), "got: {err:?}");
        assert_eq!(generator.classify_error(&err), Classification::NonQuota);
    }
}
