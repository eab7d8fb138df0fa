//! Gemini API client for long-running video generation
//!
//! Implements the RemoteClient protocol over the `predictLongRunning` REST surface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use super::client::{Artifact, GenerationRequest, Operation, RemoteClient, RemoteError};

/// Gemini API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default video model
pub const DEFAULT_MODEL: &str = "veo-3.0-generate-preview";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Gemini video API client
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Build the request body for `predictLongRunning`
    fn build_request(&self, request: &GenerationRequest) -> Value {
        let mut parameters = json!({ "aspectRatio": request.aspect_ratio });
        if let Some(negative_prompt) = &request.negative_prompt {
            parameters["negativePrompt"] = json!(negative_prompt);
        }
        if let Some(seed) = request.seed {
            parameters["seed"] = json!(seed);
        }
        if let Some(person_generation) = &request.person_generation {
            parameters["personGeneration"] = json!(person_generation);
        }

        json!({
            "instances": [{ "prompt": request.prompt }],
            "parameters": parameters
        })
    }

    /// Turn a non-2xx response into an `Http` error carrying the body
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RemoteError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

/// Parse an operation resource.
///
/// An operation-level `error` is surfaced as `Http { code, message }` so the
/// quota classifier sees the provider status.
pub fn parse_operation(body: &Value, fallback_name: &str) -> Result<Operation, RemoteError> {
    if let Some(error) = body.get("error").filter(|e| e.is_object()) {
        let status = error["code"].as_u64().unwrap_or(0) as u16;
        let mut message = error["message"].as_str().unwrap_or("operation failed").to_string();
        if let Some(code) = error["status"].as_str() {
            message = format!("{} ({})", message, code);
        }
        return Err(RemoteError::Http { status, message });
    }

    let name = body["name"].as_str().unwrap_or(fallback_name).to_string();
    if name.is_empty() {
        return Err(RemoteError::InvalidResponse("operation has no name".to_string()));
    }

    let artifacts = body["response"]["generateVideoResponse"]["generatedSamples"]
        .as_array()
        .map(|samples| {
            samples
                .iter()
                .filter_map(|sample| {
                    let video = &sample["video"];
                    video["uri"].as_str().map(|uri| Artifact {
                        uri: uri.to_string(),
                        mime_type: video["mimeType"].as_str().map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Operation {
        name,
        done: body["done"].as_bool().unwrap_or(false),
        artifacts,
    })
}

#[async_trait]
impl RemoteClient for GeminiClient {
    async fn start(&self, credential: &str, request: &GenerationRequest) -> Result<Operation, RemoteError> {
        let url = self.url(&format!("models/{}:predictLongRunning", self.config.model));
        log::debug!("Starting generation: {}", url);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, credential)
            .json(&self.build_request(request))
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;
        parse_operation(&body, "")
    }

    async fn poll(&self, credential: &str, operation: &Operation) -> Result<Operation, RemoteError> {
        let response = self
            .client
            .get(self.url(&operation.name))
            .header(API_KEY_HEADER, credential)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;
        parse_operation(&body, &operation.name)
    }

    async fn download(&self, credential: &str, artifact: &Artifact, destination: &Path) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(&artifact.uri)
            .header(API_KEY_HEADER, credential)
            .send()
            .await?;
        let response = Self::check(response).await?;
        write_stream(response.bytes_stream(), destination).await?;

        log::debug!("Downloaded {} to {}", artifact.uri, destination.display());
        Ok(())
    }
}

/// Sibling path the download is streamed into before it is renamed into place
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Stream chunks into `destination`.
///
/// Bytes land in a `.part` file first; `destination` only appears once the
/// whole stream was written, and the partial file is removed on failure.
pub async fn write_stream<S, B, E>(stream: S, destination: &Path) -> Result<(), RemoteError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<RemoteError>,
{
    let partial = partial_path(destination);
    let written = async {
        futures::pin_mut!(stream);
        let mut file = tokio::fs::File::create(&partial).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(chunk.map_err(Into::<RemoteError>::into)?.as_ref()).await?;
        }
        file.flush().await?;
        Ok::<(), RemoteError>(())
    }
    .await;

    match written {
        Ok(()) => Ok(tokio::fs::rename(&partial, destination).await?),
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(&partial).await {
                log::debug!("Could not remove {}: {}", partial.display(), remove);
            }
            Err(e)
        }
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
