//! Image-to-text analysis of rendered charts.
//!
//! The chart PNG is posted to a hosted inference endpoint together with the
//! generation parameters. Whatever goes wrong, the caller gets an
//! [`AnalysisResult`] back instead of an error: a missing analysis never stops
//! a cycle.

use crate::config::VisionConfig;
use crate::error::AnalysisError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub enum AnalysisStatus {
    Success(String),
    Failure(AnalysisError),
    /// The model answered but said nothing worth keeping.
    Skipped(String),
}

/// Outcome of analysing one chart.
#[derive(Debug)]
pub struct AnalysisResult {
    pub chart: PathBuf,
    pub status: AnalysisStatus,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    fn new(chart: &Path, status: AnalysisStatus) -> Self {
        Self {
            chart: chart.to_path_buf(),
            status,
            completed_at: Utc::now(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.status {
            AnalysisStatus::Success(text) => Some(text),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Never fails: errors are reported through [`AnalysisStatus::Failure`].
    async fn analyze(&self, image: &Path) -> AnalysisResult;
}

#[derive(Debug, Serialize)]
struct Parameters {
    max_new_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

/// Client for a Hugging Face style image-to-text endpoint.
#[derive(Debug)]
pub struct VisionAnalyzer {
    api_key: Option<SecretString>,
    model_url: Option<String>,
    max_new_tokens: u32,
    client: reqwest::Client,
}

impl VisionAnalyzer {
    pub fn new(config: &VisionConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: config
                .api_key
                .as_ref()
                .map(|key| SecretString::from(key.expose_secret().to_owned())),
            model_url: config.model_url.clone(),
            max_new_tokens: config.max_new_tokens,
            client,
        })
    }

    async fn request(&self, image: &Path) -> Result<String, AnalysisError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(AnalysisError::MissingCredentials("HUGGINGFACE_API_KEY"))?;
        let url = self
            .model_url
            .as_deref()
            .ok_or(AnalysisError::MissingCredentials("MODEL_URL"))?;

        let bytes = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart.png".to_string());
        let parameters = serde_json::to_string(&Parameters {
            max_new_tokens: self.max_new_tokens,
        })
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

        let form = Form::new()
            .part("image", Part::bytes(bytes).file_name(file_name).mime_str("image/png")?)
            .part("parameters", Part::text(parameters).mime_str("application/json")?);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
        extract_generated_text(body)
    }
}

/// Accepts `{"generated_text": ..}` or `[{"generated_text": ..}, ..]`.
fn extract_generated_text(body: Value) -> Result<String, AnalysisError> {
    let first = match body {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::Malformed("empty result array".into()))?,
        other => other,
    };
    serde_json::from_value::<Generation>(first)
        .map(|g| g.generated_text)
        .map_err(|e| AnalysisError::Malformed(e.to_string()))
}

#[async_trait]
impl Analyzer for VisionAnalyzer {
    async fn analyze(&self, image: &Path) -> AnalysisResult {
        match self.request(image).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(chart = %image.display(), "model returned no text, nothing to save");
                AnalysisResult::new(image, AnalysisStatus::Skipped("empty generation".into()))
            }
            Ok(text) => {
                info!(chart = %image.display(), "chart analysis received");
                info!("{text}");
                AnalysisResult::new(image, AnalysisStatus::Success(text))
            }
            Err(e) => {
                warn!(chart = %image.display(), error = %e, "chart analysis failed");
                AnalysisResult::new(image, AnalysisStatus::Failure(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_text_from_object_and_array() {
        assert_eq!(
            extract_generated_text(json!({"generated_text": "uptrend"})).unwrap(),
            "uptrend"
        );
        assert_eq!(
            extract_generated_text(json!([{"generated_text": "range"}, {"generated_text": "x"}]))
                .unwrap(),
            "range"
        );
    }

    #[test]
    fn missing_field_or_empty_array_is_malformed() {
        assert!(matches!(
            extract_generated_text(json!({"error": "loading"})),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(extract_generated_text(json!([])), Err(AnalysisError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_a_request() {
        let analyzer = VisionAnalyzer::new(&VisionConfig::default()).unwrap();
        let result = analyzer.analyze(Path::new("screenshot_0.png")).await;
        assert!(matches!(
            result.status,
            AnalysisStatus::Failure(AnalysisError::MissingCredentials("HUGGINGFACE_API_KEY"))
        ));
        assert!(result.text().is_none());
    }
}
