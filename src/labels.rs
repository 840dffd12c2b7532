//! Image label detection providers.
//!
//! The label detector is an external collaborator: the core never inspects
//! image bytes itself. Providers are selected by configuration:
//!
//! - **`static`** — returns the fixed label list from config. Development
//!   and test mode; also the fallback when no detector is deployed.
//! - **`remote`** — POSTs the image to a configured HTTP detector and
//!   expects `[{"label": ..., "confidence": ...}]` back.
//! - **`disabled`** — always errors; classification with an inline label
//!   override still works.
//!
//! # Retry Strategy
//!
//! The remote provider retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! Detection happens entirely before classification and outside any
//! database transaction, so provider latency never holds a lock.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LabelProviderConfig;
use crate::error::{Error, Result};
use crate::models::Label;

/// Detect labels for one image using the configured provider.
///
/// Confidences are clamped into [0, 1] and empty label texts dropped at
/// this seam, so the classifier's input contract holds regardless of what
/// the collaborator returns.
pub async fn detect_labels(config: &LabelProviderConfig, image: &[u8]) -> Result<Vec<Label>> {
    let labels = match config.provider.as_str() {
        "static" => config
            .static_labels
            .iter()
            .map(|l| Label::new(l.label.clone(), l.confidence))
            .collect(),
        "remote" => detect_remote(config, image).await?,
        "disabled" => {
            return Err(Error::LabelProvider(
                "label provider is disabled".to_string(),
            ))
        }
        other => {
            return Err(Error::LabelProvider(format!(
                "unknown label provider: {}",
                other
            )))
        }
    };

    Ok(sanitize(labels))
}

fn sanitize(labels: Vec<Label>) -> Vec<Label> {
    labels
        .into_iter()
        .filter(|l| !l.label.trim().is_empty())
        .map(|l| Label {
            confidence: l.confidence.clamp(0.0, 1.0),
            ..l
        })
        .collect()
}

// ============ Remote provider ============

#[derive(Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Deserialize)]
struct DetectedLabel {
    label: String,
    confidence: f64,
}

async fn detect_remote(config: &LabelProviderConfig, image: &[u8]) -> Result<Vec<Label>> {
    let endpoint = config
        .endpoint
        .as_deref()
        .ok_or_else(|| Error::LabelProvider("labels.endpoint is not configured".to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::LabelProvider(e.to_string()))?;

    let body = DetectRequest {
        image: base64::engine::general_purpose::STANDARD.encode(image),
    };

    let mut attempt: u32 = 0;
    loop {
        let response = client.post(endpoint).json(&body).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let detected: Vec<DetectedLabel> = resp
                    .json()
                    .await
                    .map_err(|e| Error::LabelProvider(format!("malformed response: {}", e)))?;
                return Ok(detected
                    .into_iter()
                    .map(|d| Label::new(d.label, d.confidence))
                    .collect());
            }
            Ok(resp) => {
                let status = resp.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || attempt >= config.max_retries {
                    return Err(Error::LabelProvider(format!(
                        "detector returned {}",
                        status
                    )));
                }
            }
            Err(e) => {
                if attempt >= config.max_retries {
                    return Err(Error::LabelProvider(e.to_string()));
                }
            }
        }

        let backoff = Duration::from_secs(1 << attempt.min(5));
        tracing::warn!(attempt, ?backoff, "label detector retry");
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}
