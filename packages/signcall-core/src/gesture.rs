//! # Gesture Recognition Client
//!
//! Talks to the external sign-language recognition service.
//!
//! A hand is described by 21 landmarks of `(x, y, z)`, flattened into 63
//! features. [`KeyframeSampler`] picks which frames are worth sending and
//! [`GestureClient`] posts them as a multipart form field `features` holding
//! a JSON array. Failures here never touch call state; callers log them and
//! keep going.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Landmark features per hand: 21 points × (x, y, z).
pub const FEATURE_COUNT: usize = 63;

/// Squared landmark movement above which a frame becomes a keyframe.
pub const MOVEMENT_THRESHOLD: f32 = 0.01;

/// Minimum spacing between two predictions.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// What the service recognised.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub prediction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for `POST <base>/predict`.
#[derive(Debug, Clone)]
pub struct GestureClient {
    http: reqwest::Client,
    predict_url: String,
}

impl GestureClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        }
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Ask the service to classify one hand pose.
    pub async fn predict(&self, features: &[f32]) -> Result<Prediction> {
        if features.len() != FEATURE_COUNT {
            return Err(Error::InvalidFeatures {
                expected: FEATURE_COUNT,
                actual: features.len(),
            });
        }

        let form = reqwest::multipart::Form::new().text("features", serde_json::to_string(features)?);
        let response = self.http.post(&self.predict_url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            tracing::warn!(%status, "Gesture service refused request: {}", message);
            return Err(Error::GestureService(format!("{}: {}", status, message)));
        }

        let prediction: Prediction = response.json().await?;
        tracing::debug!(
            prediction = ?prediction.prediction,
            confidence = ?prediction.confidence,
            "Gesture predicted"
        );
        Ok(prediction)
    }
}

/// Decides which frames to send for recognition.
///
/// A frame is a keyframe when the summed squared difference of its features
/// against the previous frame exceeds [`MOVEMENT_THRESHOLD`]. The most
/// recent keyframe is released at most once per [`MIN_SEND_INTERVAL`].
#[derive(Debug)]
pub struct KeyframeSampler {
    previous: Option<Vec<f32>>,
    pending: Option<Vec<f32>>,
    last_sent: Option<Instant>,
    threshold: f32,
    interval: Duration,
}

impl Default for KeyframeSampler {
    fn default() -> Self {
        Self::new(MOVEMENT_THRESHOLD, MIN_SEND_INTERVAL)
    }
}

impl KeyframeSampler {
    pub fn new(threshold: f32, interval: Duration) -> Self {
        Self {
            previous: None,
            pending: None,
            last_sent: None,
            threshold,
            interval,
        }
    }

    /// Feed one frame. Returns the features to send now, if any.
    pub fn observe(&mut self, features: &[f32], now: Instant) -> Option<Vec<f32>> {
        if let Some(previous) = &self.previous {
            if movement(previous, features) > self.threshold {
                self.pending = Some(features.to_vec());
            }
        }
        self.previous = Some(features.to_vec());

        let due = self
            .last_sent
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            if let Some(keyframe) = self.pending.take() {
                self.last_sent = Some(now);
                return Some(keyframe);
            }
        }
        None
    }
}

fn movement(previous: &[f32], current: &[f32]) -> f32 {
    previous
        .iter()
        .zip(current)
        .map(|(a, b)| (b - a) * (b - a))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn pose(offset: f32) -> Vec<f32> {
        (0..FEATURE_COUNT).map(|i| i as f32 * 0.001 + offset).collect()
    }

    #[test]
    fn test_first_frame_is_never_a_keyframe() {
        let mut sampler = KeyframeSampler::default();
        assert!(sampler.observe(&pose(0.0), Instant::now()).is_none());
    }

    #[test]
    fn test_still_hand_sends_nothing() {
        let mut sampler = KeyframeSampler::default();
        let start = Instant::now();
        sampler.observe(&pose(0.0), start);
        // 63 * 0.0001^2 is far below the threshold
        assert!(sampler.observe(&pose(0.0001), start + Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_movement_sends_keyframe_then_rate_limits() {
        let mut sampler = KeyframeSampler::default();
        let start = Instant::now();
        sampler.observe(&pose(0.0), start);

        let sent = sampler.observe(&pose(0.1), start + Duration::from_millis(30));
        assert_eq!(sent, Some(pose(0.1)));

        // Moves again within the second: held back.
        assert!(sampler.observe(&pose(0.2), start + Duration::from_millis(60)).is_none());

        // Still hand later releases the held keyframe.
        let sent = sampler.observe(&pose(0.2), start + Duration::from_millis(1100));
        assert_eq!(sent, Some(pose(0.2)));
    }

    #[test]
    fn test_movement_is_sum_of_squares() {
        assert!((movement(&[0.0, 0.0], &[0.1, 0.1]) - 0.02).abs() < 1e-6);
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn fake_predict(mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("features") {
                let text = field.text().await.unwrap();
                let features: Vec<f32> = serde_json::from_str(&text).unwrap();
                if features.len() == FEATURE_COUNT {
                    return (
                        StatusCode::OK,
                        Json(json!({"prediction": "hello", "confidence": 0.93})),
                    );
                }
            }
        }
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing 'features' in form data"})),
        )
    }

    #[tokio::test]
    async fn test_predict_posts_multipart_features() {
        let base = serve(Router::new().route("/predict", post(fake_predict))).await;
        let client = GestureClient::new(&format!("{}/", base));
        assert_eq!(client.predict_url(), format!("{}/predict", base));

        let prediction = client.predict(&pose(0.0)).await.unwrap();
        assert_eq!(prediction.prediction.as_deref(), Some("hello"));
        assert_eq!(prediction.confidence, Some(0.93));
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        async fn broken() -> (StatusCode, Json<Value>) {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Prediction error: model not loaded"})),
            )
        }
        let base = serve(Router::new().route("/predict", post(broken))).await;

        let err = GestureClient::new(&base).predict(&pose(0.0)).await.unwrap_err();
        match err {
            Error::GestureService(message) => assert!(message.contains("model not loaded")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_length_rejected_locally() {
        let client = GestureClient::new("http://127.0.0.1:9");
        let err = client.predict(&[0.0; 10]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFeatures {
                expected: 63,
                actual: 10
            }
        ));
    }
}
