use crate::engine::face::{FaceEncoding, FaceMatchError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Extracts a face embedding from raw image bytes. Extraction runs in a
/// sidecar service; matching math stays in-process (engine::face).
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    async fn encode(&self, image: &[u8]) -> Result<FaceEncoding, FaceMatchError>;
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct EncodeResponse {
    faces: u32,
    encoding: Option<Vec<f64>>,
}

#[derive(Clone)]
pub struct HttpFaceEncoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaceEncoder {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build encoder http client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FaceEncoder for HttpFaceEncoder {
    async fn encode(&self, image: &[u8]) -> Result<FaceEncoding, FaceMatchError> {
        let payload = EncodeRequest {
            image: &STANDARD.encode(image),
        };

        let response = self
            .client
            .post(format!("{}/encode", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| FaceMatchError::Encoder(e.to_string()))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(FaceMatchError::InvalidImage);
        }
        if !response.status().is_success() {
            return Err(FaceMatchError::Encoder(format!(
                "encoder returned {}",
                response.status()
            )));
        }

        let body: EncodeResponse = response
            .json()
            .await
            .map_err(|e| FaceMatchError::Encoder(e.to_string()))?;

        if body.faces == 0 {
            return Err(FaceMatchError::NoFaceDetected);
        }
        let encoding = body
            .encoding
            .ok_or_else(|| FaceMatchError::Encoder("encoder omitted the encoding".into()))?;
        FaceEncoding::new(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::face::ENCODING_DIMS;

    struct StubEncoder;

    #[async_trait]
    impl FaceEncoder for StubEncoder {
        async fn encode(&self, _image: &[u8]) -> Result<FaceEncoding, FaceMatchError> {
            FaceEncoding::new(vec![0.0; ENCODING_DIMS])
        }
    }

    #[actix_web::test]
    async fn encoder_is_usable_as_trait_object() {
        let encoder: Box<dyn FaceEncoder> = Box::new(StubEncoder);
        assert!(encoder.encode(&[1, 2, 3]).await.is_ok());
    }
}
