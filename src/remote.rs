//! Remote publishing of the source image to Cloudinary.
//!
//! Publishing is optional and only happens when credentials are configured.
//! The *source* is uploaded once (not the resized variants); Cloudinary then
//! serves any width on demand, so the publisher returns one URL template with
//! a literal [`WIDTH_TOKEN`] where the width belongs:
//!
//! ```text
//! https://res.cloudinary.com/demo/image/upload/v17/dawn.jpg
//!   → https://res.cloudinary.com/demo/image/upload/w_[width]/v17/dawn.jpg
//! ```
//!
//! Credentials are validated before any network call. Upload failures are
//! never swallowed: they abort the whole invocation.
//!
//! The HTTP transport sits behind [`RemoteHost`] so tests can inject a mock.

use crate::imaging::SourceImage;
use crate::process::ProcessEvent;
use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Placeholder substituted for the width in the returned URL template.
pub const WIDTH_TOKEN: &str = "[width]";

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("missing Cloudinary credential: {0}")]
    MissingCredential(&'static str),
    #[error("Cloudinary upload failed: {0}")]
    Upload(String),
}

/// Cloudinary credentials as configured. Every field is required; absence is
/// only detected by [`validate`](Self::validate) so the error can name it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudinaryCredentials {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

/// Credentials with every field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl CloudinaryCredentials {
    /// Check every required field is present and non-empty, in the order
    /// `cloud_name`, `api_key`, `api_secret`.
    pub fn validate(&self) -> Result<ValidCredentials, RemoteError> {
        fn require(value: &Option<String>, field: &'static str) -> Result<String, RemoteError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v.clone()),
                _ => Err(RemoteError::MissingCredential(field)),
            }
        }
        Ok(ValidCredentials {
            cloud_name: require(&self.cloud_name, "cloud_name")?,
            api_key: require(&self.api_key, "api_key")?,
            api_secret: require(&self.api_secret, "api_secret")?,
        })
    }
}

/// One upload: the asset identifier and its bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub public_id: &'a str,
    pub data: &'a [u8],
    pub mime: &'a str,
}

/// A remote asset host that can replace an asset by identifier.
///
/// Implementations must overwrite any prior asset under `public_id` and
/// invalidate downstream caches of it. Returns the asset's public URL.
pub trait RemoteHost: Sync {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<String, RemoteError>;
}

/// Signed uploads to the Cloudinary REST API.
pub struct CloudinaryHost {
    credentials: ValidCredentials,
    client: reqwest::blocking::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl CloudinaryHost {
    pub fn new(credentials: ValidCredentials) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Upload(format!("could not create HTTP client: {}", e)))?;
        Ok(Self {
            credentials,
            client,
            api_base: API_BASE.to_string(),
        })
    }

    /// Point at a different API root (e.g. a local stub server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/image/upload",
            self.api_base.trim_end_matches('/'),
            self.credentials.cloud_name
        )
    }
}

/// Cloudinary request signature: SHA-256 hex over the key-sorted
/// `k=v&k=v` parameters immediately followed by the API secret.
pub fn sign(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RemoteHost for CloudinaryHost {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<String, RemoteError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut signed: BTreeMap<&str, String> = BTreeMap::new();
        signed.insert("invalidate", "true".to_string());
        signed.insert("overwrite", "true".to_string());
        signed.insert("public_id", request.public_id.to_string());
        signed.insert("timestamp", timestamp.to_string());
        let signature = sign(&signed, &self.credentials.api_secret);

        let mut form: Vec<(&str, String)> = signed.into_iter().collect();
        form.push((
            "file",
            format!(
                "data:{};base64,{}",
                request.mime,
                general_purpose::STANDARD.encode(request.data)
            ),
        ));
        form.push(("api_key", self.credentials.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));

        let url = self.upload_url();
        debug!(%url, public_id = request.public_id, bytes = request.data.len(), "uploading source");
        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| RemoteError::Upload(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::Upload(e.to_string()))?;
        parse_upload_response(status.as_u16(), &body)
    }
}

/// Extract `secure_url` from an upload response, or the API's error message.
fn parse_upload_response(status: u16, body: &str) -> Result<String, RemoteError> {
    let parsed: UploadResponse = serde_json::from_str(body).map_err(|e| {
        RemoteError::Upload(format!("unexpected response (HTTP {}): {}", status, e))
    })?;
    if let Some(error) = parsed.error {
        return Err(RemoteError::Upload(error.message));
    }
    if !(200..300).contains(&status) {
        return Err(RemoteError::Upload(format!("HTTP {}", status)));
    }
    parsed
        .secure_url
        .ok_or_else(|| RemoteError::Upload("response carried no secure_url".into()))
}

/// Rewrite a delivery URL so its size segment is the width token.
///
/// Cloudinary URLs carry transformations right after `/upload/`; URLs without
/// that segment are returned unchanged.
pub fn width_template(secure_url: &str) -> String {
    secure_url.replacen("/upload/", &format!("/upload/w_{}/", WIDTH_TOKEN), 1)
}

/// Upload `source` under its file stem and return the width URL template.
///
/// The outcome is reported on `events`; nothing is printed.
pub fn publish(
    host: &(impl RemoteHost + ?Sized),
    source: &SourceImage,
    mime: &str,
    events: Option<&Sender<ProcessEvent>>,
) -> Result<String, RemoteError> {
    let public_id = source.stem();
    let request = UploadRequest {
        public_id,
        data: source.bytes(),
        mime,
    };
    let result = host.upload(&request).map(|url| width_template(&url));
    if let Some(tx) = events {
        let event = match &result {
            Ok(template) => ProcessEvent::Uploaded {
                public_id: public_id.to_string(),
                url: template.clone(),
            },
            Err(e) => ProcessEvent::UploadFailed {
                public_id: public_id.to_string(),
                message: e.to_string(),
            },
        };
        let _ = tx.send(event);
    }
    result
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;

    /// Mock host that records uploads and returns a canned result.
    pub struct MockHost {
        pub response: Result<String, String>,
        pub uploads: Mutex<Vec<(String, usize, String)>>,
    }

    impl MockHost {
        pub fn succeeding(url: &str) -> Self {
            Self {
                response: Ok(url.to_string()),
                uploads: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                uploads: Mutex::new(Vec::new()),
            }
        }

        pub fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    impl RemoteHost for MockHost {
        fn upload(&self, request: &UploadRequest<'_>) -> Result<String, RemoteError> {
            self.uploads.lock().unwrap().push((
                request.public_id.to_string(),
                request.data.len(),
                request.mime.to_string(),
            ));
            self.response.clone().map_err(RemoteError::Upload)
        }
    }

    fn full_credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: Some("demo".into()),
            api_key: Some("123".into()),
            api_secret: Some("shh".into()),
        }
    }

    #[test]
    fn validate_accepts_complete_credentials() {
        let valid = full_credentials().validate().unwrap();
        assert_eq!(valid.cloud_name, "demo");
        assert_eq!(valid.api_key, "123");
        assert_eq!(valid.api_secret, "shh");
    }

    #[test]
    fn validate_names_each_missing_field() {
        for (field, creds) in [
            (
                "cloud_name",
                CloudinaryCredentials {
                    cloud_name: None,
                    ..full_credentials()
                },
            ),
            (
                "api_key",
                CloudinaryCredentials {
                    api_key: Some("  ".into()),
                    ..full_credentials()
                },
            ),
            (
                "api_secret",
                CloudinaryCredentials {
                    api_secret: None,
                    ..full_credentials()
                },
            ),
        ] {
            match creds.validate() {
                Err(RemoteError::MissingCredential(name)) => assert_eq!(name, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn signature_is_sorted_params_plus_secret() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample".to_string());

        let mut hasher = Sha256::new();
        hasher.update(b"public_id=sample&timestamp=1315060510abcd");
        let expected = format!("{:x}", hasher.finalize());

        assert_eq!(sign(&params, "abcd"), expected);
    }

    #[test]
    fn width_template_inserts_token_after_upload() {
        assert_eq!(
            width_template("https://res.cloudinary.com/demo/image/upload/v17/dawn.jpg"),
            "https://res.cloudinary.com/demo/image/upload/w_[width]/v17/dawn.jpg"
        );
        assert_eq!(width_template("https://cdn.example/a.jpg"), "https://cdn.example/a.jpg");
    }

    #[test]
    fn upload_url_uses_cloud_name() {
        let host = CloudinaryHost::new(full_credentials().validate().unwrap())
            .unwrap()
            .with_api_base("http://localhost:9999/v1_1/");
        assert_eq!(
            host.upload_url(),
            "http://localhost:9999/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn parse_response_success() {
        let body = r#"{"public_id":"dawn","secure_url":"https://x/upload/v1/dawn.jpg"}"#;
        assert_eq!(
            parse_upload_response(200, body).unwrap(),
            "https://x/upload/v1/dawn.jpg"
        );
    }

    #[test]
    fn parse_response_api_error_message() {
        let body = r#"{"error":{"message":"Invalid Signature"}}"#;
        match parse_upload_response(401, body) {
            Err(RemoteError::Upload(msg)) => assert_eq!(msg, "Invalid Signature"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_response_garbage_is_upload_error() {
        assert!(matches!(
            parse_upload_response(502, "<html>bad gateway</html>"),
            Err(RemoteError::Upload(_))
        ));
    }

    #[test]
    fn publish_uploads_source_under_stem_and_reports_event() {
        let host = MockHost::succeeding("https://res.cloudinary.com/demo/image/upload/v1/dawn.jpg");
        let source = SourceImage::new(vec![0; 42], "photos/dawn.jpg");
        let (tx, rx) = mpsc::channel();

        let template = publish(&host, &source, "image/jpeg", Some(&tx)).unwrap();

        assert_eq!(
            template,
            "https://res.cloudinary.com/demo/image/upload/w_[width]/v1/dawn.jpg"
        );
        assert_eq!(
            host.uploads.lock().unwrap()[0],
            ("dawn".to_string(), 42, "image/jpeg".to_string())
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ProcessEvent::Uploaded { public_id, .. } if public_id == "dawn"
        ));
    }

    #[test]
    fn publish_failure_wraps_backend_message() {
        let host = MockHost::failing("quota exceeded");
        let source = SourceImage::new(vec![1], "dawn.jpg");
        let (tx, rx) = mpsc::channel();

        let err = publish(&host, &source, "image/jpeg", Some(&tx)).unwrap_err();

        assert_eq!(err.to_string(), "Cloudinary upload failed: quota exceeded");
        assert!(matches!(
            rx.try_recv().unwrap(),
            ProcessEvent::UploadFailed { .. }
        ));
    }
}
