//! Schema inference from a reassembled request/response pair
//!
//! [`HttpJsonInference`] learns only successful JSON exchanges: a `200`
//! response whose content type names `application/json`. Everything else is
//! skipped without error.

use log::debug;
use serde_json::{Map, Value};

use super::http::{parse_request, parse_response};
use super::inventory::ApiSchema;
use super::pii::{PiiDetector, SentinelPiiDetector};
use crate::domain::InferenceError;

/// Template emitted for bodies that are not JSON objects
const EMPTY_TEMPLATE: &str = "{}";

/// Turns the byte streams of one completed connection into a schema entry.
///
/// `inbound` is what the traced process read, `outbound` what it wrote.
/// Implementations must be pure: the same input always yields the same output.
pub trait SchemaInference: Send + Sync {
    /// # Errors
    /// Returns an error if either stream cannot be parsed as HTTP
    fn infer(&self, inbound: &[u8], outbound: &[u8]) -> Result<Option<ApiSchema>, InferenceError>;
}

/// HTTP/1.x + JSON inference for server-side sockets
pub struct HttpJsonInference {
    pii: Box<dyn PiiDetector>,
}

impl HttpJsonInference {
    #[must_use]
    pub fn new(pii: Box<dyn PiiDetector>) -> Self {
        Self { pii }
    }
}

impl Default for HttpJsonInference {
    fn default() -> Self {
        Self::new(Box::new(SentinelPiiDetector::default()))
    }
}

impl SchemaInference for HttpJsonInference {
    fn infer(
        &self,
        inbound: &[u8],
        outbound: &[u8],
    ) -> Result<Option<ApiSchema>, InferenceError> {
        let request = parse_request(inbound)?;
        let response = parse_response(outbound)?;

        if response.status != 200 {
            debug!(
                "{} {}: status {}, not learned",
                request.method, request.target, response.status
            );
            return Ok(None);
        }
        if !response.is_json() {
            debug!(
                "{} {}: content type {:?}, not learned",
                request.method, request.target, response.content_type
            );
            return Ok(None);
        }

        let response_text = String::from_utf8_lossy(&response.body);
        let contains_pii = self.pii.contains_pii(&response_text);

        Ok(Some(ApiSchema {
            method: request.method,
            path: request.target,
            request_schema: strip_values(&request.body),
            response_schema: strip_values(&response.body),
            contains_pii,
        }))
    }
}

/// Replace every top-level value of a JSON object with `""`.
///
/// Bodies that do not decode to an object yield `{}`.
#[must_use]
pub fn strip_values(body: &[u8]) -> String {
    let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) else {
        return EMPTY_TEMPLATE.to_string();
    };

    let template: Map<String, Value> = object
        .into_iter()
        .map(|(key, _)| (key, Value::String(String::new())))
        .collect();

    serde_json::to_string(&Value::Object(template))
        .unwrap_or_else(|_| EMPTY_TEMPLATE.to_string())
}
