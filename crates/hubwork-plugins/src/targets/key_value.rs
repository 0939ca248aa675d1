use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http::header::{HeaderValue, LAST_MODIFIED};
use http::StatusCode;
use hubwork_core::{
    decode_config, CanonicalRequest, CanonicalResponse, ExecContext, HttpMethod, HubError,
    HubResult, Target,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Configuration of a `key_value` target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct KeyValueConfig {
    /// Document field holding the key.
    pub id_field: String,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// In-memory JSON document store, one per target instance.
///
/// | Method | Behavior |
/// |--------|----------|
/// | `POST` | create; 201, or 409 when the key exists; a missing key gets a UUID v7 |
/// | `GET` | fetch by `?id=` or trailing path segment (200/404), or list all |
/// | `PUT` | replace an existing document (200/404) |
/// | `DELETE` | remove (204/404) |
///
/// Other methods fail with [`HubError::UnsupportedMethod`].
#[derive(Debug)]
pub struct KeyValueTarget {
    id_field: String,
    documents: DashMap<String, StoredDocument>,
}

impl KeyValueTarget {
    /// Registered type name.
    pub const TYPE: &'static str = "key_value";

    /// Creates an empty store.
    #[must_use]
    pub fn new(config: KeyValueConfig) -> Self {
        Self {
            id_field: config.id_field,
            documents: DashMap::new(),
        }
    }

    /// Factory entry point.
    pub fn from_config(config: &Value) -> HubResult<Self> {
        let config: KeyValueConfig = decode_config(Self::TYPE, config)?;
        if config.id_field.is_empty() {
            return Err(HubError::invalid_plugin_config(Self::TYPE, "idField must not be empty"));
        }
        Ok(Self::new(config))
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn create(&self, request: &CanonicalRequest) -> HubResult<CanonicalResponse> {
        let mut document = match parse_document(request) {
            Ok(document) => document,
            Err(response) => return Ok(response),
        };
        let id = match document.get(&self.id_field).and_then(key_of) {
            Some(id) => id,
            None => {
                let id = Uuid::now_v7().to_string();
                document.insert(self.id_field.clone(), Value::String(id.clone()));
                id
            }
        };

        match self.documents.entry(id) {
            Entry::Occupied(entry) => error_response(
                StatusCode::CONFLICT,
                &format!("document {} already exists", entry.key()),
            ),
            Entry::Vacant(entry) => {
                let now = Utc::now();
                let document = Value::Object(document);
                let response = CanonicalResponse::json(StatusCode::CREATED, &document)?;
                entry.insert(StoredDocument {
                    document,
                    created_at: now,
                    updated_at: now,
                });
                Ok(response)
            }
        }
    }

    fn read(&self, request: &CanonicalRequest) -> HubResult<CanonicalResponse> {
        let Some(id) = request_key(request) else {
            let mut all: Vec<_> = self
                .documents
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().document.clone()))
                .collect();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            let all: Vec<Value> = all.into_iter().map(|(_, document)| document).collect();
            return CanonicalResponse::json(StatusCode::OK, &all);
        };

        match self.documents.get(&id) {
            Some(stored) => {
                let response = CanonicalResponse::json(StatusCode::OK, &stored.document)?;
                Ok(with_last_modified(response, stored.updated_at))
            }
            None => not_found(&id),
        }
    }

    fn replace(&self, request: &CanonicalRequest) -> HubResult<CanonicalResponse> {
        let mut document = match parse_document(request) {
            Ok(document) => document,
            Err(response) => return Ok(response),
        };
        let Some(id) = request_key(request).or_else(|| document.get(&self.id_field).and_then(key_of))
        else {
            return error_response(StatusCode::BAD_REQUEST, "no document key in request");
        };
        document.insert(self.id_field.clone(), Value::String(id.clone()));

        match self.documents.get_mut(&id) {
            Some(mut stored) => {
                stored.document = Value::Object(document);
                stored.updated_at = Utc::now();
                let response = CanonicalResponse::json(StatusCode::OK, &stored.document)?;
                Ok(with_last_modified(response, stored.updated_at))
            }
            None => not_found(&id),
        }
    }

    fn delete(&self, request: &CanonicalRequest) -> HubResult<CanonicalResponse> {
        let Some(id) = request_key(request) else {
            return error_response(StatusCode::BAD_REQUEST, "no document key in request");
        };
        match self.documents.remove(&id) {
            Some((_, stored)) => {
                tracing::debug!(
                    id = %id,
                    created_at = %stored.created_at.to_rfc3339(),
                    "document deleted"
                );
                Ok(CanonicalResponse::new(StatusCode::NO_CONTENT))
            }
            None => not_found(&id),
        }
    }
}

#[async_trait]
impl Target for KeyValueTarget {
    async fn apply(
        &self,
        _ctx: &ExecContext,
        request: &mut CanonicalRequest,
    ) -> HubResult<Option<CanonicalResponse>> {
        let response = match request.method() {
            HttpMethod::Post => self.create(request)?,
            HttpMethod::Get => self.read(request)?,
            HttpMethod::Put => self.replace(request)?,
            HttpMethod::Delete => self.delete(request)?,
            other => return Err(HubError::unsupported_method(other.as_str())),
        };
        Ok(Some(response))
    }
}

impl Default for KeyValueTarget {
    fn default() -> Self {
        Self::new(KeyValueConfig::default())
    }
}

/// Key from `?id=` or the first path segment after `/{api}/{service}`.
fn request_key(request: &CanonicalRequest) -> Option<String> {
    if let Some(id) = request.param("id").filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    request
        .internal_path()
        .trim_matches('/')
        .split('/')
        .nth(2)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
}

fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_document(request: &CanonicalRequest) -> Result<Map<String, Value>, CanonicalResponse> {
    match request.body_json::<Value>() {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(bad_request("document must be a JSON object")),
        Err(e) => Err(bad_request(&format!("invalid JSON document: {e}"))),
    }
}

fn bad_request(message: &str) -> CanonicalResponse {
    CanonicalResponse::new(StatusCode::BAD_REQUEST)
        .with_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )
        .with_body(json!({ "error": message }).to_string())
}

fn error_response(status: StatusCode, message: &str) -> HubResult<CanonicalResponse> {
    CanonicalResponse::json(status, &json!({ "error": message }))
}

fn not_found(id: &str) -> HubResult<CanonicalResponse> {
    error_response(StatusCode::NOT_FOUND, &format!("document {id} not found"))
}

fn with_last_modified(response: CanonicalResponse, at: DateTime<Utc>) -> CanonicalResponse {
    let stamp = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    match HeaderValue::from_str(&stamp) {
        Ok(value) => response.with_header(LAST_MODIFIED, value),
        Err(_) => response,
    }
}
