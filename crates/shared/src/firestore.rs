//! Firestore REST client
//!
//! Minimal client for the Firestore REST v1 API covering the three
//! operations the backend needs: append a document to a collection, patch
//! named fields of an existing document, and fetch a document.
//!
//! Firestore encodes every field as a typed value object
//! (`{"stringValue": "..."}` etc.); the mapping helpers here convert
//! between that representation and plain JSON so callers never see it.

use serde_json::{json, Map, Value};

/// Errors returned by the Firestore client
#[derive(Debug, thiserror::Error)]
pub enum FirestoreError {
    #[error("document not found: {collection}/{document}")]
    NotFound {
        collection: String,
        document: String,
    },

    #[error("firestore request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("firestore API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("unexpected firestore document shape: {0}")]
    Decode(String),
}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Client for a single Firestore database (the project's `(default)` one)
#[derive(Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FirestoreClient {
    pub fn new(base_url: &str, project_id: &str, access_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project_id, collection
        )
    }

    fn document_url(&self, collection: &str, document: &str) -> String {
        format!("{}/{}", self.collection_url(collection), document)
    }

    /// Append a new document with store-assigned ID to a collection
    ///
    /// `fields` is plain JSON; it is converted to Firestore's typed value
    /// representation before the call.
    pub async fn create_document(&self, collection: &str, fields: Value) -> FirestoreResult<()> {
        let body = json!({ "fields": to_firestore_fields(&fields)? });

        let response = self
            .http
            .post(self.collection_url(collection))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        self.check_status(response, collection, "<new>").await?;
        tracing::debug!(collection, "Created firestore document");
        Ok(())
    }

    /// Patch named fields of an existing document
    ///
    /// The update mask restricts the write to exactly `field_paths`, and the
    /// `currentDocument.exists` precondition makes the patch fail with
    /// [`FirestoreError::NotFound`] instead of creating the document.
    pub async fn patch_document(
        &self,
        collection: &str,
        document: &str,
        fields: Value,
        field_paths: &[&str],
    ) -> FirestoreResult<()> {
        let body = json!({ "fields": to_firestore_fields(&fields)? });

        let mut query: Vec<(&str, &str)> = vec![("currentDocument.exists", "true")];
        for path in field_paths {
            query.push(("updateMask.fieldPaths", path));
        }

        let response = self
            .http
            .patch(self.document_url(collection, document))
            .bearer_auth(&self.access_token)
            .query(&query)
            .json(&body)
            .send()
            .await?;

        self.check_status(response, collection, document).await?;
        tracing::debug!(collection, document, "Patched firestore document");
        Ok(())
    }

    /// Fetch a document and return its fields as plain JSON
    pub async fn get_document(&self, collection: &str, document: &str) -> FirestoreResult<Value> {
        let response = self
            .http
            .get(self.document_url(collection, document))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let body = self.check_status(response, collection, document).await?;
        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| FirestoreError::Decode(format!("invalid document JSON: {e}")))?;

        match doc.get("fields") {
            Some(fields) => from_firestore_fields(fields),
            // A document can exist with no fields at all
            None => Ok(Value::Object(Map::new())),
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        collection: &str,
        document: &str,
    ) -> FirestoreResult<String> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FirestoreError::NotFound {
                collection: collection.to_string(),
                document: document.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FirestoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Convert a plain JSON object into Firestore typed `fields`
pub fn to_firestore_fields(fields: &Value) -> FirestoreResult<Value> {
    let object = fields
        .as_object()
        .ok_or_else(|| FirestoreError::Decode("document fields must be a JSON object".into()))?;

    let mut out = Map::new();
    for (key, value) in object {
        out.insert(key.clone(), to_firestore_value(value));
    }
    Ok(Value::Object(out))
}

/// Convert one plain JSON value into a Firestore typed value
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // Firestore carries 64-bit integers as decimal strings
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let mut fields = Map::new();
            for (key, item) in map {
                fields.insert(key.clone(), to_firestore_value(item));
            }
            json!({ "mapValue": { "fields": Value::Object(fields) } })
        }
    }
}

/// Convert Firestore typed `fields` back into a plain JSON object
pub fn from_firestore_fields(fields: &Value) -> FirestoreResult<Value> {
    let object = fields
        .as_object()
        .ok_or_else(|| FirestoreError::Decode("fields must be a JSON object".into()))?;

    let mut out = Map::new();
    for (key, value) in object {
        out.insert(key.clone(), from_firestore_value(value)?);
    }
    Ok(Value::Object(out))
}

/// Convert one Firestore typed value back into plain JSON
pub fn from_firestore_value(value: &Value) -> FirestoreResult<Value> {
    let object = value
        .as_object()
        .ok_or_else(|| FirestoreError::Decode("typed value must be a JSON object".into()))?;

    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| FirestoreError::Decode("typed value is empty".into()))?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "stringValue" | "doubleValue" => inner.clone(),
        // Timestamps come back as RFC 3339 strings; keep them as strings
        "timestampValue" | "referenceValue" => inner.clone(),
        "integerValue" => {
            let raw = inner
                .as_str()
                .ok_or_else(|| FirestoreError::Decode("integerValue must be a string".into()))?;
            let parsed: i64 = raw
                .parse()
                .map_err(|_| FirestoreError::Decode(format!("bad integerValue: {raw}")))?;
            json!(parsed)
        }
        "arrayValue" => {
            let items = inner.get("values").and_then(Value::as_array);
            let mut out = Vec::new();
            if let Some(items) = items {
                for item in items {
                    out.push(from_firestore_value(item)?);
                }
            }
            Value::Array(out)
        }
        "mapValue" => match inner.get("fields") {
            Some(fields) => from_firestore_fields(fields)?,
            None => Value::Object(Map::new()),
        },
        other => {
            return Err(FirestoreError::Decode(format!(
                "unsupported firestore value kind: {other}"
            )))
        }
    };

    Ok(decoded)
}
