//! Firestore REST client.
//!
//! Values travel in Firestore's typed JSON encoding
//! (`{"stringValue": "..."}`, `{"integerValue": "42"}`, ...). Every write
//! goes through `documents:commit` so that [`FieldValue::ServerTimestamp`]
//! fields can be sent as `REQUEST_TIME` transforms.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use golibre_core::DocumentId;

use super::{FirebaseAuth, error_details};
use crate::backend::{Document, FieldValue, Fields, ProfileStore, StoreError};
use crate::config::FirebaseConfig;

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Profile store backed by Firestore, acting as the session's principal.
pub struct FirestoreClient {
    client: reqwest::Client,
    auth: Arc<FirebaseAuth>,
    database: String,
}

/// Precondition and mask flavour of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Replace the whole document.
    Replace,
    /// Touch only the given fields, creating the document if needed.
    Merge,
    /// Touch only the given fields of an existing document.
    Update,
    /// Create a document that must not exist yet.
    Create,
}

impl FirestoreClient {
    /// Create a client for the configured project's default database.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &FirebaseConfig, auth: Arc<FirebaseAuth>) -> Self {
        Self {
            client,
            auth,
            database: format!("projects/{}/databases/(default)", config.project_id),
        }
    }

    /// Full resource name of a document.
    fn document_name(&self, collection: &str, id: &DocumentId) -> Result<String, StoreError> {
        let path = document_path(collection, id)?;
        Ok(format!("{}/documents/{path}", self.database))
    }

    /// REST URL of a document, each path segment percent-encoded.
    fn document_url(&self, collection: &str, id: &DocumentId) -> Result<String, StoreError> {
        let path = document_path(collection, id)?;
        let encoded: Vec<_> = path.split('/').map(urlencoding::encode).collect();
        Ok(format!(
            "{FIRESTORE_URL}/{}/documents/{}",
            self.database,
            encoded.join("/")
        ))
    }

    /// Start a request carrying the principal's ID token, if any.
    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth.id_token().await {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn commit(&self, write: Value) -> Result<(), StoreError> {
        let url = format!("{FIRESTORE_URL}/{}/documents:commit", self.database);
        let response = self
            .request(Method::POST, &url)
            .await
            .json(&json!({ "writes": [write] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(map_store_error(status, &body));
        }
        Ok(())
    }

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let name = self.document_name(collection, id)?;
        self.commit(build_write(&name, fields, mode)).await
    }
}

#[async_trait]
impl ProfileStore for FirestoreClient {
    #[instrument(skip(self))]
    async fn get_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::GET, &url).await.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("document not found");
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_store_error(status, &body));
        }

        let raw: Value =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_document(&raw).map(Some)
    }

    #[instrument(skip(self, fields))]
    async fn set_document(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mode = if merge {
            WriteMode::Merge
        } else {
            WriteMode::Replace
        };
        self.write(collection, id, fields, mode).await
    }

    #[instrument(skip(self, fields))]
    async fn update_fields(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.write(collection, id, fields, WriteMode::Update).await
    }

    #[instrument(skip(self, fields))]
    async fn add_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, StoreError> {
        let id = DocumentId::new(uuid::Uuid::new_v4().simple().to_string());
        self.write(collection, &id, fields, WriteMode::Create).await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn list_documents(
        &self,
        collection: &str,
        order_by: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let (parent, collection_id) = split_collection(collection);
        let url = match parent {
            Some(parent) => format!("{FIRESTORE_URL}/{}/documents/{parent}:runQuery", self.database),
            None => format!("{FIRESTORE_URL}/{}/documents:runQuery", self.database),
        };
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection_id }],
                "orderBy": [{
                    "field": { "fieldPath": order_by },
                    "direction": "DESCENDING",
                }],
            }
        });

        let response = self
            .request(Method::POST, &url)
            .await
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(map_store_error(status, &body));
        }

        let rows: Vec<Value> =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect()
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let url = self.document_url(collection, id)?;
        let response = self.request(Method::DELETE, &url).await.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(map_store_error(status, &body));
        }
        Ok(())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Build one `documents:commit` write.
fn build_write(name: &str, fields: Fields, mode: WriteMode) -> Value {
    let mut encoded = Map::new();
    let mut transforms = Vec::new();
    let mut mask = Vec::new();

    for (key, value) in fields {
        if value == FieldValue::ServerTimestamp {
            transforms.push(json!({ "fieldPath": key, "setToServerValue": "REQUEST_TIME" }));
        } else {
            encoded.insert(key.clone(), encode_value(&value));
            mask.push(key);
        }
    }

    let mut write = Map::new();
    write.insert(
        "update".to_string(),
        json!({ "name": name, "fields": encoded }),
    );
    if matches!(mode, WriteMode::Merge | WriteMode::Update) {
        write.insert("updateMask".to_string(), json!({ "fieldPaths": mask }));
    }
    if !transforms.is_empty() {
        write.insert("updateTransforms".to_string(), Value::Array(transforms));
    }
    match mode {
        WriteMode::Update => {
            write.insert("currentDocument".to_string(), json!({ "exists": true }));
        }
        WriteMode::Create => {
            write.insert("currentDocument".to_string(), json!({ "exists": false }));
        }
        WriteMode::Replace | WriteMode::Merge => {}
    }
    Value::Object(write)
}

/// Encode a value in Firestore's typed JSON form.
///
/// Server timestamps are only honoured at the top level of a write; a
/// nested sentinel is stored as null.
fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null | FieldValue::ServerTimestamp => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        FieldValue::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(fields) => {
            let fields: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a Firestore document resource.
fn decode_document(raw: &Value) -> Result<Document, StoreError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("document without name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name);

    let fields = match raw.get("fields").and_then(Value::as_object) {
        Some(map) => decode_fields(map)?,
        None => Fields::new(),
    };

    Ok(Document {
        id: DocumentId::new(id),
        fields,
    })
}

fn decode_fields(map: &Map<String, Value>) -> Result<Fields, StoreError> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Decode a typed Firestore value.
fn decode_value(raw: &Value) -> Result<FieldValue, StoreError> {
    let Some((kind, inner)) = raw.as_object().and_then(|o| o.iter().next()) else {
        return Err(StoreError::Decode(format!("untyped value: {raw}")));
    };

    let value = match kind.as_str() {
        "nullValue" => FieldValue::Null,
        "booleanValue" => FieldValue::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => {
            let parsed = inner
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| inner.as_i64());
            FieldValue::Integer(
                parsed.ok_or_else(|| StoreError::Decode(format!("bad integer: {inner}")))?,
            )
        }
        "doubleValue" => FieldValue::Double(
            inner
                .as_f64()
                .ok_or_else(|| StoreError::Decode(format!("bad double: {inner}")))?,
        ),
        "timestampValue" => {
            let text = inner.as_str().unwrap_or_default();
            let ts = DateTime::parse_from_rfc3339(text)
                .map_err(|e| StoreError::Decode(format!("bad timestamp {text}: {e}")))?;
            FieldValue::Timestamp(ts.with_timezone(&Utc))
        }
        "stringValue" | "referenceValue" | "bytesValue" => {
            FieldValue::String(inner.as_str().unwrap_or_default().to_owned())
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            FieldValue::Array(values)
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(map) => FieldValue::Map(decode_fields(map)?),
            None => FieldValue::Map(Fields::new()),
        },
        "geoPointValue" => {
            let mut point = Fields::new();
            for axis in ["latitude", "longitude"] {
                if let Some(v) = inner.get(axis).and_then(Value::as_f64) {
                    point.insert(axis.to_string(), FieldValue::Double(v));
                }
            }
            FieldValue::Map(point)
        }
        other => return Err(StoreError::Decode(format!("unsupported value type {other}"))),
    };
    Ok(value)
}

/// Join a collection path and a document id, refusing any segment that
/// could step outside the collection.
fn document_path(collection: &str, id: &DocumentId) -> Result<String, StoreError> {
    let unsafe_segment = |segment: &str| {
        segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\')
    };
    if collection.split('/').any(unsafe_segment) || !id.is_plain_segment() {
        return Err(StoreError::InvalidPath(format!("{collection}/{id}")));
    }
    Ok(format!("{collection}/{id}"))
}

/// Split `restaurants/u1/dishes` into (`Some("restaurants/u1")`, `"dishes"`).
fn split_collection(collection: &str) -> (Option<&str>, &str) {
    match collection.rsplit_once('/') {
        Some((parent, id)) => (Some(parent), id),
        None => (None, collection),
    }
}

fn map_store_error(status: StatusCode, body: &str) -> StoreError {
    let (code, message) = error_details(body);
    match (status, code.as_deref()) {
        (StatusCode::NOT_FOUND, _) | (_, Some("NOT_FOUND")) => StoreError::NotFound(message),
        (StatusCode::CONFLICT, _) | (_, Some("ALREADY_EXISTS")) => StoreError::AlreadyExists(message),
        (StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED, _) => {
            StoreError::PermissionDenied(message)
        }
        _ => StoreError::Backend {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::document::fields;

    const NAME: &str = "projects/golibre/databases/(default)/documents/users/u1";

    #[test]
    fn test_server_timestamps_become_transforms() {
        let write = build_write(
            NAME,
            fields([
                ("role", "driver".into()),
                ("updatedAt", FieldValue::ServerTimestamp),
            ]),
            WriteMode::Update,
        );

        assert_eq!(write["update"]["fields"]["role"]["stringValue"], "driver");
        assert!(write["update"]["fields"].get("updatedAt").is_none());
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["role"]));
        assert_eq!(
            write["updateTransforms"],
            json!([{ "fieldPath": "updatedAt", "setToServerValue": "REQUEST_TIME" }])
        );
        assert_eq!(write["currentDocument"]["exists"], true);
    }

    #[test]
    fn test_write_modes() {
        let replace = build_write(NAME, fields([("a", "x".into())]), WriteMode::Replace);
        assert!(replace.get("updateMask").is_none());
        assert!(replace.get("currentDocument").is_none());

        let merge = build_write(NAME, fields([("a", "x".into())]), WriteMode::Merge);
        assert_eq!(merge["updateMask"]["fieldPaths"], json!(["a"]));
        assert!(merge.get("currentDocument").is_none());

        let create = build_write(NAME, fields([("a", "x".into())]), WriteMode::Create);
        assert_eq!(create["currentDocument"]["exists"], false);
    }

    #[test]
    fn test_encode_values() {
        assert_eq!(encode_value(&FieldValue::Null), json!({ "nullValue": null }));
        assert_eq!(
            encode_value(&FieldValue::Integer(7)),
            json!({ "integerValue": "7" })
        );
        assert_eq!(
            encode_value(&FieldValue::Double(18.47)),
            json!({ "doubleValue": 18.47 })
        );
    }

    #[test]
    fn test_decode_document() {
        let raw = json!({
            "name": "projects/golibre/databases/(default)/documents/restaurants/u1/dishes/d9",
            "fields": {
                "title": { "stringValue": "Mofongo" },
                "price": { "doubleValue": 450.5 },
                "imageUrl": { "nullValue": null },
                "createdAt": { "timestampValue": "2024-05-01T12:00:00.123456Z" },
                "tags": { "arrayValue": { "values": [{ "stringValue": "frito" }] } },
                "stock": { "integerValue": "12" }
            }
        });

        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.id.as_str(), "d9");
        assert_eq!(doc.str("title"), Some("Mofongo"));
        assert_eq!(doc.f64("price"), Some(450.5));
        assert_eq!(doc.fields["imageUrl"], FieldValue::Null);
        assert_eq!(doc.fields["stock"], FieldValue::Integer(12));
        assert!(doc.timestamp("createdAt").is_some());
        assert_eq!(
            doc.fields["tags"],
            FieldValue::Array(vec![FieldValue::String("frito".to_string())])
        );
    }

    #[test]
    fn test_decode_rejects_untyped_value() {
        assert!(decode_value(&json!("bare")).is_err());
        assert!(decode_value(&json!({ "mysteryValue": 1 })).is_err());
    }

    #[test]
    fn test_document_path_stays_inside_collection() {
        assert_eq!(
            document_path("restaurants/u1/dishes", &DocumentId::new("d9")).unwrap(),
            "restaurants/u1/dishes/d9"
        );

        for id in ["../../../users/u1", "..", "a/b", ""] {
            assert!(
                matches!(
                    document_path("restaurants/u1/dishes", &DocumentId::new(id)),
                    Err(StoreError::InvalidPath(_))
                ),
                "{id:?}"
            );
        }
        assert!(document_path("restaurants/../users", &DocumentId::new("u1")).is_err());
        assert!(document_path("restaurants//dishes", &DocumentId::new("d9")).is_err());
    }

    #[test]
    fn test_split_collection() {
        assert_eq!(
            split_collection("restaurants/u1/dishes"),
            (Some("restaurants/u1"), "dishes")
        );
        assert_eq!(split_collection("users"), (None, "users"));
    }

    #[test]
    fn test_map_store_error() {
        assert!(matches!(
            map_store_error(StatusCode::NOT_FOUND, r#"{"error":{"message":"No document to update: x","status":"NOT_FOUND"}}"#),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            map_store_error(StatusCode::FORBIDDEN, r#"{"error":{"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#),
            StoreError::PermissionDenied(_)
        ));
        assert!(matches!(
            map_store_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            StoreError::Backend { status: 503, .. }
        ));
    }
}
