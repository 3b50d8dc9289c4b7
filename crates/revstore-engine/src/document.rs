//! Search projection built from each written payload.

use std::collections::BTreeMap;

use revstore_types::{IndexableDocument, ResourceError, ResourceKey};
use serde_json::Value;

/// Builds the document stored in a revision's metadata row.
pub trait DocumentBuilder: Send + Sync {
    fn build_document(
        &self,
        key: &ResourceKey,
        resource_version: i64,
        value: &[u8],
    ) -> Result<IndexableDocument, ResourceError>;
}

/// Builder for Kubernetes-style JSON objects.
///
/// Extracts `metadata.name`, `metadata.labels` and `spec.title`. The title
/// falls back to the name. Payloads that are not JSON objects are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDocumentBuilder;

impl DocumentBuilder for StandardDocumentBuilder {
    fn build_document(
        &self,
        key: &ResourceKey,
        resource_version: i64,
        value: &[u8],
    ) -> Result<IndexableDocument, ResourceError> {
        let json: Value = serde_json::from_slice(value)
            .map_err(|e| ResourceError::Validation(format!("payload is not JSON: {}", e)))?;
        let Value::Object(obj) = json else {
            return Err(ResourceError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        };

        let mut doc = IndexableDocument::new(key.clone(), resource_version);
        let metadata = obj.get("metadata");

        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(&key.name);
        doc.fields.insert("name".to_string(), name.to_string());

        doc.title = obj
            .get("spec")
            .and_then(|s| s.get("title"))
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();

        if let Some(Value::Object(labels)) = metadata.and_then(|m| m.get("labels")) {
            doc.labels = labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect::<BTreeMap<_, _>>();
        }

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResourceKey {
        ResourceKey::new("default", "dashboard.grafana.app", "dashboards", "home")
    }

    #[test]
    fn test_extracts_fields() {
        let payload = br#"{
            "metadata": {"name": "home", "labels": {"team": "core", "count": 3}},
            "spec": {"title": "Home Dashboard"}
        }"#;
        let doc = StandardDocumentBuilder
            .build_document(&key(), 42, payload)
            .unwrap();

        assert_eq!(doc.key, Some(key()));
        assert_eq!(doc.resource_version, 42);
        assert_eq!(doc.title, "Home Dashboard");
        assert_eq!(doc.labels.len(), 1);
        assert_eq!(doc.labels["team"], "core");
        assert_eq!(doc.fields["name"], "home");
    }

    #[test]
    fn test_title_falls_back_to_name() {
        let doc = StandardDocumentBuilder
            .build_document(&key(), 1, br#"{"metadata": {"name": "renamed"}}"#)
            .unwrap();
        assert_eq!(doc.title, "renamed");

        let doc = StandardDocumentBuilder
            .build_document(&key(), 1, b"{}")
            .unwrap();
        assert_eq!(doc.title, "home");
    }

    #[test]
    fn test_rejects_non_objects() {
        for payload in [&b"not json"[..], b"[1,2]", b"\"text\""] {
            let err = StandardDocumentBuilder
                .build_document(&key(), 1, payload)
                .unwrap_err();
            assert!(matches!(err, ResourceError::Validation(_)));
        }
    }
}
