//! Wire format of `POST /admin/sync_chunk`, shared by the server and the
//! sync bridge.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vector::PointId;

pub const ACTION_ADD: &str = "add";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncChunkRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PointId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncChunkResponse {
    pub status: String,
    pub id: PointId,
}

impl SyncChunkResponse {
    pub fn upserted(id: PointId) -> Self {
        Self {
            status: "upserted".to_string(),
            id,
        }
    }

    pub fn deleted(id: PointId) -> Self {
        Self {
            status: "deleted".to_string(),
            id,
        }
    }
}

/// A validated sync request.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    Upsert {
        id: PointId,
        text: String,
        keywords: Vec<String>,
    },
    Delete {
        id: PointId,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum SyncValidationError {
    #[error("Invalid action: '{0}'")]
    InvalidAction(String),

    #[error("Field 'id' is required for action '{0}'")]
    MissingId(String),

    #[error("Field 'text' is required for action '{0}'")]
    MissingText(String),
}

impl SyncChunkRequest {
    pub fn upsert(action: &str, id: PointId, text: String, keywords: Vec<String>) -> Self {
        Self {
            action: action.to_string(),
            id: Some(id),
            text: Some(text),
            keywords: Some(keywords),
        }
    }

    pub fn delete(id: PointId) -> Self {
        Self {
            action: ACTION_DELETE.to_string(),
            id: Some(id),
            text: None,
            keywords: None,
        }
    }

    /// `add` and `update` need `id` and non-empty `text`; `delete` needs `id`.
    /// Missing keywords default to an empty list.
    pub fn validate(self) -> Result<SyncCommand, SyncValidationError> {
        match self.action.as_str() {
            ACTION_DELETE => {
                let id = self.id.ok_or_else(|| SyncValidationError::MissingId(self.action.clone()))?;
                Ok(SyncCommand::Delete { id })
            }
            ACTION_ADD | ACTION_UPDATE => {
                let text = self
                    .text
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| SyncValidationError::MissingText(self.action.clone()))?;
                let id = self.id.ok_or_else(|| SyncValidationError::MissingId(self.action.clone()))?;
                Ok(SyncCommand::Upsert {
                    id,
                    text,
                    keywords: self.keywords.unwrap_or_default(),
                })
            }
            _ => Err(SyncValidationError::InvalidAction(self.action)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: serde_json::Value) -> SyncChunkRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_add_validates_to_upsert() {
        let cmd = parse(serde_json::json!({
            "action": "add", "id": 1, "text": "hello world", "keywords": ["hello"]
        }))
        .validate()
        .unwrap();
        assert_eq!(
            cmd,
            SyncCommand::Upsert {
                id: 1,
                text: "hello world".to_string(),
                keywords: vec!["hello".to_string()],
            }
        );
    }

    #[test]
    fn test_update_without_keywords_defaults_empty() {
        let cmd = parse(serde_json::json!({ "action": "update", "id": 4, "text": "t" }))
            .validate()
            .unwrap();
        assert!(matches!(cmd, SyncCommand::Upsert { id: 4, ref keywords, .. } if keywords.is_empty()));
    }

    #[test]
    fn test_validation_failures() {
        assert_eq!(
            parse(serde_json::json!({ "action": "bogus" })).validate(),
            Err(SyncValidationError::InvalidAction("bogus".to_string()))
        );
        assert_eq!(
            parse(serde_json::json!({ "action": "delete" })).validate(),
            Err(SyncValidationError::MissingId("delete".to_string()))
        );
        assert_eq!(
            parse(serde_json::json!({ "action": "add", "id": 3 })).validate(),
            Err(SyncValidationError::MissingText("add".to_string()))
        );
        assert_eq!(
            parse(serde_json::json!({ "action": "add", "id": 3, "text": "" })).validate(),
            Err(SyncValidationError::MissingText("add".to_string()))
        );
        assert_eq!(
            parse(serde_json::json!({ "action": "update", "text": "x" })).validate(),
            Err(SyncValidationError::MissingId("update".to_string()))
        );
    }

    #[test]
    fn test_delete_serializes_without_payload_fields() {
        let body = serde_json::to_value(SyncChunkRequest::delete(9)).unwrap();
        assert_eq!(body, serde_json::json!({ "action": "delete", "id": 9 }));
    }
}
