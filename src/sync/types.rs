//! Sync wire types
//!
//! Both directions use the `{ "type": ..., "data": ... }` envelope, but the
//! payloads differ: inbound ops describe intent (partial data, no ids on
//! create), outbound ops carry full server rows for the client to upsert.

use serde::{Deserialize, Serialize};

use crate::db::{NewTask, Task, TaskPatch};

/// A mutation submitted by a client.
///
/// Deserialization is the validation step: an op missing `type` or `data`,
/// or an update/delete without an id, fails the whole batch before
/// ingestion begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientChange {
    Create(NewTask),
    Update(TaskPatch),
    Delete(TargetRef),
}

/// A change the server reports back.
///
/// Collected deltas are always `Update` - clients treat them as upserts.
/// `Create` and `Delete` only appear as ingestion echoes today; the
/// `Delete` variant is also where a tombstone-backed collector would
/// surface deletions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerChange {
    Create(Task),
    Update(Task),
    Delete(TargetRef),
}

/// Reference to an existing task by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: i64,
}

/// One sync exchange from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub changes: Vec<ClientChange>,
    /// Epoch millis of the client's last successful sync
    pub watermark: i64,
}

/// The server's reply: ingestion echo followed by the collected delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub changes: Vec<ServerChange>,
}

/// What to do with an update/delete whose target id does not exist.
///
/// `Skip` reproduces the historical behavior: the op is dropped silently,
/// with no error and no echo entry. `Reject` fails the whole batch so the
/// client can discard a locally-queued op the server never saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTargetPolicy {
    #[default]
    Skip,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_change_wire_shape() {
        let op: ClientChange = serde_json::from_value(json!({
            "type": "create",
            "data": { "title": "Write spec", "quadrant": 1 }
        }))
        .unwrap();

        match op {
            ClientChange::Create(new) => {
                assert_eq!(new.title, "Write spec");
                assert_eq!(new.quadrant, 1);
                assert!(!new.completed);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_create_ignores_client_supplied_id() {
        // Ids are server-assigned; a stray id in the payload is dropped
        let op: ClientChange = serde_json::from_value(json!({
            "type": "create",
            "data": { "id": 42, "title": "Sneaky", "quadrant": 0 }
        }))
        .unwrap();
        assert!(matches!(op, ClientChange::Create(_)));
    }

    #[test]
    fn test_update_requires_id() {
        let result: Result<ClientChange, _> = serde_json::from_value(json!({
            "type": "update",
            "data": { "title": "No id" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_op_missing_type_or_data_is_rejected() {
        let missing_type: Result<ClientChange, _> =
            serde_json::from_value(json!({ "data": { "id": 1 } }));
        assert!(missing_type.is_err());

        let missing_data: Result<ClientChange, _> =
            serde_json::from_value(json!({ "type": "delete" }));
        assert!(missing_data.is_err());
    }

    #[test]
    fn test_update_patch_distinguishes_absent_from_null() {
        let op: ClientChange = serde_json::from_value(json!({
            "type": "update",
            "data": { "id": 7, "description": null, "completed": true }
        }))
        .unwrap();

        match op {
            ClientChange::Update(patch) => {
                assert_eq!(patch.id, 7);
                assert_eq!(patch.fields.description, Some(None));
                assert_eq!(patch.fields.completed, Some(true));
                assert!(patch.fields.title.is_none());
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_server_change_serializes_with_envelope() {
        let delete = ServerChange::Delete(TargetRef { id: 3 });
        let value = serde_json::to_value(&delete).unwrap();
        assert_eq!(value, json!({ "type": "delete", "data": { "id": 3 } }));
    }

    #[test]
    fn test_sync_request_shape() {
        let req: SyncRequest = serde_json::from_value(json!({
            "changes": [
                { "type": "delete", "data": { "id": 9 } }
            ],
            "watermark": 1000
        }))
        .unwrap();
        assert_eq!(req.watermark, 1000);
        assert_eq!(req.changes.len(), 1);
    }
}
