//! Per-item results of bulk create/update requests

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RECORD_CREATED: &str = "Record Created Successfully";
pub const RECORD_UPDATED: &str = "Record Updated Successfully";
pub const RECORD_EXISTS: &str = "Record Already Exists";
pub const RECORD_NOT_FOUND: &str = "Record Not Found";
pub const RECORD_POSTED: &str = "Record Already Posted";
pub const DATA_KEPT: &str = "Data is Kept";
pub const KEPT_DATA_UPDATED: &str = "Kept Data is Updated Successfully";
pub const SOME_DATA_FAILED: &str = "Some data failed to create";

/// Identifier of a stored record; tickets use uuids, farm records integers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Uuid(Uuid),
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        RecordId::Uuid(id)
    }
}

/// Client-side reference echoed back in every item result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RefId {
    Int(i64),
    Text(String),
}

impl RefId {
    /// Read `ref_id` from a raw payload item
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value.get("ref_id")? {
            serde_json::Value::Number(n) => n.as_i64().map(RefId::Int),
            serde_json::Value::String(s) => Some(RefId::Text(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefId::Int(n) => write!(f, "{}", n),
            RefId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemResult {
    pub id: Option<RecordId>,
    pub name: Option<String>,
    pub ref_id: Option<RefId>,
    pub status: ItemStatus,
    pub message: String,
}

impl ItemResult {
    pub fn success(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        ref_id: Option<RefId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ref_id,
            status: ItemStatus::Success,
            message: message.into(),
        }
    }

    pub fn failed(
        id: Option<RecordId>,
        name: Option<String>,
        ref_id: Option<RefId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name,
            ref_id,
            status: ItemStatus::Failed,
            message: message.into(),
        }
    }
}

/// Collects item results and derives the batch status code.
///
/// 201 when every item succeeded, 400 when none did and 206 for anything in
/// between. Duplicates, raised errors and schema failures all count as failed.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    succeeded: Vec<ItemResult>,
    failed: Vec<ItemResult>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&mut self, item: ItemResult) {
        self.succeeded.push(item);
    }

    /// A rejection decided by the item loop itself
    pub fn push_rejected(&mut self, item: ItemResult) {
        self.failed.push(item);
    }

    /// An error raised while processing the item; its savepoint was rolled back
    pub fn push_error(&mut self, item: ItemResult) {
        self.failed.push(item);
    }

    /// An item removed before processing because its payload failed the schema
    pub fn push_schema_failure(&mut self, item: ItemResult) {
        self.failed.push(item);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed(&self) -> usize {
        self.failed.len()
    }

    pub fn status(&self) -> u16 {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (true, _) => 400,
            (false, true) => 201,
            (false, false) => 206,
        }
    }

    pub fn message(&self) -> &'static str {
        match self.status() {
            201 => "Data Created Successfully",
            206 => SOME_DATA_FAILED,
            _ => "Failed to create data",
        }
    }

    /// Successes first, then failures, each in arrival order
    pub fn into_items(self) -> Vec<ItemResult> {
        let mut items = self.succeeded;
        items.extend(self.failed);
        items
    }
}

pub fn duplicate_scale_message(name: &str, id: impl std::fmt::Display) -> String {
    format!("A scale with the name '{}' already exists (ID: {}).", name, id)
}

pub fn duplicate_kept_message(name: &str, id: impl std::fmt::Display) -> String {
    format!("Record with the name '{}' already exists (ID: {}).", name, id)
}

pub fn duplicate_partner_message(phone: &str, id: impl std::fmt::Display) -> String {
    format!("A partner with the phone '{}' already exists (ID: {}).", phone, id)
}

pub fn duplicate_weighbridge_message(code: &str, id: impl std::fmt::Display) -> String {
    format!("A weighbridge with the code '{}' already exists (ID: {}).", code, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(n: i64) -> ItemResult {
        ItemResult::success(n, format!("R{}", n), Some(RefId::Int(n)), RECORD_CREATED)
    }

    fn bad(message: &str) -> ItemResult {
        ItemResult::failed(None, Some("X".into()), Some(RefId::Text("x".into())), message)
    }

    #[test]
    fn all_success_is_created() {
        let mut batch = BatchOutcome::new();
        batch.push_success(ok(1));
        batch.push_success(ok(2));
        assert_eq!(batch.status(), 201);
    }

    #[test]
    fn raised_item_makes_partial() {
        let mut batch = BatchOutcome::new();
        batch.push_success(ok(1));
        batch.push_error(bad("boom"));
        assert_eq!(batch.status(), 206);
        assert_eq!(batch.message(), SOME_DATA_FAILED);
    }

    #[test]
    fn duplicate_next_to_success_is_partial() {
        let mut batch = BatchOutcome::new();
        batch.push_success(ok(1));
        batch.push_rejected(bad(RECORD_EXISTS));
        assert_eq!(batch.status(), 206);
        assert_eq!(batch.message(), SOME_DATA_FAILED);
    }

    #[test]
    fn nothing_succeeded_is_bad_request() {
        let mut batch = BatchOutcome::new();
        batch.push_error(bad("boom"));
        assert_eq!(batch.status(), 400);
        assert_eq!(BatchOutcome::new().status(), 400);
    }

    #[test]
    fn all_schema_failures_is_bad_request() {
        let mut batch = BatchOutcome::new();
        batch.push_schema_failure(bad("Required Fields Not Found: name"));
        batch.push_schema_failure(bad("Required Fields Not Found: ref_id"));
        assert_eq!(batch.status(), 400);
        assert_eq!(batch.message(), "Failed to create data");
    }

    #[test]
    fn schema_failure_next_to_success_is_partial() {
        let mut batch = BatchOutcome::new();
        batch.push_success(ok(1));
        batch.push_schema_failure(bad("Required Fields Not Found: name"));
        assert_eq!(batch.status(), 206);
        assert_eq!(batch.failed(), 1);
    }

    #[test]
    fn items_list_successes_before_failures() {
        let mut batch = BatchOutcome::new();
        batch.push_error(bad("boom"));
        batch.push_success(ok(7));
        let items = batch.into_items();
        assert_eq!(items[0].status, ItemStatus::Success);
        assert_eq!(items[1].status, ItemStatus::Failed);
    }

    #[test]
    fn item_serializes_with_lowercase_status() {
        let json = serde_json::to_value(ok(3)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["id"], 3);
        assert_eq!(json["ref_id"], 3);
    }

    #[test]
    fn ref_id_accepts_int_or_text() {
        let v = serde_json::json!({"ref_id": "A-1"});
        assert_eq!(RefId::from_json(&v), Some(RefId::Text("A-1".into())));
        let v = serde_json::json!({"ref_id": 9});
        assert_eq!(RefId::from_json(&v), Some(RefId::Int(9)));
        assert_eq!(RefId::from_json(&serde_json::json!({})), None);
    }
}
