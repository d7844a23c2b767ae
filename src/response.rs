use serde::Serialize;
use serde_json::Value;

/// Outcome classification for every public registry and ledger operation.
/// `SchemaMissing` is a NotFound-flavored report of a storage-level failure
/// (typically a missing table) and shares the 404 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    NoContent,
    InvalidInput,
    NotFound,
    Conflict,
    SchemaMissing,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::NoContent => 204,
            Status::InvalidInput => 400,
            Status::NotFound | Status::SchemaMissing => 404,
            Status::Conflict => 409,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Ok | Status::Created | Status::NoContent)
    }
}

/// The uniform `{status, content, message}` envelope. Operations never leak
/// storage errors across this boundary; failures arrive as a status plus the
/// engine message embedded in `message`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: Status,
    pub content: Value,
    pub message: String,
}

impl Reply {
    pub fn new(status: Status, content: Value, message: impl Into<String>) -> Self {
        Reply {
            status,
            content,
            message: message.into(),
        }
    }

    pub fn ok(content: impl Serialize) -> Self {
        Reply::new(Status::Ok, to_content(content), "success")
    }

    pub fn created(content: impl Serialize) -> Self {
        Reply::new(Status::Created, to_content(content), "success")
    }

    pub fn no_content(message: impl Into<String>) -> Self {
        Reply::new(Status::NoContent, Value::Array(vec![]), message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Reply::new(Status::InvalidInput, Value::Array(vec![]), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Reply::new(Status::NotFound, Value::Array(vec![]), message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Reply::new(Status::Conflict, Value::Array(vec![]), message)
    }

    pub fn schema_missing(message: impl Into<String>) -> Self {
        Reply::new(Status::SchemaMissing, Value::Array(vec![]), message)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The `id` field of an object payload, when present.
    pub fn content_id(&self) -> Option<i64> {
        self.content.get("id").and_then(Value::as_i64)
    }
}

fn to_content(content: impl Serialize) -> Value {
    serde_json::to_value(content).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::Created.code(), 201);
        assert_eq!(Status::NoContent.code(), 204);
        assert_eq!(Status::InvalidInput.code(), 400);
        assert_eq!(Status::NotFound.code(), 404);
        assert_eq!(Status::SchemaMissing.code(), 404);
        assert_eq!(Status::Conflict.code(), 409);
    }

    #[test]
    fn test_no_content_is_success() {
        let reply = Reply::no_content("nothing matched");
        assert!(reply.is_success());
        assert_eq!(reply.content, serde_json::json!([]));
        assert_eq!(reply.message, "nothing matched");
    }

    #[test]
    fn test_failure_statuses() {
        assert!(!Reply::invalid("bad").is_success());
        assert!(!Reply::not_found("gone").is_success());
        assert!(!Reply::conflict("dup").is_success());
        assert!(!Reply::schema_missing("no table").is_success());
    }

    #[test]
    fn test_content_id() {
        let reply = Reply::ok(serde_json::json!({"id": 7, "name": "mat"}));
        assert_eq!(reply.content_id(), Some(7));
        assert_eq!(Reply::no_content("x").content_id(), None);
    }
}
