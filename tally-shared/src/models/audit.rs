use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Kind of change recorded against an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UpdateOrderStatus,
    EditOrder,
    DeleteOrder,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UpdateOrderStatus => "UPDATE_ORDER_STATUS",
            AuditAction::EditOrder => "EDIT_ORDER",
            AuditAction::DeleteOrder => "DELETE_ORDER",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPDATE_ORDER_STATUS" => Ok(AuditAction::UpdateOrderStatus),
            "EDIT_ORDER" => Ok(AuditAction::EditOrder),
            "DELETE_ORDER" => Ok(AuditAction::DeleteOrder),
            other => Err(format!("unknown audit action: {}", other)),
        }
    }
}

/// Append-only record of a state-changing operation.
///
/// `user_id` is `None` for system-driven changes such as auto-delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_id: String,
    pub previous_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        user_id: Option<Uuid>,
        action: AuditAction,
        target_id: impl Into<String>,
        previous_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action,
            target_id: target_id.into(),
            previous_value,
            new_value,
            created_at: Utc::now(),
        }
    }
}
