pub mod models;
pub mod pii;

pub use models::audit::{AuditAction, AuditLogEntry};
pub use pii::Masked;
