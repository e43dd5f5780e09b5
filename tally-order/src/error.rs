use crate::models::OrderStatus;
use tally_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {order_id} is {status}; only DRAFT or PENDING orders can be {operation}")]
    InvalidState {
        order_id: String,
        status: OrderStatus,
        operation: &'static str,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl OrderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        OrderError::Validation(msg.into())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
