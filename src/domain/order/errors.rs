use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================
//
// Rejections are permanent: the command handler never retries them.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order already exists")]
    AlreadyCreated,

    #[error("Order is already cancelled")]
    AlreadyCancelled,

    #[error("Order is already confirmed")]
    AlreadyConfirmed,

    #[error("Order must be confirmed before shipping")]
    NotConfirmed,

    #[error("Order must be shipped before delivery")]
    NotShipped,

    #[error("Cannot {command} an order in status {status:?}")]
    InvalidStatusTransition {
        status: OrderStatus,
        command: &'static str,
    },

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Cannot {0} an order that does not exist yet")]
    NotACreationCommand(&'static str),

    #[error("Order history must start with OrderCreated, found {0}")]
    MissingCreation(&'static str),
}
