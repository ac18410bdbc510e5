use uuid::Uuid;
use super::value_objects::OrderItem;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// CreateOrder is the only creation command; the identity is generated by the
// aggregate root, so it carries none. Every other command targets an order
// that already has committed history.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    CreateOrder {
        customer_id: Uuid,
        items: Vec<OrderItem>,
    },
    /// Replace the basket; only while the order is still open
    UpdateItems {
        items: Vec<OrderItem>,
        reason: Option<String>,
    },
    ConfirmOrder,
    ShipOrder {
        tracking_number: String,
        carrier: String,
    },
    DeliverOrder {
        signature: Option<String>,
    },
    CancelOrder {
        reason: Option<String>,
        cancelled_by: Option<Uuid>,
    },
}

impl OrderCommand {
    /// Stable name for logs and rejection messages
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::CreateOrder { .. } => "create",
            OrderCommand::UpdateItems { .. } => "update items of",
            OrderCommand::ConfirmOrder => "confirm",
            OrderCommand::ShipOrder { .. } => "ship",
            OrderCommand::DeliverOrder { .. } => "deliver",
            OrderCommand::CancelOrder { .. } => "cancel",
        }
    }
}
