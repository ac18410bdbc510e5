use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventApplier, Snapshottable};
use super::value_objects::{OrderItem, OrderStatus};
use super::events::*;
use super::commands::OrderCommand;
use super::errors::OrderError;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Identity and version are carried by AggregateRoot<OrderAggregate>; this
// type holds only the state derived from events.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub customer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,

    // Optional fields
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub cancelled_reason: Option<String>,
}

impl OrderAggregate {
    /// Validate business rules before emitting events
    fn validate_items(items: &[OrderItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in items {
            if item.quantity <= 0 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
        }

        Ok(())
    }

    pub fn total_quantity(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// ============================================================================
// Event application
// ============================================================================

impl EventApplier for OrderAggregate {
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply_first_event(event: &OrderEvent) -> Result<Self, OrderError> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                customer_id: e.customer_id,
                items: e.items.clone(),
                status: OrderStatus::Created,
                tracking_number: None,
                carrier: None,
                cancelled_reason: None,
            }),
            other => Err(OrderError::MissingCreation(other.event_type())),
        }
    }

    fn apply_event(&mut self, event: &OrderEvent) -> Result<(), OrderError> {
        match event {
            OrderEvent::Created(_) => return Err(OrderError::AlreadyCreated),
            OrderEvent::ItemsUpdated(e) => {
                self.items = e.items.clone();
            }
            OrderEvent::Confirmed(_) => {
                self.status = OrderStatus::Confirmed;
            }
            OrderEvent::Shipped(e) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(e.tracking_number.clone());
                self.carrier = Some(e.carrier.clone());
            }
            OrderEvent::Delivered(_) => {
                self.status = OrderStatus::Delivered;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancelled_reason = e.reason.clone();
            }
        }
        Ok(())
    }
}

impl Snapshottable for OrderAggregate {
    type State = OrderAggregate;

    fn to_snapshot_state(&self) -> OrderAggregate {
        self.clone()
    }

    fn from_snapshot_state(state: OrderAggregate) -> Self {
        state
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Command = OrderCommand;

    const DOMAIN: &'static str = "sales";
    const OBJECT_TYPE: &'static str = "order";
    const SYMBOL: &'static str = "ORD";

    fn handle_creation(command: &OrderCommand) -> Result<OrderEvent, OrderError> {
        match command {
            OrderCommand::CreateOrder { customer_id, items } => {
                Self::validate_items(items)?;

                Ok(OrderEvent::Created(OrderCreated {
                    customer_id: *customer_id,
                    items: items.clone(),
                }))
            }
            other => Err(OrderError::NotACreationCommand(other.name())),
        }
    }

    fn handle_command(&self, command: &OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        match command {
            OrderCommand::CreateOrder { .. } => Err(OrderError::AlreadyCreated),

            OrderCommand::UpdateItems { items, reason } => {
                match self.status {
                    OrderStatus::Created => {}
                    OrderStatus::Cancelled => return Err(OrderError::AlreadyCancelled),
                    status => {
                        return Err(OrderError::InvalidStatusTransition {
                            status,
                            command: command.name(),
                        })
                    }
                }

                Self::validate_items(items)?;

                Ok(vec![OrderEvent::ItemsUpdated(OrderItemsUpdated {
                    items: items.clone(),
                    reason: reason.clone(),
                })])
            }

            OrderCommand::ConfirmOrder => {
                match self.status {
                    OrderStatus::Created => {}
                    OrderStatus::Confirmed => return Err(OrderError::AlreadyConfirmed),
                    status => {
                        return Err(OrderError::InvalidStatusTransition {
                            status,
                            command: command.name(),
                        })
                    }
                }

                Ok(vec![OrderEvent::Confirmed(OrderConfirmed {})])
            }

            OrderCommand::ShipOrder { tracking_number, carrier } => {
                match self.status {
                    OrderStatus::Confirmed => {}
                    OrderStatus::Created => return Err(OrderError::NotConfirmed),
                    status => {
                        return Err(OrderError::InvalidStatusTransition {
                            status,
                            command: command.name(),
                        })
                    }
                }

                Ok(vec![OrderEvent::Shipped(OrderShipped {
                    tracking_number: tracking_number.clone(),
                    carrier: carrier.clone(),
                })])
            }

            OrderCommand::DeliverOrder { signature } => {
                if self.status != OrderStatus::Shipped {
                    return Err(OrderError::NotShipped);
                }

                Ok(vec![OrderEvent::Delivered(OrderDelivered {
                    signature: signature.clone(),
                })])
            }

            OrderCommand::CancelOrder { reason, cancelled_by } => {
                match self.status {
                    OrderStatus::Cancelled => return Err(OrderError::AlreadyCancelled),
                    OrderStatus::Delivered => {
                        return Err(OrderError::InvalidStatusTransition {
                            status: self.status,
                            command: command.name(),
                        })
                    }
                    // Created, Confirmed or Shipped
                    _ => {}
                }

                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    reason: reason.clone(),
                    cancelled_by: *cancelled_by,
                })])
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{AggregateRoot, Clock, Identifiable, SystemClock, Versioned};
    use std::sync::Arc;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    fn items() -> Vec<OrderItem> {
        vec![OrderItem::new(Uuid::new_v4(), 2), OrderItem::new(Uuid::new_v4(), 1)]
    }

    fn created() -> OrderAggregate {
        OrderAggregate::apply_first_event(&OrderEvent::Created(OrderCreated {
            customer_id: Uuid::new_v4(),
            items: items(),
        }))
        .unwrap()
    }

    fn confirmed() -> OrderAggregate {
        let mut order = created();
        order.apply_event(&OrderEvent::Confirmed(OrderConfirmed {})).unwrap();
        order
    }

    #[test]
    fn test_create_order_from_command() {
        let command = OrderCommand::CreateOrder {
            customer_id: Uuid::new_v4(),
            items: items(),
        };

        let root = AggregateRoot::<OrderAggregate>::create_from_command(&command, clock()).unwrap();
        assert!(root.id().as_str().starts_with("sales.order.ORD-"));
        assert!(root.version().is_none());
        assert_eq!(root.state().status, OrderStatus::Created);
        assert_eq!(root.state().total_quantity(), 3);
        assert_eq!(root.pending_changes()[0].event_type, "OrderCreated");
    }

    #[test]
    fn test_create_requires_items() {
        let command = OrderCommand::CreateOrder {
            customer_id: Uuid::new_v4(),
            items: vec![],
        };
        assert!(matches!(
            OrderAggregate::handle_creation(&command),
            Err(OrderError::EmptyItems)
        ));

        let command = OrderCommand::CreateOrder {
            customer_id: Uuid::new_v4(),
            items: vec![OrderItem::new(Uuid::new_v4(), 0)],
        };
        assert!(matches!(
            OrderAggregate::handle_creation(&command),
            Err(OrderError::InvalidQuantity(0))
        ));
    }

    #[test]
    fn test_first_event_must_be_created() {
        let result = OrderAggregate::apply_first_event(&OrderEvent::Confirmed(OrderConfirmed {}));
        assert!(matches!(result, Err(OrderError::MissingCreation("OrderConfirmed"))));
    }

    #[test]
    fn test_only_create_order_creates() {
        assert!(matches!(
            OrderAggregate::handle_creation(&OrderCommand::ConfirmOrder),
            Err(OrderError::NotACreationCommand("confirm"))
        ));
    }

    #[test]
    fn test_cannot_create_twice() {
        let order = created();
        let command = OrderCommand::CreateOrder {
            customer_id: Uuid::new_v4(),
            items: items(),
        };
        assert!(matches!(order.handle_command(&command), Err(OrderError::AlreadyCreated)));
    }

    #[test]
    fn test_confirm_order() {
        let order = created();
        let events = order.handle_command(&OrderCommand::ConfirmOrder).unwrap();
        assert_eq!(events, vec![OrderEvent::Confirmed(OrderConfirmed {})]);

        assert!(matches!(
            confirmed().handle_command(&OrderCommand::ConfirmOrder),
            Err(OrderError::AlreadyConfirmed)
        ));
    }

    #[test]
    fn test_cannot_ship_unconfirmed_order() {
        let command = OrderCommand::ShipOrder {
            tracking_number: "TRACK123".to_string(),
            carrier: "UPS".to_string(),
        };
        assert!(matches!(created().handle_command(&command), Err(OrderError::NotConfirmed)));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut order = confirmed();

        let shipped = order
            .handle_command(&OrderCommand::ShipOrder {
                tracking_number: "TRACK123".to_string(),
                carrier: "UPS".to_string(),
            })
            .unwrap();
        order.apply_event(&shipped[0]).unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.tracking_number.as_deref(), Some("TRACK123"));

        let delivered = order
            .handle_command(&OrderCommand::DeliverOrder {
                signature: Some("J. Doe".to_string()),
            })
            .unwrap();
        order.apply_event(&delivered[0]).unwrap();
        assert!(order.status.is_terminal());

        let cancel = OrderCommand::CancelOrder {
            reason: None,
            cancelled_by: None,
        };
        assert!(matches!(
            order.handle_command(&cancel),
            Err(OrderError::InvalidStatusTransition {
                status: OrderStatus::Delivered,
                command: "cancel"
            })
        ));
    }

    #[test]
    fn test_cannot_update_items_after_confirmation() {
        let command = OrderCommand::UpdateItems {
            items: items(),
            reason: None,
        };
        assert!(matches!(
            confirmed().handle_command(&command),
            Err(OrderError::InvalidStatusTransition {
                status: OrderStatus::Confirmed,
                ..
            })
        ));
    }

    #[test]
    fn test_cancelled_order_rejects_cancellation() {
        let mut order = created();
        order
            .apply_event(&OrderEvent::Cancelled(OrderCancelled {
                reason: Some("changed mind".to_string()),
                cancelled_by: None,
            }))
            .unwrap();

        assert_eq!(order.cancelled_reason.as_deref(), Some("changed mind"));
        let cancel = OrderCommand::CancelOrder {
            reason: None,
            cancelled_by: None,
        };
        assert!(matches!(order.handle_command(&cancel), Err(OrderError::AlreadyCancelled)));
    }
}
