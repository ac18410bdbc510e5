// ============================================================================
// Domain aggregates
// ============================================================================
//
// Orders are the sample aggregate exercised by the demo binary and the
// integration tests. Identities: sales.order.ORD-<32 hex>.
//
// ============================================================================

pub mod order;
