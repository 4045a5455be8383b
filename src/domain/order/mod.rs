// ============================================================================
// Order Domain
// ============================================================================
//
// - Model (Order, Delivery, Payment, Item)
// - Validation (field rules + aggregate ValidationError)
//
// ============================================================================

pub mod model;
pub mod validation;

pub use model::*;
pub use validation::*;
