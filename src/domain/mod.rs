// ============================================================================
// Domain Layer
// ============================================================================
//
// The order aggregate as it travels over the wire, sits in the cache and is
// persisted, plus the rules an inbound order must satisfy before ingestion.
//
// ============================================================================

pub mod order;
