//! Stream and durable-consumer topology (§4.D): one stream per environment,
//! one durable per declared subscription pattern, reconciled against the
//! broker's live configuration on startup.

mod durable_name;
mod reconcile;

pub use durable_name::durable_name_for_pattern;
pub use reconcile::{is_recoverable, DeclaredConsumer, ReconcileAction, ReconcileReport, TopologyError, TopologyManager};
