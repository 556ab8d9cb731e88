//! `SchemAPI` Core — documents, schemas, queries, and operation payloads.

pub mod action;
pub mod clock;
pub mod payload;
pub mod query;
pub mod schema;
pub mod types;

pub use action::{Action, HookPhase, UnknownAction};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use payload::{Ack, ClearResult, FilterOptions, FilterResult, Payload};
pub use query::{Condition, Page, PageRequest, Query};
pub use schema::{FieldDef, FieldType, Schema, SchemaError, ValidationResult};
pub use types::{document_id, Document, Principal, CORRELATION_FIELD, CREATE_DATE_FIELD, ID_FIELD};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
