pub mod cycle;
pub mod symptoms;

pub use cycle::{CycleEvent, CycleEventOutcome, CycleService};
pub use symptoms::{LogSymptoms, SymptomService};
