pub mod cycle;
pub mod cycle_stats;
pub mod symptoms;
