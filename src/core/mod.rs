//! Assignment and analytics engine

pub mod aggregation;
pub mod allocator;
pub mod attribution;
pub mod model;
pub mod report;
pub mod resolver;

pub use aggregation::{RevenueRule, VariantStats, aggregate};
pub use allocator::{AllocationTable, allocate};
pub use attribution::{assignment_times, filter_attributed};
pub use model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewEvent,
    NewExperiment, NewVariant, Properties, PropertyValue, Variant,
};
pub use report::{ComposeInput, Report, ReportFilters, compose};
pub use resolver::{AssignmentResolver, ResolverOptions};
