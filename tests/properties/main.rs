//! Property tests for allocation, attribution and aggregation.

mod aggregation_props;
mod allocation_props;
