//! End-to-end engine tests against the SQLite store.

mod assignment_tests;
mod concurrency_tests;
mod fixture;
mod report_tests;
