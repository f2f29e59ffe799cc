//! Test suites for the worker service.

mod bootstrap_behaviour;
pub(crate) mod support;
mod supervisor_behaviour;
