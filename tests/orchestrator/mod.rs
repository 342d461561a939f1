//! Orchestrator behaviour scenarios and their step definitions.

mod bdd_steps;
mod scenarios;
mod test_helpers;
