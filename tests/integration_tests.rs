//! Integration tests for the actor-based transmission monitoring system

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/pipeline.rs"]
mod pipeline;

#[path = "integration/failover.rs"]
mod failover;

#[path = "integration/alerting.rs"]
mod alerting;

#[path = "integration/persistence.rs"]
mod persistence;
