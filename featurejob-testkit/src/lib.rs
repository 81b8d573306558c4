//! Test doubles and fixtures for featurejob.
//!
//! - [`MockExecutor`] - scripted, recording [`featurejob::ActivityExecutor`]
//! - [`StaticFeatureManager`] - recording [`featurejob::FeatureManager`]
//! - [`RecordingClient`] - [`featurejob::WorkflowClient`] that only records
//! - [`fixtures`] - specs, keys and event helpers

pub mod client;
pub mod executor;
pub mod fixtures;
pub mod manager;

pub use client::{RecordingClient, SignalCall};
pub use executor::{Invocation, MockExecutor, Outcome};
pub use manager::{ManagerCall, ManagerFailure, StaticFeatureManager};
