//! Featurejob - per-feature job orchestration for cluster feature management.
//!
//! Turns "activate / deactivate / update feature X on cluster N" requests
//! into ordered jobs, and runs one orchestrator instance per
//! (cluster, feature) key that works through them one at a time, retrying
//! transient failures on a timer while staying preemptable by newer
//! requests.
//!
//! # Core Concepts
//!
//! - **Dispatcher**: [`AsyncFeatureManager`] wraps a synchronous
//!   [`FeatureManager`]; its state changes become [`JobSignal`]s delivered
//!   through [`WorkflowClient::signal_with_start`].
//!
//! - **Orchestrator**: [`FeatureJobWorkflow`] is the explicit state machine
//!   ([`JobState`], [`Transition`]) that consumes an instance's inbox.
//!
//! - **Classification and retry**: [`classifier::classify`] maps a signal to
//!   an [`ActivityInput`]; [`retry::evaluate`] decides retry versus fatal
//!   from the [`ErrorKind`] an [`ActivityError`] was tagged with.
//!
//! - **Activities**: the [`ActivityExecutor`] trait, backed in practice by a
//!   [`FeatureRegistry`] through [`RegistryActivityExecutor`].
//!
//! - **Runtime**: [`WorkflowContext`] is everything an instance needs from
//!   its host. [`InProcRuntime`] implements it, and [`WorkflowClient`], on
//!   tokio tasks for embedding and tests.
//!
//! - **Events**: [`FeatureJobEvent`]s are published on a [`JobEventPublisher`]
//!   such as [`InProcEventBus`].
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use featurejob::*;
//!
//! let registry = FeatureRegistry::new().with_feature(Arc::new(MonitoringManager::new()));
//! let runtime = Arc::new(
//!     InProcRuntimeBuilder::new(RuntimeConfig::default())
//!         .with_executor(Arc::new(RegistryActivityExecutor::new(registry.clone())))
//!         .build()?,
//! );
//! let features = registry.wrap_async(runtime, DispatcherConfig::default());
//!
//! features
//!     .get(&"monitoring".into())?
//!     .activate(ClusterId(42), spec)
//!     .await?;
//! ```

/// Activity names, inputs and the executor contract.
pub mod activity;

/// Maps job signals to activity inputs.
pub mod classifier;

/// Dispatcher and runtime configuration.
pub mod config;

/// Typed errors for activities, instances, dispatch and feature managers.
pub mod error;

/// Lifecycle events and the in-process event bus.
///
/// - [`FeatureJobEvent`] and [`FeatureJobEventPayload`] for event data
/// - [`JobEventPublisher`] for publishing and subscribing
/// - [`InProcEventBus`] for in-process broadcasting
pub mod events;

/// Cluster and feature identifiers and the opaque spec type.
pub mod feature;

/// Feature managers and the asynchronous dispatcher.
pub mod manager;

#[cfg(feature = "metrics")]
/// Prometheus metrics.
pub mod metrics;

/// The per-key job state machine.
pub mod orchestrator;

/// Name-to-manager registry and the activity executor built on it.
pub mod registry;

/// Retry-versus-fatal decision.
pub mod retry;

/// Runtime contracts and the in-process runtime.
///
/// - [`WorkflowContext`] - capabilities of a running instance
/// - [`WorkflowClient`] - create-or-signal entry point
/// - [`InProcRuntime`] and [`InProcRuntimeBuilder`] - tokio-hosted runtime
/// - [`ShutdownToken`] - shutdown signaling
pub mod runtime;

/// Job signals, instance input and instance identity.
pub mod signal;

/// Tracing spans and telemetry helpers.
pub mod telemetry;

pub use activity::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use feature::*;
pub use manager::*;
pub use orchestrator::*;
pub use registry::*;
pub use runtime::*;
pub use signal::*;
