use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::activity::ActivityExecutor;
use crate::config::DispatcherConfig;
use crate::error::{ActivityError, FeatureError};
use crate::feature::{ClusterId, FeatureName, FeatureSpec};
use crate::manager::{AsyncFeatureManager, FeatureManager};
use crate::runtime::WorkflowClient;

/// Lookup table from feature name to its manager.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    managers: HashMap<FeatureName, Arc<dyn FeatureManager>>,
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.names())
            .finish()
    }
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager under its own name, replacing any previous one.
    pub fn register(
        &mut self,
        manager: Arc<dyn FeatureManager>,
    ) -> Option<Arc<dyn FeatureManager>> {
        self.managers.insert(manager.name().clone(), manager)
    }

    pub fn with_feature(mut self, manager: Arc<dyn FeatureManager>) -> Self {
        self.register(manager);
        self
    }

    /// # Errors
    ///
    /// [`FeatureError::UnknownFeature`] when nothing is registered under `name`.
    pub fn get(&self, name: &FeatureName) -> Result<Arc<dyn FeatureManager>, FeatureError> {
        self.managers
            .get(name)
            .cloned()
            .ok_or_else(|| FeatureError::UnknownFeature { name: name.clone() })
    }

    /// Registered feature names, sorted.
    pub fn names(&self) -> Vec<FeatureName> {
        let mut names: Vec<_> = self.managers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// A registry of the same features whose state changes are dispatched
    /// through `client` instead of running inline.
    pub fn wrap_async<C>(&self, client: Arc<C>, config: DispatcherConfig) -> FeatureRegistry
    where
        C: WorkflowClient + 'static,
    {
        let managers = self
            .managers
            .iter()
            .map(|(name, manager)| {
                let wrapped: Arc<dyn FeatureManager> = Arc::new(AsyncFeatureManager::new(
                    Arc::clone(manager),
                    Arc::clone(&client),
                    config.clone(),
                ));
                (name.clone(), wrapped)
            })
            .collect();
        FeatureRegistry { managers }
    }
}

/// Activity executor backed by the synchronous managers of a registry.
///
/// An unknown feature is a fatal activity error. Manager errors keep their
/// retryability: only [`FeatureError::Transient`] is retried.
#[derive(Clone, Debug)]
pub struct RegistryActivityExecutor {
    registry: FeatureRegistry,
}

impl RegistryActivityExecutor {
    pub fn new(registry: FeatureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }
}

#[async_trait]
impl ActivityExecutor for RegistryActivityExecutor {
    async fn execute_activate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError> {
        let manager = self.registry.get(feature_name)?;
        manager.activate(cluster_id, spec.clone()).await?;
        Ok(())
    }

    async fn execute_deactivate(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
    ) -> Result<(), ActivityError> {
        let manager = self.registry.get(feature_name)?;
        manager.deactivate(cluster_id).await?;
        Ok(())
    }

    async fn execute_update(
        &self,
        cluster_id: ClusterId,
        feature_name: &FeatureName,
        spec: &FeatureSpec,
    ) -> Result<(), ActivityError> {
        let manager = self.registry.get(feature_name)?;
        manager.update(cluster_id, spec.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::feature::FeatureOutput;
    use parking_lot::Mutex;

    struct FlakyManager {
        name: FeatureName,
        calls: Mutex<Vec<String>>,
    }

    impl FlakyManager {
        fn new(name: &str) -> Self {
            Self {
                name: FeatureName::new(name),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FeatureManager for FlakyManager {
        fn name(&self) -> &FeatureName {
            &self.name
        }

        fn validate_spec(&self, _spec: &FeatureSpec) -> Result<(), FeatureError> {
            Ok(())
        }

        async fn output(&self, _cluster_id: ClusterId) -> Result<FeatureOutput, FeatureError> {
            Ok(FeatureOutput::new())
        }

        async fn activate(
            &self,
            cluster_id: ClusterId,
            _spec: FeatureSpec,
        ) -> Result<(), FeatureError> {
            self.calls.lock().push(format!("activate {cluster_id}"));
            Err(FeatureError::transient(anyhow::anyhow!("tiller not ready")))
        }

        async fn deactivate(&self, cluster_id: ClusterId) -> Result<(), FeatureError> {
            self.calls.lock().push(format!("deactivate {cluster_id}"));
            Ok(())
        }

        async fn update(
            &self,
            _cluster_id: ClusterId,
            _spec: FeatureSpec,
        ) -> Result<(), FeatureError> {
            Err(FeatureError::invalid_spec("unknown level"))
        }
    }

    #[test]
    fn unknown_feature_lookup_fails() {
        let registry = FeatureRegistry::new().with_feature(Arc::new(FlakyManager::new("dns")));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&"dns".into()).is_ok());

        let err = registry.get(&"vault".into()).err().unwrap();
        assert!(matches!(
            err,
            FeatureError::UnknownFeature { ref name } if name.as_str() == "vault"
        ));
    }

    #[test]
    fn names_are_sorted() {
        let registry = FeatureRegistry::new()
            .with_feature(Arc::new(FlakyManager::new("monitoring")))
            .with_feature(Arc::new(FlakyManager::new("dns")))
            .with_feature(Arc::new(FlakyManager::new("logging")));
        let names: Vec<_> = registry.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["dns", "logging", "monitoring"]);
    }

    #[tokio::test]
    async fn executor_carries_feature_error_retryability() {
        let manager = Arc::new(FlakyManager::new("dns"));
        let executor = RegistryActivityExecutor::new(
            FeatureRegistry::new().with_feature(manager.clone()),
        );
        let dns = FeatureName::new("dns");

        let err = executor
            .execute_activate(ClusterId(5), &dns, &FeatureSpec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Retryable);

        let err = executor
            .execute_update(ClusterId(5), &dns, &FeatureSpec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);

        executor.execute_deactivate(ClusterId(5), &dns).await.unwrap();
        assert_eq!(*manager.calls.lock(), vec!["activate 5", "deactivate 5"]);
    }

    #[tokio::test]
    async fn executor_rejects_unknown_feature_as_fatal() {
        let executor = RegistryActivityExecutor::new(FeatureRegistry::new());
        let err = executor
            .execute_deactivate(ClusterId(1), &FeatureName::new("vault"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.message(), "unknown feature: vault");
    }
}
