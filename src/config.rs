use crate::{
    store::{DirectoryStore, FeatureStore},
    AttributeRegistry, ErrorPolicy, Evaluator,
};

/// Configuration for [`Evaluator`].
pub struct EvaluatorConfig<'a> {
    pub(crate) store: Box<dyn FeatureStore + Send + Sync + 'a>,
    pub(crate) registry: AttributeRegistry,
    pub(crate) error_policy: ErrorPolicy,
}

impl<'a> EvaluatorConfig<'a> {
    /// Create a configuration reading documents from `store`, with no extension attributes and the
    /// fail-closed error policy.
    ///
    /// ```
    /// # use offline_feature::{EvaluatorConfig, InMemoryStore};
    /// EvaluatorConfig::new(InMemoryStore::new());
    /// ```
    pub fn new(store: impl FeatureStore + Send + Sync + 'a) -> Self {
        EvaluatorConfig {
            store: Box::new(store),
            registry: AttributeRegistry::new(),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Create a configuration reading from the directory given by `OFFLINE_FEATURES_DIR`, falling
    /// back to `features/materialized`.
    pub fn from_env() -> Self {
        EvaluatorConfig::new(DirectoryStore::from_env())
    }

    /// Set the registry used to decode and evaluate extension attributes.
    ///
    /// ```
    /// # use offline_feature::{AttributeRegistry, EvaluatorConfig, InMemoryStore, Scalar};
    /// let mut registry = AttributeRegistry::new();
    /// registry.register("process.id", || Ok(Scalar::Integer(std::process::id().into()))).unwrap();
    ///
    /// let mut config = EvaluatorConfig::new(InMemoryStore::new());
    /// config.registry(registry);
    /// ```
    pub fn registry(&mut self, registry: AttributeRegistry) -> &mut Self {
        self.registry = registry;
        self
    }

    /// Choose how classifier failures are handled. Defaults to [`ErrorPolicy::FailClosed`].
    pub fn error_policy(&mut self, error_policy: ErrorPolicy) -> &mut Self {
        self.error_policy = error_policy;
        self
    }

    /// Create a new [`Evaluator`] using the specified configuration.
    ///
    /// ```
    /// # use offline_feature::{ErrorPolicy, Evaluator, EvaluatorConfig, InMemoryStore};
    /// let mut config = EvaluatorConfig::new(InMemoryStore::new());
    /// config.error_policy(ErrorPolicy::FailOpen);
    /// let evaluator: Evaluator = config.to_evaluator();
    /// ```
    pub fn to_evaluator(self) -> Evaluator<'a> {
        Evaluator::new(self)
    }
}
