use serde::{Deserialize, Serialize};

use crate::{
    feature::Resolution, value::FeatureValue, AttributeRegistry, Error, ErrorPolicy,
    EvaluatorConfig, Feature, Result,
};

/// Evaluates stored features by name.
///
/// In order to create an evaluator instance, first create [`EvaluatorConfig`].
///
/// # Examples
/// ```
/// # use offline_feature::{EvalResultType, Evaluator, EvaluatorConfig, InMemoryStore};
/// let evaluator = Evaluator::new(EvaluatorConfig::new(InMemoryStore::new()));
/// let result = evaluator.eval("missing_feature", "dflt");
/// assert_eq!(result.result_type, EvalResultType::NotExist);
/// assert_eq!(result.value, "dflt");
/// ```
pub struct Evaluator<'a> {
    config: EvaluatorConfig<'a>,
}

/// How an [`EvalResult`] was produced.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EvalResultType {
    /// A bucket matched.
    Ok,
    /// No bucket matched; the feature's default was used.
    Default,
    /// The store has no such feature; the caller's default was used.
    NotExist,
    /// Loading, decoding, or resolution failed; the caller's default was used.
    Error,
}

/// Outcome of [`Evaluator::eval`].
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// How the value was obtained.
    pub result_type: EvalResultType,
    /// Winning bucket, `"default"` on fall-through, `None` if the feature was not resolved.
    pub bucket_name: Option<String>,
    /// The resolved value.
    pub value: FeatureValue,
    /// Underlying failure, for `NotExist` and `Error` results.
    pub error: Option<Error>,
}

impl EvalResult {
    fn resolved(result_type: EvalResultType, bucket_name: &str, value: &FeatureValue) -> Self {
        EvalResult {
            result_type,
            bucket_name: Some(bucket_name.to_owned()),
            value: value.clone(),
            error: None,
        }
    }

    fn unresolved(result_type: EvalResultType, default_value: FeatureValue, error: Error) -> Self {
        EvalResult {
            result_type,
            bucket_name: None,
            value: default_value,
            error: Some(error),
        }
    }

    /// Return `true` if the value comes from a matching bucket or the feature's default.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self.result_type,
            EvalResultType::Ok | EvalResultType::Default
        )
    }
}

impl<'a> Evaluator<'a> {
    /// Create a new `Evaluator` using the specified configuration.
    pub fn new(config: EvaluatorConfig<'a>) -> Self {
        Evaluator { config }
    }

    #[allow(missing_docs)]
    pub fn registry(&self) -> &AttributeRegistry {
        &self.config.registry
    }

    #[allow(missing_docs)]
    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.error_policy
    }

    /// Load and decode the feature stored under `feature_name`.
    pub fn load(&self, feature_name: &str) -> Result<Feature> {
        let document = self.config.store.load(feature_name)?;
        Feature::from_json(&document, &self.config.registry)
    }

    /// Resolve `feature_name` to a value.
    ///
    /// The feature is reloaded and re-evaluated on every call. Failures never escape: they are
    /// reported through [`EvalResult::result_type`] with `default_value` as the value.
    pub fn eval(&self, feature_name: &str, default_value: impl Into<FeatureValue>) -> EvalResult {
        let default_value = default_value.into();

        let feature = match self.load(feature_name) {
            Ok(feature) => feature,
            Err(err @ Error::StoreNotFound(_)) => {
                log::trace!(target: "offline_feature", feature_name; "feature does not exist");
                return EvalResult::unresolved(EvalResultType::NotExist, default_value, err);
            }
            Err(err) => {
                log::warn!(target: "offline_feature", feature_name; "failed to load feature: {err}");
                return EvalResult::unresolved(EvalResultType::Error, default_value, err);
            }
        };

        let result = match feature.resolve(&self.config.registry, self.config.error_policy) {
            Ok(Resolution::Bucket(bucket)) => {
                EvalResult::resolved(EvalResultType::Ok, bucket.name(), bucket.value())
            }
            Ok(resolution @ Resolution::Default(value)) => {
                EvalResult::resolved(EvalResultType::Default, resolution.bucket_name(), value)
            }
            Err(err) => {
                log::warn!(target: "offline_feature", feature_name; "error occurred while resolving a feature: {err}");
                return EvalResult::unresolved(EvalResultType::Error, default_value, err);
            }
        };

        log::trace!(target: "offline_feature",
                    feature_name,
                    result_type:serde = result.result_type,
                    bucket = result.bucket_name.as_deref();
                    "evaluated a feature");

        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use serde::Deserialize;
    use serde_json::json;

    use super::{EvalResultType, Evaluator};
    use crate::{
        store::{DirectoryStore, InMemoryStore},
        Attribute, AttributeRegistry, Bucket, Classifier, Error, ErrorPolicy, EvaluatorConfig,
        Feature, Scalar,
    };

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn test_feature(classifier_value: i64) -> Feature {
        Feature::new(
            ["all"],
            vec![Bucket::new(
                "control",
                Classifier::all(vec![Classifier::equal_to(
                    Attribute::static_number(1),
                    classifier_value,
                )]),
                "feature_value",
            )
            .unwrap()],
            "default_value",
        )
        .unwrap()
    }

    fn evaluator_with(store: InMemoryStore) -> Evaluator<'static> {
        EvaluatorConfig::new(store).to_evaluator()
    }

    #[test]
    fn missing_feature_is_not_exist() {
        init();
        let evaluator = evaluator_with(InMemoryStore::new());

        let result = evaluator.eval("missing_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::NotExist);
        assert_eq!(result.bucket_name, None);
        assert_eq!(result.value, json!("dflt"));
        assert!(matches!(result.error, Some(Error::StoreNotFound(_))));
        assert!(!result.is_resolved());
    }

    #[test]
    fn matching_bucket_is_ok() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("test_feature", &test_feature(1)).unwrap();
        let evaluator = evaluator_with(store);

        let result = evaluator.eval("test_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::Ok);
        assert_eq!(result.bucket_name.as_deref(), Some("control"));
        assert_eq!(result.value, json!("feature_value"));
        assert!(result.error.is_none());
    }

    #[test]
    fn no_match_is_default() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("test_feature", &test_feature(0)).unwrap();
        let evaluator = evaluator_with(store);

        let result = evaluator.eval("test_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::Default);
        assert_eq!(result.bucket_name.as_deref(), Some("default"));
        assert_eq!(result.value, json!("default_value"));
        assert!(result.is_resolved());
    }

    #[test]
    fn malformed_document_is_error() {
        init();
        let store = InMemoryStore::new();
        store.insert("test_feature", "invalid json");
        let evaluator = evaluator_with(store);

        let result = evaluator.eval("test_feature", "default_value");
        assert_eq!(result.result_type, EvalResultType::Error);
        assert_eq!(result.bucket_name, None);
        assert_eq!(result.value, json!("default_value"));
        assert!(matches!(result.error, Some(Error::Decode(_))));
    }

    #[test]
    fn every_call_reloads() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("test_feature", &test_feature(1)).unwrap();
        let evaluator = EvaluatorConfig::new(&store).to_evaluator();
        assert_eq!(
            evaluator.eval("test_feature", "dflt").result_type,
            EvalResultType::Ok
        );

        store.insert_feature("test_feature", &test_feature(0)).unwrap();
        assert_eq!(
            evaluator.eval("test_feature", "dflt").result_type,
            EvalResultType::Default
        );

        store.remove("test_feature");
        assert_eq!(
            evaluator.eval("test_feature", "dflt").result_type,
            EvalResultType::NotExist
        );
    }

    fn error_feature() -> Feature {
        Feature::new(
            ["all"],
            vec![
                Bucket::new(
                    "error_bucket",
                    Classifier::all(vec![Classifier::equal_to(
                        Attribute::callable("test.error"),
                        1,
                    )]),
                    true,
                )
                .unwrap(),
                Bucket::new("control", Classifier::all(vec![]), "control_value").unwrap(),
            ],
            false,
        )
        .unwrap()
    }

    fn error_registry() -> AttributeRegistry {
        let mut registry = AttributeRegistry::new();
        registry
            .register("test.error", || {
                Err(Error::attribute("test.error", "attribute failed"))
            })
            .unwrap();
        registry
    }

    #[test]
    fn attribute_failure_is_error_when_fail_closed() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("error_feature", &error_feature()).unwrap();
        let mut config = EvaluatorConfig::new(store);
        config.registry(error_registry());
        let evaluator = config.to_evaluator();
        assert_eq!(evaluator.error_policy(), ErrorPolicy::FailClosed);

        let result = evaluator.eval("error_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::Error);
        assert_eq!(result.value, json!("dflt"));
        assert!(matches!(
            result.error,
            Some(Error::AttributeEvaluation { .. })
        ));
    }

    #[test]
    fn attribute_failure_skips_bucket_when_fail_open() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("error_feature", &error_feature()).unwrap();
        let mut config = EvaluatorConfig::new(store);
        config
            .registry(error_registry())
            .error_policy(ErrorPolicy::FailOpen);
        let evaluator = config.to_evaluator();

        let result = evaluator.eval("error_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::Ok);
        assert_eq!(result.bucket_name.as_deref(), Some("control"));
        assert_eq!(result.value, json!("control_value"));
    }

    #[test]
    fn unregistered_attribute_is_error() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("error_feature", &error_feature()).unwrap();
        // decoding needs the registry that produced the document
        let evaluator = evaluator_with(store);

        let result = evaluator.eval("error_feature", "dflt");
        assert_eq!(result.result_type, EvalResultType::Error);
        assert!(matches!(result.error, Some(Error::UnknownAttribute(_))));
    }

    #[test]
    fn extension_attributes_are_evaluated() {
        init();
        let feature = Feature::new(
            ["all"],
            vec![Bucket::new(
                "eu",
                Classifier::regex_match(Attribute::callable("test.region"), "eu-").unwrap(),
                "eu_value",
            )
            .unwrap()],
            "default_value",
        )
        .unwrap();
        let store = InMemoryStore::new();
        store.insert_feature("region_feature", &feature).unwrap();

        let mut registry = AttributeRegistry::new();
        registry
            .register("test.region", || Ok(Scalar::from("eu-west-1")))
            .unwrap();
        let mut config = EvaluatorConfig::new(store);
        config.registry(registry);
        let evaluator = config.to_evaluator();
        assert!(evaluator.registry().contains("test.region"));

        let result = evaluator.eval("region_feature", "dflt");
        assert_eq!(result.bucket_name.as_deref(), Some("eu"));
        assert_eq!(result.value, json!("eu_value"));
    }

    #[test]
    fn evaluator_is_shareable_between_threads() {
        init();
        let store = InMemoryStore::new();
        store.insert_feature("test_feature", &test_feature(1)).unwrap();
        let evaluator = evaluator_with(store);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let result = evaluator.eval("test_feature", "dflt");
                    assert_eq!(result.result_type, EvalResultType::Ok);
                });
            }
        });
    }

    #[derive(Debug, Deserialize)]
    struct TestCase {
        feature: String,
        default_value: serde_json::Value,
        result_type: EvalResultType,
        bucket_name: Option<String>,
        value: serde_json::Value,
    }

    #[test]
    fn evaluation_test_data() {
        init();
        let evaluator = EvaluatorConfig::new(DirectoryStore::new("tests/data/features")).to_evaluator();

        for entry in fs::read_dir("tests/data/eval/").unwrap() {
            let entry = entry.unwrap();
            println!("Processing test file: {:?}", entry.path());

            let f = File::open(entry.path()).unwrap();
            let test_case: TestCase = serde_json::from_reader(f).unwrap();

            let result = evaluator.eval(&test_case.feature, test_case.default_value);
            assert_eq!(result.result_type, test_case.result_type);
            assert_eq!(result.bucket_name, test_case.bucket_name);
            assert_eq!(result.value, test_case.value);
        }
    }
}
