use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{value::FeatureValue, AttributeRegistry, Classifier, Error, Result};

/// Name reported when no bucket matches. Buckets may not use it.
pub const DEFAULT_BUCKET: &str = "default";

/// Version tag that makes a feature apply to every runtime.
pub const ALL_VERSIONS: &str = "all";

/// Discriminator of the top-level document.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureType {
    /// The only feature type: evaluated locally from a stored document.
    #[default]
    #[serde(rename = "offline-feature")]
    Offline,
}

/// What to do when a bucket's classifier fails to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort resolution with the error.
    #[default]
    FailClosed,
    /// Treat the failing bucket as non-matching and continue with the next one.
    FailOpen,
}

/// A guarded outcome: if `classifier` is true, the feature resolves to `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    name: String,
    classifier: Classifier,
    value: FeatureValue,
}

impl Bucket {
    /// Create a bucket. The name [`DEFAULT_BUCKET`] is reserved and rejected.
    pub fn new(
        name: impl Into<String>,
        classifier: Classifier,
        value: impl Into<FeatureValue>,
    ) -> Result<Bucket> {
        let name = name.into();
        if name == DEFAULT_BUCKET {
            return Err(Error::Decode(format!(
                "bucket name {DEFAULT_BUCKET:?} is reserved"
            )));
        }
        Ok(Bucket {
            name,
            classifier,
            value: value.into(),
        })
    }

    #[allow(missing_docs)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[allow(missing_docs)]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    #[allow(missing_docs)]
    pub fn value(&self) -> &FeatureValue {
        &self.value
    }
}

/// A persisted feature: ordered buckets plus a default value.
///
/// Immutable once built; evaluation only reads it.
///
/// ```
/// # use offline_feature::{Attribute, Bucket, Classifier, Feature, AttributeRegistry, ErrorPolicy};
/// let feature = Feature::new(
///     ["all"],
///     vec![Bucket::new(
///         "control",
///         Classifier::equal_to(Attribute::static_number(1), 1),
///         "feature_value",
///     )
///     .unwrap()],
///     "default_value",
/// )
/// .unwrap();
///
/// let resolution = feature
///     .resolve(&AttributeRegistry::new(), ErrorPolicy::FailClosed)
///     .unwrap();
/// assert_eq!(resolution.bucket_name(), "control");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    feature_type: FeatureType,
    supported_versions: Vec<String>,
    buckets: Vec<Bucket>,
    default: FeatureValue,
}

/// Outcome of [`Feature::resolve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// A bucket's classifier matched.
    Bucket(&'a Bucket),
    /// No bucket matched; carries the feature's default value.
    Default(&'a FeatureValue),
}

impl<'a> Resolution<'a> {
    /// Name of the winning bucket, or [`DEFAULT_BUCKET`].
    pub fn bucket_name(&self) -> &'a str {
        match self {
            Resolution::Bucket(bucket) => bucket.name(),
            Resolution::Default(_) => DEFAULT_BUCKET,
        }
    }

    /// Value of the winning bucket, or the feature's default.
    pub fn value(&self) -> &'a FeatureValue {
        match self {
            Resolution::Bucket(bucket) => bucket.value(),
            Resolution::Default(value) => value,
        }
    }

    /// Return `true` if resolution fell through to the default.
    pub fn is_default(&self) -> bool {
        matches!(self, Resolution::Default(_))
    }
}

impl Feature {
    /// Create a feature. Bucket names must be unique.
    pub fn new(
        supported_versions: impl IntoIterator<Item = impl Into<String>>,
        buckets: Vec<Bucket>,
        default: impl Into<FeatureValue>,
    ) -> Result<Feature> {
        let mut seen = HashSet::new();
        for bucket in &buckets {
            if !seen.insert(bucket.name()) {
                return Err(Error::Decode(format!(
                    "duplicate bucket name {:?}",
                    bucket.name()
                )));
            }
        }
        Ok(Feature {
            feature_type: FeatureType::Offline,
            supported_versions: supported_versions.into_iter().map(Into::into).collect(),
            buckets,
            default: default.into(),
        })
    }

    #[allow(missing_docs)]
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    /// Runtime version tags this feature applies to, as stored.
    pub fn supported_versions(&self) -> &[String] {
        &self.supported_versions
    }

    /// Buckets in evaluation order.
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[allow(missing_docs)]
    pub fn default_value(&self) -> &FeatureValue {
        &self.default
    }

    /// Return `true` if the feature lists `version` or [`ALL_VERSIONS`].
    pub fn supports_version(&self, version: &str) -> bool {
        self.supported_versions
            .iter()
            .any(|v| v == version || v == ALL_VERSIONS)
    }

    /// Find a bucket by name.
    pub fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|bucket| bucket.name() == name)
    }

    /// Names of all buckets, in evaluation order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(Bucket::name)
    }

    /// Pick the first bucket whose classifier is true, or fall back to the default.
    ///
    /// Buckets after the winner are not evaluated. When a classifier fails, `policy` decides
    /// between returning the error and skipping the bucket.
    pub fn resolve(
        &self,
        registry: &AttributeRegistry,
        policy: ErrorPolicy,
    ) -> Result<Resolution<'_>> {
        for bucket in &self.buckets {
            match bucket.classifier.eval(registry) {
                Ok(true) => return Ok(Resolution::Bucket(bucket)),
                Ok(false) => {}
                Err(err) => match policy {
                    ErrorPolicy::FailClosed => return Err(err),
                    ErrorPolicy::FailOpen => {
                        log::debug!(target: "offline_feature",
                                    bucket = bucket.name();
                                    "skipping bucket after classifier error: {err}");
                    }
                },
            }
        }
        Ok(Resolution::Default(&self.default))
    }
}
