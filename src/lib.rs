//! Offline feature flags: named features resolved locally from stored rule documents.
//!
//! # Overview
//!
//! A [`Feature`] is an ordered list of [`Bucket`]s, each guarded by a [`Classifier`], plus a
//! default value. Classifiers are boolean trees over comparisons of [`Attribute`]s (the local host
//! name, a per-evaluation random draw, a constant, or an extension registered in an
//! [`AttributeRegistry`]) against literals. Resolution walks the buckets in order and the first
//! classifier that evaluates to true wins; when none does, the synthetic `"default"` bucket is
//! reported with the feature's default value.
//!
//! Features are stored as JSON documents in a [`FeatureStore`] and evaluated by name through an
//! [`Evaluator`]:
//!
//! ```
//! # use offline_feature::{Attribute, Bucket, Classifier, EvalResultType, EvaluatorConfig, Feature, InMemoryStore};
//! let feature = Feature::new(
//!     ["all"],
//!     vec![Bucket::new(
//!         "holdout",
//!         Classifier::less_than(Attribute::SessionRandom, 0.1),
//!         true,
//!     )?],
//!     false,
//! )?;
//!
//! let store = InMemoryStore::new();
//! store.insert_feature("new_checkout", &feature)?;
//!
//! let evaluator = EvaluatorConfig::new(store).to_evaluator();
//! let result = evaluator.eval("new_checkout", false);
//! assert!(matches!(result.result_type, EvalResultType::Ok | EvalResultType::Default));
//! # Ok::<(), offline_feature::Error>(())
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! [`Evaluator::eval`] never fails: any error is reported through [`EvalResult`] together with the
//! caller's default value, as feature evaluation should not be critical enough to cause crashes.
//! The lower-level [`Feature::from_json`] and [`Feature::resolve`] return errors directly.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages,
//! under the `offline_feature` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into feature evaluation.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod attribute;
mod classifier;
mod codec;
mod config;
mod error;
mod evaluator;
mod feature;
mod store;
mod value;

pub use attribute::{Attribute, AttributeProvider, AttributeRegistry};
pub use classifier::{Classifier, ComparisonOperator, Pattern};
pub use codec::CALLABLE_ATTRIBUTE;
pub use config::EvaluatorConfig;
pub use error::{Error, Result};
pub use evaluator::{EvalResult, EvalResultType, Evaluator};
pub use feature::{Bucket, ErrorPolicy, Feature, FeatureType, Resolution, ALL_VERSIONS, DEFAULT_BUCKET};
pub use store::{DirectoryStore, FeatureStore, InMemoryStore};
pub use value::{FeatureValue, Number, Scalar, ScalarKind};

/// Tags of the built-in attributes.
pub mod attributes {
    pub use crate::attribute::{HOSTNAME, SESSION_RANDOM, STATIC_NUMBER};
}
