//! JSON document format.
//!
//! Every polymorphic node carries a `type` discriminator. Encoding goes through hand-written
//! [`Serialize`] impls; decoding goes through permissive `*Wire` structures which are then checked
//! against the classifier tag table and the [`AttributeRegistry`], so unknown tags are reported
//! instead of being silently accepted.
//!
//! Bucket values are read from either a `value` field on each bucket or a top-level `values` map
//! keyed by bucket name (older documents). Encoding always writes the per-bucket `value`.
use std::collections::HashMap;

use serde::{
    de::DeserializeOwned, ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    attribute::{HOSTNAME, SESSION_RANDOM, STATIC_NUMBER},
    classifier::{ClassifierKind, Pattern},
    feature::{FeatureType, DEFAULT_BUCKET},
    value::{FeatureValue, Number, Scalar},
    Attribute, AttributeRegistry, Bucket, Classifier, Error, Feature, Result,
};

/// Discriminator shared by every attribute object.
pub const CALLABLE_ATTRIBUTE: &str = "callable-attribute";

#[derive(Debug, Deserialize)]
struct FeatureWire {
    // checked by deserialization, only one feature type exists
    #[allow(dead_code)]
    #[serde(rename = "type")]
    feature_type: FeatureType,
    python_versions: Vec<String>,
    buckets: Vec<BucketWire>,
    #[serde(default)]
    values: HashMap<String, FeatureValue>,
    #[serde(default)]
    default: FeatureValue,
}

#[derive(Debug, Deserialize)]
struct BucketWire {
    name: String,
    classifier: ClassifierWire,
    // Absent and `null` are different here: `null` is a legitimate bucket value.
    #[serde(default, deserialize_with = "deserialize_present")]
    value: Option<FeatureValue>,
}

#[derive(Debug, Deserialize)]
struct ClassifierWire {
    #[serde(rename = "type")]
    classifier_type: String,
    #[serde(default)]
    attribute: Option<AttributeWire>,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AttributeWire {
    #[serde(rename = "type")]
    attribute_type: String,
    name: String,
    #[serde(default)]
    value: Option<Number>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<FeatureValue>, D::Error>
where
    D: Deserializer<'de>,
{
    FeatureValue::deserialize(deserializer).map(Some)
}

impl Feature {
    /// Decode a feature document, resolving attribute tags against `registry`.
    pub fn from_json(json: &[u8], registry: &AttributeRegistry) -> Result<Feature> {
        let wire: FeatureWire = from_slice(json)?;
        decode_feature(wire, registry)
    }

    /// Encode the feature as compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode the feature as indented JSON, the form written to disk.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse JSON without `serde_json`'s nesting limit, growing the stack on demand instead.
///
/// The encoder puts no bound on classifier depth, so the decoder must not either.
pub(crate) fn from_slice<T: DeserializeOwned>(json: &[u8]) -> serde_json::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(json);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

fn decode_feature(wire: FeatureWire, registry: &AttributeRegistry) -> Result<Feature> {
    if wire.values.contains_key(DEFAULT_BUCKET) {
        return Err(Error::Decode(format!(
            "{DEFAULT_BUCKET:?} is not allowed in the values map"
        )));
    }

    let mut values = wire.values;
    let buckets: Vec<Bucket> = wire
        .buckets
        .into_iter()
        .map(|bucket| {
            let legacy = values.remove(&bucket.name);
            let value = bucket.value.or(legacy).ok_or_else(|| {
                Error::Decode(format!("bucket {:?} has no value", bucket.name))
            })?;
            let classifier = decode_classifier(bucket.classifier, registry)?;
            Bucket::new(bucket.name, classifier, value)
        })
        .collect::<Result<Vec<_>>>()?;

    for name in values.keys() {
        log::debug!(target: "offline_feature",
                    bucket = name.as_str();
                    "ignoring value for a bucket that does not exist");
    }

    Feature::new(wire.python_versions, buckets, wire.default)
}

fn decode_classifier(wire: ClassifierWire, registry: &AttributeRegistry) -> Result<Classifier> {
    let kind = ClassifierKind::from_tag(&wire.classifier_type)?;
    let tag = kind.tag();

    match kind {
        ClassifierKind::All | ClassifierKind::Any => {
            if wire.attribute.is_some() {
                return Err(Error::Decode(format!("{tag} does not take an attribute")));
            }
            let serde_json::Value::Array(children) = wire.value else {
                return Err(Error::Decode(format!(
                    "{tag} expects a list of classifiers"
                )));
            };
            let children = children
                .into_iter()
                .map(|child| {
                    let child =
                        ClassifierWire::deserialize(serde_stacker::Deserializer::new(child))?;
                    decode_classifier(child, registry)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(if kind == ClassifierKind::All {
                Classifier::All(children)
            } else {
                Classifier::Any(children)
            })
        }
        ClassifierKind::Compare(operator) => {
            let attribute = decode_required_attribute(wire.attribute, tag, registry)?;
            let value: Scalar = serde_json::from_value(wire.value)
                .map_err(|_| Error::Decode(format!("{tag} expects a scalar value")))?;
            Ok(Classifier::compare(operator, attribute, value))
        }
        ClassifierKind::RegexMatch => {
            let attribute = decode_required_attribute(wire.attribute, tag, registry)?;
            let serde_json::Value::String(pattern) = wire.value else {
                return Err(Error::Decode(format!("{tag} expects a pattern string")));
            };
            Ok(Classifier::RegexMatch {
                attribute,
                pattern: Pattern::new(pattern)?,
            })
        }
    }
}

fn decode_required_attribute(
    wire: Option<AttributeWire>,
    tag: &str,
    registry: &AttributeRegistry,
) -> Result<Attribute> {
    let wire = wire.ok_or_else(|| Error::Decode(format!("{tag} requires an attribute")))?;
    decode_attribute(wire, registry)
}

fn decode_attribute(wire: AttributeWire, registry: &AttributeRegistry) -> Result<Attribute> {
    if wire.attribute_type != CALLABLE_ATTRIBUTE {
        return Err(Error::Decode(format!(
            "unknown attribute type {:?}",
            wire.attribute_type
        )));
    }

    match wire.name.as_str() {
        HOSTNAME => Ok(Attribute::Hostname),
        SESSION_RANDOM => Ok(Attribute::SessionRandom),
        STATIC_NUMBER => wire
            .value
            .map(Attribute::StaticNumber)
            .ok_or_else(|| Error::Decode(format!("{STATIC_NUMBER} requires a numeric value"))),
        name if registry.contains(name) => Ok(Attribute::Callable(name.to_owned())),
        _ => Err(Error::UnknownAttribute(wire.name)),
    }
}

impl Serialize for Attribute {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Attribute::StaticNumber(n) => {
                let mut state = serializer.serialize_struct("Attribute", 3)?;
                state.serialize_field("type", CALLABLE_ATTRIBUTE)?;
                state.serialize_field("name", self.tag())?;
                state.serialize_field("value", n)?;
                state.end()
            }
            _ => {
                let mut state = serializer.serialize_struct("Attribute", 2)?;
                state.serialize_field("type", CALLABLE_ATTRIBUTE)?;
                state.serialize_field("name", self.tag())?;
                state.end()
            }
        }
    }
}

impl Serialize for Classifier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Classifier", 3)?;
        state.serialize_field("type", self.tag())?;
        match self {
            Classifier::All(children) | Classifier::Any(children) => {
                state.serialize_field("attribute", &None::<Attribute>)?;
                state.serialize_field("value", children)?;
            }
            Classifier::Compare {
                attribute, value, ..
            } => {
                state.serialize_field("attribute", attribute)?;
                state.serialize_field("value", value)?;
            }
            Classifier::RegexMatch { attribute, pattern } => {
                state.serialize_field("attribute", attribute)?;
                state.serialize_field("value", pattern.as_str())?;
            }
        }
        state.end()
    }
}

impl Serialize for Bucket {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Bucket", 3)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("classifier", self.classifier())?;
        state.serialize_field("value", self.value())?;
        state.end()
    }
}

impl Serialize for Feature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Feature", 4)?;
        state.serialize_field("type", &self.feature_type())?;
        state.serialize_field("python_versions", self.supported_versions())?;
        state.serialize_field("buckets", self.buckets())?;
        state.serialize_field("default", self.default_value())?;
        state.end()
    }
}
