use std::{collections::HashMap, fmt, sync::Arc};

use rand::{thread_rng, Rng};

use crate::{
    value::{Number, Scalar},
    Error, Result,
};

/// Tag of the local host name attribute.
pub const HOSTNAME: &str = "socket.hostname";
/// Tag of the per-evaluation random draw attribute.
pub const SESSION_RANDOM: &str = "random.session";
/// Tag of the constant number attribute.
pub const STATIC_NUMBER: &str = "static.number";

const BUILTIN_TAGS: [&str; 3] = [HOSTNAME, SESSION_RANDOM, STATIC_NUMBER];

/// A nullary value producer used as the left operand of a classifier.
///
/// Attributes are plain values: evaluating one never changes it. Extension attributes are stored
/// by tag only and are looked up in an [`AttributeRegistry`] when evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Local host name as a string.
    Hostname,
    /// A float in `[0, 1)`, drawn anew on every evaluation.
    SessionRandom,
    /// A constant number.
    StaticNumber(Number),
    /// An extension attribute registered under this tag.
    Callable(String),
}

impl Attribute {
    /// Create a constant number attribute.
    ///
    /// ```
    /// # use offline_feature::Attribute;
    /// let one = Attribute::static_number(1);
    /// let half = Attribute::static_number(0.5);
    /// ```
    pub fn static_number(value: impl Into<Number>) -> Attribute {
        Attribute::StaticNumber(value.into())
    }

    /// Create a reference to an extension attribute.
    pub fn callable(tag: impl Into<String>) -> Attribute {
        Attribute::Callable(tag.into())
    }

    /// Stable tag identifying this attribute in serialized documents.
    pub fn tag(&self) -> &str {
        match self {
            Attribute::Hostname => HOSTNAME,
            Attribute::SessionRandom => SESSION_RANDOM,
            Attribute::StaticNumber(_) => STATIC_NUMBER,
            Attribute::Callable(tag) => tag,
        }
    }

    /// Produce the attribute's current value.
    pub fn eval(&self, registry: &AttributeRegistry) -> Result<Scalar> {
        match self {
            Attribute::Hostname => {
                let name = hostname::get().map_err(|err| Error::attribute(HOSTNAME, err))?;
                let name = name
                    .into_string()
                    .map_err(|_| Error::attribute(HOSTNAME, "host name is not valid UTF-8"))?;
                Ok(Scalar::String(name))
            }
            Attribute::SessionRandom => Ok(Scalar::Float(thread_rng().gen_range(0.0..1.0))),
            Attribute::StaticNumber(n) => Ok((*n).into()),
            Attribute::Callable(tag) => registry.get(tag)?.eval(),
        }
    }
}

/// Evaluator behind an extension attribute.
///
/// Implemented for any `Fn() -> Result<Scalar>`, so closures can be registered directly.
pub trait AttributeProvider {
    /// Produce the attribute's current value.
    fn eval(&self) -> Result<Scalar>;
}

impl<T: Fn() -> Result<Scalar>> AttributeProvider for T {
    fn eval(&self) -> Result<Scalar> {
        self()
    }
}

/// Table of extension attributes, keyed by tag.
///
/// Built once at start-up and handed to the [`Evaluator`](crate::Evaluator), which only reads
/// it. Built-in tags are always known and cannot be registered.
#[derive(Clone, Default)]
pub struct AttributeRegistry {
    extensions: HashMap<String, Arc<dyn AttributeProvider + Send + Sync>>,
}

impl AttributeRegistry {
    /// Create a registry that only knows the built-in attributes.
    pub fn new() -> Self {
        AttributeRegistry::default()
    }

    /// Register `provider` under `tag`.
    ///
    /// Registering a tag twice replaces the earlier provider. Built-in tags are rejected with
    /// [`Error::ReservedAttribute`].
    ///
    /// ```
    /// # use offline_feature::{AttributeRegistry, Scalar};
    /// let mut registry = AttributeRegistry::new();
    /// registry
    ///     .register("process.id", || Ok(Scalar::Integer(std::process::id().into())))
    ///     .unwrap();
    /// assert!(registry.contains("process.id"));
    /// ```
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        provider: impl Fn() -> Result<Scalar> + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        self.register_provider(tag, provider)
    }

    /// Register a non-closure `provider` under `tag`. Same rules as [`AttributeRegistry::register`].
    pub fn register_provider(
        &mut self,
        tag: impl Into<String>,
        provider: impl AttributeProvider + Send + Sync + 'static,
    ) -> Result<&mut Self> {
        let tag = tag.into();
        if BUILTIN_TAGS.contains(&tag.as_str()) {
            return Err(Error::ReservedAttribute(tag));
        }
        if self.extensions.insert(tag.clone(), Arc::new(provider)).is_some() {
            log::debug!(target: "offline_feature", tag = tag.as_str(); "replacing registered attribute");
        }
        Ok(self)
    }

    /// Return `true` if `tag` names a built-in or registered attribute.
    pub fn contains(&self, tag: &str) -> bool {
        BUILTIN_TAGS.contains(&tag) || self.extensions.contains_key(tag)
    }

    fn get(&self, tag: &str) -> Result<&(dyn AttributeProvider + Send + Sync)> {
        self.extensions
            .get(tag)
            .map(|provider| provider.as_ref())
            .ok_or_else(|| Error::UnknownAttribute(tag.to_owned()))
    }
}

impl fmt::Debug for AttributeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.extensions.keys().collect();
        tags.sort();
        f.debug_struct("AttributeRegistry")
            .field("extensions", &tags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribute, AttributeRegistry, HOSTNAME};
    use crate::{Error, Scalar};

    #[test]
    fn static_number_keeps_its_kind() {
        let registry = AttributeRegistry::new();
        assert_eq!(
            Attribute::static_number(1).eval(&registry).unwrap(),
            Scalar::Integer(1)
        );
        assert_eq!(
            Attribute::static_number(0.5).eval(&registry).unwrap(),
            Scalar::Float(0.5)
        );
    }

    #[test]
    fn session_random_is_in_unit_interval() {
        let registry = AttributeRegistry::new();
        for _ in 0..100 {
            match Attribute::SessionRandom.eval(&registry).unwrap() {
                Scalar::Float(f) => assert!((0.0..1.0).contains(&f)),
                other => panic!("expected a float, got {other:?}"),
            }
        }
    }

    #[test]
    fn session_random_is_not_cached() {
        let registry = AttributeRegistry::new();
        let draws: Vec<_> = (0..32)
            .map(|_| Attribute::SessionRandom.eval(&registry).unwrap())
            .collect();
        assert!(draws.iter().any(|d| d != &draws[0]));
    }

    #[test]
    fn hostname_is_a_string() {
        let registry = AttributeRegistry::new();
        let value = Attribute::Hostname.eval(&registry).unwrap();
        assert!(value.as_str().is_some());
    }

    #[test]
    fn unknown_callable_is_an_error() {
        let registry = AttributeRegistry::new();
        let err = Attribute::callable("no.such.tag")
            .eval(&registry)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute(tag) if tag == "no.such.tag"));
    }

    #[test]
    fn registered_callable_is_evaluated() {
        let mut registry = AttributeRegistry::new();
        registry.register("test.answer", || Ok(Scalar::Integer(42))).unwrap();
        assert!(registry.contains("test.answer"));
        assert_eq!(
            Attribute::callable("test.answer").eval(&registry).unwrap(),
            Scalar::Integer(42)
        );
    }

    #[test]
    fn duplicate_registration_replaces() {
        let mut registry = AttributeRegistry::new();
        registry
            .register("test.answer", || Ok(Scalar::Integer(1)))
            .unwrap()
            .register("test.answer", || Ok(Scalar::Integer(2)))
            .unwrap();
        assert_eq!(
            Attribute::callable("test.answer").eval(&registry).unwrap(),
            Scalar::Integer(2)
        );
    }

    #[test]
    fn builtin_tags_are_reserved() {
        let mut registry = AttributeRegistry::new();
        let err = registry
            .register(HOSTNAME, || Ok(Scalar::from("spoofed")))
            .unwrap_err();
        assert!(matches!(err, Error::ReservedAttribute(_)));
        assert!(registry.contains(HOSTNAME));
    }

    #[test]
    fn provider_errors_propagate() {
        let mut registry = AttributeRegistry::new();
        registry
            .register("test.broken", || Err(Error::attribute("test.broken", "boom")))
            .unwrap();
        let err = Attribute::callable("test.broken")
            .eval(&registry)
            .unwrap_err();
        assert!(matches!(err, Error::AttributeEvaluation { .. }));
    }
}
