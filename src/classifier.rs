use std::cmp::Ordering;

use regex::Regex;

use crate::{
    value::{Scalar, ScalarKind},
    Attribute, AttributeRegistry, Error, Result,
};

/// A boolean expression guarding a [`Bucket`](crate::Bucket).
///
/// Classifiers are built with the constructor functions below and are immutable afterwards.
///
/// ```
/// # use offline_feature::{Attribute, Classifier};
/// let holdout = Classifier::all(vec![
///     Classifier::less_than(Attribute::SessionRandom, 0.1),
///     Classifier::regex_match(Attribute::Hostname, "^len.+").unwrap(),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Classifier {
    /// True iff every child is true. An empty list is true.
    All(Vec<Classifier>),
    /// True iff at least one child is true. An empty list is false.
    Any(Vec<Classifier>),
    /// Compare an attribute's value against a literal.
    Compare {
        /// How the two sides are compared.
        operator: ComparisonOperator,
        /// Left operand.
        attribute: Attribute,
        /// Right operand.
        value: Scalar,
    },
    /// Match a string attribute against a pattern anchored at the start.
    RegexMatch {
        /// Must evaluate to a string.
        attribute: Attribute,
        /// Pattern to match.
        pattern: Pattern,
    },
}

/// Comparison applied by [`Classifier::Compare`]. The attribute is always the left operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// `attribute < value`
    Lt,
    /// `attribute > value`
    Gt,
    /// `attribute <= value`
    Lte,
    /// `attribute >= value`
    Gte,
    /// `attribute == value`
    Eq,
}

/// Discriminator of a classifier variant, as written in the `type` field of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassifierKind {
    All,
    Any,
    Compare(ComparisonOperator),
    RegexMatch,
}

const CLASSIFIER_KINDS: [ClassifierKind; 8] = [
    ClassifierKind::All,
    ClassifierKind::Any,
    ClassifierKind::Compare(ComparisonOperator::Lt),
    ClassifierKind::Compare(ComparisonOperator::Gt),
    ClassifierKind::Compare(ComparisonOperator::Lte),
    ClassifierKind::Compare(ComparisonOperator::Gte),
    ClassifierKind::Compare(ComparisonOperator::Eq),
    ClassifierKind::RegexMatch,
];

impl ClassifierKind {
    pub(crate) fn from_tag(tag: &str) -> Result<ClassifierKind> {
        CLASSIFIER_KINDS
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| Error::UnknownClassifier(tag.to_owned()))
    }

    pub(crate) fn tag(self) -> &'static str {
        match self {
            ClassifierKind::All => "bool.all",
            ClassifierKind::Any => "bool.any",
            ClassifierKind::Compare(ComparisonOperator::Lt) => "comparison.lt",
            ClassifierKind::Compare(ComparisonOperator::Gt) => "comparison.gt",
            ClassifierKind::Compare(ComparisonOperator::Lte) => "comparison.lte",
            ClassifierKind::Compare(ComparisonOperator::Gte) => "comparison.gte",
            ClassifierKind::Compare(ComparisonOperator::Eq) => "comparison.eq",
            ClassifierKind::RegexMatch => "re.match",
        }
    }
}

impl ComparisonOperator {
    fn tag(self) -> &'static str {
        ClassifierKind::Compare(self).tag()
    }

    fn apply(self, left: &Scalar, right: &Scalar) -> Result<bool> {
        let tag = self.tag();
        if self == ComparisonOperator::Eq {
            return left.equals(right, tag);
        }
        let Some(ordering) = left.compare(right, tag)? else {
            return Ok(false);
        };
        Ok(match self {
            ComparisonOperator::Lt => ordering == Ordering::Less,
            ComparisonOperator::Gt => ordering == Ordering::Greater,
            ComparisonOperator::Lte => ordering != Ordering::Greater,
            ComparisonOperator::Gte => ordering != Ordering::Less,
            ComparisonOperator::Eq => ordering == Ordering::Equal,
        })
    }
}

/// A regular expression that only matches at the start of the input.
///
/// The source text is kept verbatim for serialization; equality compares sources.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile `source`. An invalid pattern is a [`Error::Decode`].
    pub fn new(source: impl Into<String>) -> Result<Pattern> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})"))
            .map_err(|err| Error::Decode(format!("invalid pattern {source:?}: {err}")))?;
        Ok(Pattern { source, regex })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Return `true` if the pattern matches a prefix of `haystack`.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Classifier {
    /// True iff all `children` are true.
    pub fn all(children: Vec<Classifier>) -> Classifier {
        Classifier::All(children)
    }

    /// True iff any of `children` is true.
    pub fn any(children: Vec<Classifier>) -> Classifier {
        Classifier::Any(children)
    }

    /// Compare `attribute` against `value` with `operator`.
    pub fn compare(
        operator: ComparisonOperator,
        attribute: Attribute,
        value: impl Into<Scalar>,
    ) -> Classifier {
        Classifier::Compare {
            operator,
            attribute,
            value: value.into(),
        }
    }

    /// `attribute < value`
    pub fn less_than(attribute: Attribute, value: impl Into<Scalar>) -> Classifier {
        Classifier::compare(ComparisonOperator::Lt, attribute, value)
    }

    /// `attribute > value`
    pub fn greater_than(attribute: Attribute, value: impl Into<Scalar>) -> Classifier {
        Classifier::compare(ComparisonOperator::Gt, attribute, value)
    }

    /// `attribute <= value`
    pub fn less_or_equal(attribute: Attribute, value: impl Into<Scalar>) -> Classifier {
        Classifier::compare(ComparisonOperator::Lte, attribute, value)
    }

    /// `attribute >= value`
    pub fn greater_or_equal(attribute: Attribute, value: impl Into<Scalar>) -> Classifier {
        Classifier::compare(ComparisonOperator::Gte, attribute, value)
    }

    /// `attribute == value`
    pub fn equal_to(attribute: Attribute, value: impl Into<Scalar>) -> Classifier {
        Classifier::compare(ComparisonOperator::Eq, attribute, value)
    }

    /// Match the string value of `attribute` against `pattern`, anchored at the start.
    pub fn regex_match(attribute: Attribute, pattern: impl Into<String>) -> Result<Classifier> {
        Ok(Classifier::RegexMatch {
            attribute,
            pattern: Pattern::new(pattern)?,
        })
    }

    pub(crate) fn kind(&self) -> ClassifierKind {
        match self {
            Classifier::All(_) => ClassifierKind::All,
            Classifier::Any(_) => ClassifierKind::Any,
            Classifier::Compare { operator, .. } => ClassifierKind::Compare(*operator),
            Classifier::RegexMatch { .. } => ClassifierKind::RegexMatch,
        }
    }

    /// Discriminator of this classifier in serialized documents.
    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }

    /// Evaluate the classifier.
    ///
    /// Children of `All`/`Any` are evaluated left to right and evaluation stops as soon as the
    /// result is known. Attribute failures and incomparable operands are returned as errors rather
    /// than folded into `false`.
    pub fn eval(&self, registry: &AttributeRegistry) -> Result<bool> {
        match self {
            Classifier::All(children) => {
                for child in children {
                    if !child.eval(registry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Classifier::Any(children) => {
                for child in children {
                    if child.eval(registry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Classifier::Compare {
                operator,
                attribute,
                value,
            } => operator.apply(&attribute.eval(registry)?, value),
            Classifier::RegexMatch { attribute, pattern } => {
                let value = attribute.eval(registry)?;
                let s = value.as_str().ok_or(Error::TypeMismatch {
                    operation: ClassifierKind::RegexMatch.tag(),
                    left: value.kind(),
                    right: ScalarKind::String,
                })?;
                Ok(pattern.is_match(s))
            }
        }
    }
}
