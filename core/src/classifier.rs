//! Failure classification for fault filtering
//!
//! Faults are tagged with a hierarchical [`Category`] (`io`, `io.timed_out`,
//! `http.server.503`, ...). A breaker's allow-list and deny-list are matched
//! against a fault's category and all of its ancestors to decide whether the
//! fault should count toward opening the circuit.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Hierarchical fault category
///
/// A category is a dotted path. Every dotted prefix of a category is one of
/// its ancestors, and [`Category::ANY`] is an ancestor of every category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(Cow<'static, str>);

impl Category {
    /// Matches every fault
    pub const ANY: Category = Category(Cow::Borrowed("*"));

    /// Category of faults that carry no finer classification
    pub const ERROR: Category = Category(Cow::Borrowed("error"));

    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self(path.into())
    }

    pub const fn from_static(path: &'static str) -> Self {
        Self(Cow::Borrowed(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` equals `ancestor` or descends from it
    pub fn is_a(&self, ancestor: &Category) -> bool {
        let (path, prefix) = (self.as_str(), ancestor.as_str());
        if prefix == "*" || path == prefix {
            return true;
        }
        path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.'
    }

    /// True if the category descends from any entry of `list`
    pub fn is_in<'a>(&self, list: impl IntoIterator<Item = &'a Category>) -> bool {
        list.into_iter().any(|entry| self.is_a(entry))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Category {
    fn from(path: &'static str) -> Self {
        Self::from_static(path)
    }
}

impl From<String> for Category {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// A fault that can report its category
///
/// # Examples
///
/// ```rust
/// use breakerbox::{Category, Fault};
///
/// #[derive(Debug)]
/// enum ApiError {
///     Server(u16),
///     BadRequest,
/// }
///
/// impl Fault for ApiError {
///     fn category(&self) -> Category {
///         match self {
///             ApiError::Server(code) => Category::new(format!("http.server.{code}")),
///             ApiError::BadRequest => Category::from_static("http.client"),
///         }
///     }
/// }
///
/// assert!(ApiError::Server(503).category().is_a(&"http.server".into()));
/// ```
pub trait Fault {
    fn category(&self) -> Category;
}

impl Fault for std::io::Error {
    fn category(&self) -> Category {
        io_category(self.kind())
    }
}

impl Fault for String {
    fn category(&self) -> Category {
        Category::ERROR
    }
}

impl Fault for &'static str {
    fn category(&self) -> Category {
        Category::ERROR
    }
}

impl Fault for Box<dyn std::error::Error + Send + Sync> {
    fn category(&self) -> Category {
        match self.downcast_ref::<std::io::Error>() {
            Some(io) => io.category(),
            None => Category::ERROR,
        }
    }
}

/// `io.<kind>` with the kind in snake_case, e.g. `io.connection_refused`
fn io_category(kind: std::io::ErrorKind) -> Category {
    let name = format!("{kind:?}");
    let mut path = String::with_capacity(name.len() + 8);
    path.push_str("io.");
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                path.push('_');
            }
            path.push(ch.to_ascii_lowercase());
        } else {
            path.push(ch);
        }
    }
    Category::new(path)
}

/// Context provided to failure classifiers for fault evaluation
#[derive(Debug)]
pub struct FailureContext<'a, E> {
    /// Circuit identifier
    pub circuit_id: &'a str,
    /// The fault raised by the wrapped operation
    pub fault: &'a E,
    /// Category reported by the fault
    pub category: Category,
    /// Duration of the failed call
    pub duration: Duration,
}

/// Trait for classifying failures - determines if a fault should count
/// toward opening the circuit
///
/// Faults that do not trip are still returned to the caller; they only leave
/// the breaker's counters untouched.
pub trait FailureClassifier<E>: Send + Sync + fmt::Debug {
    /// Returns `true` if the fault should count as a circuit error
    fn should_trip(&self, ctx: &FailureContext<'_, E>) -> bool;
}

/// Allow-list / deny-list classifier
///
/// - allow-listed categories (or descendants) never trip
/// - otherwise, with an empty deny-list every fault trips
/// - otherwise only deny-listed categories (or descendants) trip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListClassifier {
    deny: Vec<Category>,
    allow: Vec<Category>,
}

impl ListClassifier {
    pub fn new(deny: Vec<Category>, allow: Vec<Category>) -> Self {
        Self { deny, allow }
    }

    /// Decide whether a fault of `category` is a circuit error
    pub fn is_error(&self, category: &Category) -> bool {
        if category.is_in(&self.allow) {
            return false;
        }
        self.deny.is_empty() || category.is_in(&self.deny)
    }
}

impl<E> FailureClassifier<E> for ListClassifier {
    fn should_trip(&self, ctx: &FailureContext<'_, E>) -> bool {
        self.is_error(&ctx.category)
    }
}

/// Default classifier that trips on all faults
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<E> FailureClassifier<E> for DefaultClassifier {
    fn should_trip(&self, _ctx: &FailureContext<'_, E>) -> bool {
        true
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    /// Create a new predicate-based classifier
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> FailureClassifier<E> for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_, E>) -> bool + Send + Sync,
{
    fn should_trip(&self, ctx: &FailureContext<'_, E>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> fmt::Debug for PredicateClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}
