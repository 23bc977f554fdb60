//! Subscription filters
//!
//! A filter is a (message-type set, path pattern, literal-or-regex flag,
//! constraint predicates) tuple. A message matches iff its path satisfies
//! the pattern, its type is in the set, and every constraint holds.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use super::message::{GatewayMessage, MessageType};
use crate::{Error, Result};

/// Predicate evaluated against a message payload, ANDed with the path and
/// type match
#[derive(Debug, Clone, PartialEq)]
pub enum MessageConstraint {
    /// Value-update messages must report an actual change
    HasChanged,
    /// The new value must equal the given JSON value
    NewValueEquals(Value),
    /// The new value must be numeric and strictly above the bound
    NewValueAbove(f64),
    /// The new value must be numeric and strictly below the bound
    NewValueBelow(f64),
}

impl MessageConstraint {
    fn holds(&self, message: &GatewayMessage) -> bool {
        let GatewayMessage::ValueUpdated {
            new, has_changed, ..
        } = message
        else {
            // Payload constraints only ever constrain value updates
            return true;
        };
        match self {
            Self::HasChanged => *has_changed,
            Self::NewValueEquals(expected) => new == expected,
            Self::NewValueAbove(bound) => new.as_f64().is_some_and(|v| v > *bound),
            Self::NewValueBelow(bound) => new.as_f64().is_some_and(|v| v < *bound),
        }
    }
}

/// A subscription filter
#[derive(Debug, Clone)]
pub struct MessageFilter {
    types: HashSet<MessageType>,
    pattern: String,
    literal: bool,
    regex: Option<Regex>,
    constraints: Vec<MessageConstraint>,
}

impl PartialEq for MessageFilter {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
            && self.pattern == other.pattern
            && self.literal == other.literal
            && self.constraints == other.constraints
    }
}

impl MessageFilter {
    /// Filter on a literal path.
    ///
    /// A literal filter matches the path itself and everything below it, so
    /// a resource-level subscription observes its attributes' updates.
    #[must_use]
    pub fn literal(path: impl Into<String>) -> Self {
        Self {
            types: HashSet::new(),
            pattern: path.into(),
            literal: true,
            regex: None,
            constraints: Vec::new(),
        }
    }

    /// Filter on a regex path pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] when the pattern does not compile.
    pub fn pattern(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::InvalidValue(format!("bad filter pattern {pattern:?}: {e}")))?;
        Ok(Self {
            types: HashSet::new(),
            pattern,
            literal: false,
            regex: Some(regex),
            constraints: Vec::new(),
        })
    }

    /// Restrict to the given message types; an empty set matches every type
    #[must_use]
    pub fn types(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Add a payload constraint (ANDed)
    #[must_use]
    pub fn constraint(mut self, constraint: MessageConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// The raw path pattern
    #[must_use]
    pub fn path_pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether `message` satisfies type, path and all constraints
    #[must_use]
    pub fn matches(&self, message: &GatewayMessage) -> bool {
        if !self.types.is_empty() && !self.types.contains(&message.message_type()) {
            return false;
        }
        if !self.path_matches(message.path()) {
            return false;
        }
        self.constraints.iter().all(|c| c.holds(message))
    }

    fn path_matches(&self, path: &str) -> bool {
        if self.literal {
            let pattern = self.pattern.trim_end_matches('/');
            path == pattern
                || path
                    .strip_prefix(pattern)
                    .is_some_and(|rest| rest.starts_with('/'))
        } else {
            self.regex.as_ref().is_some_and(|re| re.is_match(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn update(path: &str, new: Value, has_changed: bool) -> GatewayMessage {
        GatewayMessage::ValueUpdated {
            path: path.into(),
            old: Value::Null,
            new,
            timestamp: Utc::now(),
            has_changed,
            description: Value::Null,
        }
    }

    #[test]
    fn literal_filter_covers_subtree() {
        let filter = MessageFilter::literal("/p1/s1/temp");
        assert!(filter.matches(&update("/p1/s1/temp", json!(1), true)));
        assert!(filter.matches(&update("/p1/s1/temp/value", json!(1), true)));
        assert!(!filter.matches(&update("/p1/s1/temperature", json!(1), true)));
        assert!(!filter.matches(&update("/p1/s2/temp", json!(1), true)));
    }

    #[test]
    fn regex_filter_matches_pattern() {
        let filter = MessageFilter::pattern("^/p\\d+/s1/.*$").unwrap();
        assert!(filter.matches(&update("/p7/s1/temp/value", json!(1), true)));
        assert!(!filter.matches(&update("/px/s1/temp", json!(1), true)));
        assert!(MessageFilter::pattern("([").is_err());
    }

    #[test]
    fn type_set_restricts_matching() {
        let filter = MessageFilter::literal("/p1").types([MessageType::LifecycleDisappearing]);
        assert!(!filter.matches(&update("/p1/s1/temp", json!(1), true)));
        assert!(filter.matches(&GatewayMessage::Disappearing {
            path: "/p1".into(),
            entity: crate::notify::EntityKind::Provider,
        }));
    }

    #[test]
    fn constraints_are_anded() {
        let filter = MessageFilter::literal("/p1/s1/temp")
            .constraint(MessageConstraint::HasChanged)
            .constraint(MessageConstraint::NewValueAbove(20.0));
        assert!(filter.matches(&update("/p1/s1/temp/value", json!(21.5), true)));
        assert!(!filter.matches(&update("/p1/s1/temp/value", json!(21.5), false)));
        assert!(!filter.matches(&update("/p1/s1/temp/value", json!(19.0), true)));
    }

    #[test]
    fn zero_constraints_match_on_path_and_type_alone() {
        let filter = MessageFilter::literal("/p1/s1/temp");
        assert!(filter.matches(&update("/p1/s1/temp/value", json!(21.5), false)));
    }
}
