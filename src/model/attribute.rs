//! Attributes: typed value slots with modification policy and constraints

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::value::{TypedValue, ValueType};
use crate::{Error, Result};

/// How an attribute's value may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuePolicy {
    /// Value never changes after construction
    Fixed,
    /// Drivers may update the value; callers may not
    Updatable,
    /// Both drivers and callers may write the value
    Modifiable,
}

/// Who is performing a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A device driver pushing fresh state
    Driver,
    /// A northbound caller issuing SET
    Caller,
    /// A linked resource mirroring a value; bypasses the lock flag
    Mirror,
}

/// Value constraint checked on every write
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Numeric lower bound (inclusive)
    Min(f64),
    /// Numeric upper bound (inclusive)
    Max(f64),
    /// Value must equal one of the listed JSON values
    OneOf(Vec<Value>),
    /// String value must match the regex
    Pattern(Regex),
}

impl Constraint {
    /// Build a pattern constraint from a regex string
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| Error::InvalidValue(format!("bad pattern {pattern:?}: {e}")))
    }

    fn check(&self, value: &TypedValue) -> Result<()> {
        match self {
            Self::Min(bound) => match value.as_f64() {
                Some(v) if v >= *bound => Ok(()),
                _ => Err(Error::InvalidValue(format!(
                    "{} below minimum {bound}",
                    value.to_json()
                ))),
            },
            Self::Max(bound) => match value.as_f64() {
                Some(v) if v <= *bound => Ok(()),
                _ => Err(Error::InvalidValue(format!(
                    "{} above maximum {bound}",
                    value.to_json()
                ))),
            },
            Self::OneOf(allowed) => {
                let as_json = value.to_json();
                if allowed.contains(&as_json) {
                    Ok(())
                } else {
                    Err(Error::InvalidValue(format!("{as_json} not in allowed set")))
                }
            }
            Self::Pattern(re) => match value {
                TypedValue::Str(s) if re.is_match(s) => Ok(()),
                other => Err(Error::InvalidValue(format!(
                    "{} does not match {re}",
                    other.to_json()
                ))),
            },
        }
    }
}

/// Result of a successful attribute write
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Value before the write
    pub old: TypedValue,
    /// Value after the write
    pub new: TypedValue,
    /// Whether the stored value actually changed
    pub has_changed: bool,
    /// Instant recorded for the write
    pub timestamp: DateTime<Utc>,
}

/// A typed value slot on a resource
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    value_type: ValueType,
    policy: ValuePolicy,
    hidden: bool,
    locked: bool,
    value: TypedValue,
    timestamp: DateTime<Utc>,
    constraints: Vec<Constraint>,
}

impl Attribute {
    /// Create an attribute with no value written yet
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, policy: ValuePolicy) -> Self {
        Self {
            name: name.into(),
            value_type,
            policy,
            hidden: false,
            locked: false,
            value: TypedValue::Null,
            timestamp: Utc::now(),
            constraints: Vec::new(),
        }
    }

    /// Seed an initial value, bypassing policy (construction time only)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the value does not fit the type.
    pub fn with_value(mut self, raw: Value) -> Result<Self> {
        self.value = TypedValue::from_json(self.value_type, raw)?;
        self.timestamp = Utc::now();
        Ok(self)
    }

    /// Attach a constraint checked on every write
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Mark the attribute hidden: it never appears in descriptions and never
    /// emits notifications
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attribute name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Modification policy
    #[must_use]
    pub const fn policy(&self) -> ValuePolicy {
        self.policy
    }

    /// Whether the attribute is hidden
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether direct writes are currently rejected
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Lock or unlock the attribute (a trigger taking/releasing ownership)
    pub const fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Current value
    #[must_use]
    pub const fn value(&self) -> &TypedValue {
        &self.value
    }

    /// Instant of the last change
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Write a value, enforcing policy, lock and constraints.
    ///
    /// On success the timestamp is refreshed even if the value is identical;
    /// `has_changed` reports whether the stored value differs. On failure the
    /// prior value and timestamp are left untouched.
    ///
    /// # Errors
    ///
    /// [`Error::NotModifiable`] for FIXED slots (any origin) or caller writes
    /// to non-MODIFIABLE slots, [`Error::Locked`] when a trigger owns the
    /// value, [`Error::InvalidValue`] on type or constraint violation.
    pub fn write(
        &mut self,
        raw: Value,
        timestamp: DateTime<Utc>,
        origin: WriteOrigin,
    ) -> Result<UpdateOutcome> {
        match self.policy {
            ValuePolicy::Fixed => {
                return Err(Error::NotModifiable(self.name.clone()));
            }
            ValuePolicy::Updatable if origin == WriteOrigin::Caller => {
                return Err(Error::NotModifiable(self.name.clone()));
            }
            _ => {}
        }
        if self.locked && origin != WriteOrigin::Mirror {
            return Err(Error::Locked(self.name.clone()));
        }
        let new = TypedValue::from_json(self.value_type, raw)?;
        for constraint in &self.constraints {
            constraint.check(&new)?;
        }
        let old = std::mem::replace(&mut self.value, new.clone());
        let has_changed = old != new;
        self.timestamp = timestamp;
        Ok(UpdateOutcome {
            old,
            new,
            has_changed,
            timestamp,
        })
    }

    /// JSON description of the attribute
    #[must_use]
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "type": self.value_type.to_string(),
            "value": self.value.to_json(),
            "timestamp": self.timestamp.to_rfc3339(),
            "policy": self.policy,
            "locked": self.locked,
        })
    }
}
