//! Wildcard filters for catalog queries
//!
//! Every catalog query takes one [`Filter`] per field. `Filter::Any` matches
//! all values of the field; it never means "entities lacking the field".
//!
//! The CLI accepts the same filters as an expression:
//! - `node=/talker`
//! - `node=/talker,topic=/chatter`
//! - `period=1000000000` (timers only)

use crate::error::{Result, TraceError};

/// Explicit match-all / match-one filter for a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter<T> {
    Any,
    Only(T),
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Filter::Any => true,
            Filter::Only(expected) => expected == value,
        }
    }
}

impl<T> Filter<T> {
    pub fn is_any(&self) -> bool {
        matches!(self, Filter::Any)
    }
}

impl<T> From<Option<T>> for Filter<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Filter::Only(v),
            None => Filter::Any,
        }
    }
}

/// Parsed filter expression for the list commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    node_name: Option<String>,
    topic_name: Option<String>,
    period_ns: Option<u64>,
}

impl QueryFilter {
    /// Filter that matches every entity
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse an expression like `node=/talker,topic=/chatter`
    pub fn from_expr(expr: &str) -> Result<Self> {
        let mut filter = Self::default();

        for part in expr.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let Some((key, value)) = part.split_once('=') else {
                return Err(TraceError::InvalidFilter(format!(
                    "{}: expected KEY=VALUE",
                    part
                )));
            };
            let value = value.trim();
            if value.is_empty() {
                return Err(TraceError::InvalidFilter(format!(
                    "{}: empty value",
                    part
                )));
            }

            match key.trim() {
                "node" => filter.node_name = Some(value.to_string()),
                "topic" => filter.topic_name = Some(value.to_string()),
                "period" => {
                    let period = value.parse::<u64>().map_err(|_| {
                        TraceError::InvalidFilter(format!(
                            "{}: period must be an integer number of nanoseconds",
                            part
                        ))
                    })?;
                    filter.period_ns = Some(period);
                }
                other => {
                    return Err(TraceError::InvalidFilter(format!(
                        "unknown key '{}' (expected node, topic or period)",
                        other
                    )))
                }
            }
        }

        Ok(filter)
    }

    pub fn node(&self) -> Filter<&str> {
        self.node_name.as_deref().into()
    }

    pub fn topic(&self) -> Filter<&str> {
        self.topic_name.as_deref().into()
    }

    pub fn period(&self) -> Filter<u64> {
        self.period_ns.into()
    }
}
