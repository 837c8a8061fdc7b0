//! Query filters
//!
//! A [`QueryFilter`] is a tree of criteria joined by a boolean operator, plus
//! ordering and paging. Filters are serde-(de)serialisable from camelCase JSON so
//! a process can carry one as a string value, and they can be evaluated in memory
//! against a [`Record`].

use crate::domain::errors::QqqError;
use crate::domain::record::{Record, Value};
use crate::domain::Result;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator of a single criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Like,
    IsBlank,
    IsNotBlank,
    Between,
}

impl Operator {
    /// Number of values this operator expects, `None` for list operators
    fn expected_value_count(&self) -> Option<usize> {
        match self {
            Operator::IsBlank | Operator::IsNotBlank => Some(0),
            Operator::Between => Some(2),
            Operator::In | Operator::NotIn => None,
            _ => Some(1),
        }
    }
}

/// How the criteria and sub-filters of a filter are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BooleanOperator {
    #[default]
    And,
    Or,
}

/// A single `field <operator> values` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Field the condition applies to
    pub field_name: String,

    /// Comparison operator
    pub operator: Operator,

    /// Operand values
    #[serde(default)]
    pub values: Vec<Value>,
}

impl FilterCriteria {
    /// Create a criterion
    pub fn new(field_name: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            values,
        }
    }

    /// `field = value`
    pub fn equals(field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field_name, Operator::Equals, vec![value.into()])
    }

    /// `field IN (values)`
    pub fn in_list<I, V>(field_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            field_name,
            Operator::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// Check the operand count against the operator
    pub fn validate(&self) -> Result<()> {
        let ok = match self.operator.expected_value_count() {
            Some(n) => self.values.len() == n,
            None => !self.values.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(QqqError::Query(format!(
                "Operator {:?} on field '{}' cannot take {} value(s)",
                self.operator,
                self.field_name,
                self.values.len()
            )))
        }
    }

    /// Evaluate this criterion against a record
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.value_or_null(&self.field_name);
        let first = self.values.first();

        let compare_first = |wanted: fn(Ordering) -> bool| {
            first
                .and_then(|v| actual.compare(v))
                .map(wanted)
                .unwrap_or(false)
        };

        match self.operator {
            Operator::Equals => first.map(|v| actual.matches(v)).unwrap_or(false),
            Operator::NotEquals => first.map(|v| !actual.matches(v)).unwrap_or(false),
            Operator::In => self.values.iter().any(|v| actual.matches(v)),
            Operator::NotIn => !actual.is_null() && !self.values.iter().any(|v| actual.matches(v)),
            Operator::LessThan => compare_first(|o| o == Ordering::Less),
            Operator::LessThanOrEquals => compare_first(|o| o != Ordering::Greater),
            Operator::GreaterThan => compare_first(|o| o == Ordering::Greater),
            Operator::GreaterThanOrEquals => compare_first(|o| o != Ordering::Less),
            Operator::Like => match (actual, first) {
                (Value::Null, _) | (_, None) => false,
                (value, Some(pattern)) => like_matches(&value.to_string(), &pattern.to_string()),
            },
            Operator::IsBlank => actual.is_blank(),
            Operator::IsNotBlank => !actual.is_blank(),
            Operator::Between => match (self.values.first(), self.values.get(1)) {
                (Some(low), Some(high)) => {
                    matches!(actual.compare(low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(actual.compare(high), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            },
        }
    }
}

// SQL LIKE: `%` is any run of characters, `_` any single character, case-insensitive
fn like_matches(value: &str, pattern: &str) -> bool {
    let mut expression = String::from("^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if c == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');

    RegexBuilder::new(&expression)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Sort instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    /// Field to sort on
    pub field_name: String,

    /// Ascending when true
    #[serde(default = "default_true")]
    pub is_ascending: bool,
}

fn default_true() -> bool {
    true
}

/// Query filter
///
/// # Examples
///
/// ```
/// use qqq::domain::filter::{BooleanOperator, FilterCriteria, QueryFilter};
/// use qqq::domain::record::Record;
///
/// let filter = QueryFilter::new()
///     .with_criteria(FilterCriteria::equals("firstName", "Darin"))
///     .with_criteria(FilterCriteria::equals("firstName", "Tim"))
///     .with_boolean_operator(BooleanOperator::Or);
///
/// assert!(filter.matches(&Record::new().with_value("firstName", "Tim")));
/// assert!(!filter.matches(&Record::new().with_value("firstName", "James")));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    /// Criteria at this level
    #[serde(default)]
    pub criteria: Vec<FilterCriteria>,

    /// Operator joining criteria and sub-filters
    #[serde(default)]
    pub boolean_operator: BooleanOperator,

    /// Nested filters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_filters: Vec<QueryFilter>,

    /// Sort order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,

    /// Records to skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,

    /// Maximum records to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl QueryFilter {
    /// An empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a filter from its JSON form
    pub fn from_json_str(json: &str) -> Result<Self> {
        let filter: QueryFilter = serde_json::from_str(json)
            .map_err(|e| QqqError::Query(format!("Invalid query filter JSON: {e}")))?;
        filter.validate()?;
        Ok(filter)
    }

    /// Builder: add a criterion
    pub fn with_criteria(mut self, criteria: FilterCriteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    /// Builder: set the boolean operator
    pub fn with_boolean_operator(mut self, boolean_operator: BooleanOperator) -> Self {
        self.boolean_operator = boolean_operator;
        self
    }

    /// Builder: add a sub-filter
    pub fn with_sub_filter(mut self, sub_filter: QueryFilter) -> Self {
        self.sub_filters.push(sub_filter);
        self
    }

    /// Builder: add an order-by
    pub fn with_order_by(mut self, field_name: impl Into<String>, is_ascending: bool) -> Self {
        self.order_bys.push(OrderBy {
            field_name: field_name.into(),
            is_ascending,
        });
        self
    }

    /// Builder: set skip
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Builder: set limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether this filter has no conditions at any level
    pub fn has_no_conditions(&self) -> bool {
        self.criteria.is_empty() && self.sub_filters.iter().all(QueryFilter::has_no_conditions)
    }

    /// Validate operand counts throughout the tree
    pub fn validate(&self) -> Result<()> {
        for criteria in &self.criteria {
            criteria.validate()?;
        }
        for sub_filter in &self.sub_filters {
            sub_filter.validate()?;
        }
        Ok(())
    }

    /// Evaluate the filter's conditions against a record (ordering and paging ignored)
    pub fn matches(&self, record: &Record) -> bool {
        let mut outcomes = self
            .criteria
            .iter()
            .map(|c| c.matches(record))
            .chain(self.sub_filters.iter().map(|f| f.matches(record)))
            .peekable();

        if outcomes.peek().is_none() {
            return true;
        }

        match self.boolean_operator {
            BooleanOperator::And => outcomes.all(|m| m),
            BooleanOperator::Or => outcomes.any(|m| m),
        }
    }

    /// Sort records in place by this filter's order-bys
    pub fn sort(&self, records: &mut [Record]) {
        if self.order_bys.is_empty() {
            return;
        }
        records.sort_by(|a, b| {
            for order_by in &self.order_bys {
                let left = a.value_or_null(&order_by.field_name);
                let right = b.value_or_null(&order_by.field_name);
                let ordering = match (left.is_null(), right.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
                };
                let ordering = if order_by.is_ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}
