//! Query Module
//!
//! Filters, ordering and pagination understood by the remote store, plus the
//! page shape returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;

// == Filter Operator ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not-in")]
    NotIn,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
}

// == Filter ==
/// One `field operator value` condition. A query ANDs its filters in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(rename = "operator")]
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Shorthand for an equality filter.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

// == Ordering ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

// == Pagination ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: usize,
    /// Id of the last document of the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
}

impl Pagination {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            start_after: None,
            order_by: None,
        }
    }

    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

// == Query ==
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl Query {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            pagination: None,
        }
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.pagination.as_ref().map(|p| p.limit)
    }
}

// == Page ==
/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Document>,
    /// Cursor for the next page
    pub last_item_id: Option<String>,
    /// Heuristic: the page came back exactly full
    pub has_more: bool,
}

impl Page {
    /// Builds a page, deriving the cursor and `has_more` from the requested limit.
    pub fn from_items(items: Vec<Document>, limit: Option<usize>) -> Self {
        let has_more = matches!(limit, Some(limit) if limit > 0 && items.len() == limit);
        Self {
            last_item_id: items.last().map(|d| d.id.clone()),
            items,
            has_more,
        }
    }
}
