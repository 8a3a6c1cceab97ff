//! Query evaluation over in-memory documents.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::{Direction, Document, Filter, FilterOp, Query};

/// Orders two values of the same JSON type; `None` when they are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn contains(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|item| values_equal(item, needle))
}

fn matches(document: &Document, filter: &Filter) -> bool {
    // Documents lacking the field never match, not even `!=` or `not-in`.
    let Some(actual) = document.lookup(&filter.field) else {
        return false;
    };
    let expected = &filter.value;

    match filter.op {
        FilterOp::Eq => values_equal(&actual, expected),
        FilterOp::Ne => !values_equal(&actual, expected),
        FilterOp::Lt => compare_values(&actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare_values(&actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare_values(&actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare_values(&actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => expected
            .as_array()
            .is_some_and(|options| contains(options, &actual)),
        FilterOp::NotIn => expected
            .as_array()
            .is_some_and(|options| !contains(options, &actual)),
        FilterOp::ArrayContains => actual
            .as_array()
            .is_some_and(|items| contains(items, expected)),
        FilterOp::ArrayContainsAny => match (actual.as_array(), expected.as_array()) {
            (Some(items), Some(wanted)) => wanted.iter().any(|w| contains(items, w)),
            _ => false,
        },
    }
}

/// True if `document` satisfies every filter.
pub fn matches_all(document: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(document, filter))
}

/// Filters, orders and paginates `documents`.
///
/// Without an explicit ordering, results come back in id order. A `start_after`
/// cursor that is no longer in the ordered result yields an empty page when
/// ordering by a field; in id order it resumes at the next larger id.
pub fn run_query<'a, I>(documents: I, query: &Query) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut results: Vec<Document> = documents
        .into_iter()
        .filter(|doc| matches_all(doc, &query.filters))
        .cloned()
        .collect();

    let Some(pagination) = &query.pagination else {
        results.sort_by(|a, b| a.id.cmp(&b.id));
        return results;
    };

    match &pagination.order_by {
        Some(order) => {
            results.retain(|doc| doc.lookup(&order.field).is_some());
            results.sort_by(|a, b| {
                let left = a.lookup(&order.field).unwrap_or(Value::Null);
                let right = b.lookup(&order.field).unwrap_or(Value::Null);
                let ordering = compare_values(&left, &right)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }
        None => results.sort_by(|a, b| a.id.cmp(&b.id)),
    }

    if let Some(cursor) = &pagination.start_after {
        let position = results.iter().position(|doc| &doc.id == cursor);
        results = match (position, &pagination.order_by) {
            (Some(index), _) => results.split_off(index + 1),
            (None, None) => results.into_iter().filter(|doc| &doc.id > cursor).collect(),
            (None, Some(_)) => Vec::new(),
        };
    }

    results.truncate(pagination.limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fields, Pagination};
    use serde_json::json;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("a", "u1", Fields::new())
                .with_field("priority", json!(3))
                .with_field("status", json!("active"))
                .with_field("tags", json!(["safety", "brakes"])),
            Document::new("b", "u2", Fields::new())
                .with_field("priority", json!(1))
                .with_field("status", json!("planning"))
                .with_field("tags", json!(["ui"])),
            Document::new("c", "u1", Fields::new())
                .with_field("priority", json!(2.0))
                .with_field("status", json!("active")),
            Document::new("d", "u3", Fields::new()),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    fn query(filters: Vec<Filter>) -> Query {
        Query::new(filters)
    }

    #[test]
    fn test_equality_and_metadata_fields() {
        let docs = corpus();
        let active = run_query(&docs, &query(vec![Filter::eq("status", json!("active"))]));
        assert_eq!(ids(&active), vec!["a", "c"]);

        let mine = run_query(&docs, &query(vec![Filter::eq("createdBy", json!("u1"))]));
        assert_eq!(ids(&mine), vec!["a", "c"]);
    }

    #[test]
    fn test_not_equal_skips_missing_field() {
        let docs = corpus();
        let result = run_query(
            &docs,
            &query(vec![Filter::new("status", FilterOp::Ne, json!("active"))]),
        );
        assert_eq!(ids(&result), vec!["b"]);
    }

    #[test]
    fn test_range_compares_int_and_float() {
        let docs = corpus();
        let result = run_query(
            &docs,
            &query(vec![Filter::new("priority", FilterOp::Gte, json!(2))]),
        );
        assert_eq!(ids(&result), vec!["a", "c"]);
    }

    #[test]
    fn test_filters_are_anded() {
        let docs = corpus();
        let result = run_query(
            &docs,
            &query(vec![
                Filter::eq("status", json!("active")),
                Filter::new("priority", FilterOp::Lt, json!(3)),
            ]),
        );
        assert_eq!(ids(&result), vec!["c"]);
    }

    #[test]
    fn test_membership_operators() {
        let docs = corpus();
        let in_result = run_query(
            &docs,
            &query(vec![Filter::new("status", FilterOp::In, json!(["planning", "done"]))]),
        );
        assert_eq!(ids(&in_result), vec!["b"]);

        let contains = run_query(
            &docs,
            &query(vec![Filter::new("tags", FilterOp::ArrayContains, json!("safety"))]),
        );
        assert_eq!(ids(&contains), vec!["a"]);

        let any = run_query(
            &docs,
            &query(vec![Filter::new("tags", FilterOp::ArrayContainsAny, json!(["ui", "safety"]))]),
        );
        assert_eq!(ids(&any), vec!["a", "b"]);

        let not_in = run_query(
            &docs,
            &query(vec![Filter::new("status", FilterOp::NotIn, json!(["active"]))]),
        );
        assert_eq!(ids(&not_in), vec!["b"]);
    }

    #[test]
    fn test_order_limit_and_cursor() {
        let docs = corpus();
        let first = Query::default()
            .paginate(Pagination::new(2).order_by("priority", Direction::Desc));
        let page = run_query(&docs, &first);
        assert_eq!(ids(&page), vec!["a", "c"]);

        let second = Query::default().paginate(
            Pagination::new(2)
                .order_by("priority", Direction::Desc)
                .start_after("c"),
        );
        assert_eq!(ids(&run_query(&docs, &second)), vec!["b"]);
    }

    #[test]
    fn test_cursor_in_id_order_survives_deletion() {
        let docs = corpus();
        let q = Query::default().paginate(Pagination::new(10).start_after("bb"));
        assert_eq!(ids(&run_query(&docs, &q)), vec!["c", "d"]);
    }
}
