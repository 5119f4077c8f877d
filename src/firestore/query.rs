//! Firestore Query type
//!
//! A `Query` is an immutable value: every filter, ordering and pagination
//! method returns a new `Query` and leaves the receiver untouched. Nothing is
//! sent until the query is executed with [`Query::documents`],
//! [`Query::snapshots`] or an aggregation, at which point the accumulated
//! state is rendered into a `google.firestore.v1.StructuredQuery`.

use std::fmt;
use std::str::FromStr;

use super::aggregate_query::AggregationQuery;
use super::client::Client;
use super::iterators::DocumentIterator;
use super::listener::QuerySnapshotIterator;
use super::value::{proto, Value};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1 as firestore_proto;
use firestore_proto::run_query_request::{ConsistencySelector, QueryType};
use firestore_proto::structured_query::composite_filter::Operator as CompositeFilterOp;
use firestore_proto::structured_query::field_filter::Operator as FieldFilterOp;
use firestore_proto::structured_query::filter::FilterType;
use firestore_proto::structured_query::unary_filter::{OperandType, Operator as UnaryFilterOp};
use firestore_proto::structured_query::{
    CollectionSelector, CompositeFilter, FieldFilter, FieldReference, Filter, Order, Projection,
    UnaryFilter,
};
use firestore_proto::target::QueryTarget;
use firestore_proto::{Cursor, RunQueryRequest, StructuredQuery};

/// Sort direction for query ordering
pub use firestore_proto::structured_query::Direction;

/// Field path naming the document id
pub const DOCUMENT_ID: &str = "__name__";

/// Comparison operator of a `where_` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `array-contains`
    ArrayContains,
    /// `array-contains-any`
    ArrayContainsAny,
    /// `in`
    In,
    /// `not-in`
    NotIn,
}

impl Operator {
    /// Operator as written in a filter expression
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::ArrayContains => "array-contains",
            Self::ArrayContainsAny => "array-contains-any",
            Self::In => "in",
            Self::NotIn => "not-in",
        }
    }

    fn to_proto(self) -> FieldFilterOp {
        match self {
            Self::LessThan => FieldFilterOp::LessThan,
            Self::LessThanOrEqual => FieldFilterOp::LessThanOrEqual,
            Self::GreaterThan => FieldFilterOp::GreaterThan,
            Self::GreaterThanOrEqual => FieldFilterOp::GreaterThanOrEqual,
            Self::Equal => FieldFilterOp::Equal,
            Self::NotEqual => FieldFilterOp::NotEqual,
            Self::ArrayContains => FieldFilterOp::ArrayContains,
            Self::ArrayContainsAny => FieldFilterOp::ArrayContainsAny,
            Self::In => FieldFilterOp::In,
            Self::NotIn => FieldFilterOp::NotIn,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = FirestoreError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "<" => Self::LessThan,
            "<=" => Self::LessThanOrEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanOrEqual,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "array-contains" => Self::ArrayContains,
            "array-contains-any" => Self::ArrayContainsAny,
            "in" => Self::In,
            "not-in" => Self::NotIn,
            other => {
                return Err(FirestoreError::InvalidArgument(format!(
                    "invalid operator {:?}",
                    other
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FieldCondition {
    path: String,
    op: Operator,
    value: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct Bound {
    values: Vec<Value>,
    /// Whether the bound is positioned before the matching document
    before: bool,
}

/// Immutable query over one collection (or a collection group)
#[derive(Clone)]
pub struct Query {
    pub(crate) client: Client,
    /// Full resource name of the parent: the documents root or a document
    parent: String,
    collection_id: String,
    all_descendants: bool,
    filters: Vec<FieldCondition>,
    orders: Vec<(String, Direction)>,
    limit: Option<i32>,
    limit_to_last: bool,
    offset: i32,
    start: Option<Bound>,
    end: Option<Bound>,
    projection: Option<Vec<String>>,
}

impl Query {
    pub(crate) fn new(
        client: Client,
        parent: String,
        collection_id: String,
        all_descendants: bool,
    ) -> Self {
        Self {
            client,
            parent,
            collection_id,
            all_descendants,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
            limit_to_last: false,
            offset: 0,
            start: None,
            end: None,
            projection: None,
        }
    }

    /// Keep documents whose field at `path` compares to `value` with `op`
    ///
    /// Several filters are combined with AND.
    pub fn where_(&self, path: impl Into<String>, op: Operator, value: impl Into<Value>) -> Query {
        let mut q = self.clone();
        q.filters.push(FieldCondition {
            path: path.into(),
            op,
            value: value.into(),
        });
        q
    }

    /// Order results by the field at `path`
    ///
    /// Later calls add secondary orderings.
    pub fn order_by(&self, path: impl Into<String>, direction: Direction) -> Query {
        let mut q = self.clone();
        q.orders.push((path.into(), direction));
        q
    }

    /// Return at most `n` results from the start of the result set
    pub fn limit(&self, n: i32) -> Query {
        let mut q = self.clone();
        q.limit = Some(n);
        q.limit_to_last = false;
        q
    }

    /// Return at most `n` results from the end of the result set
    ///
    /// Requires at least one `order_by`.
    pub fn limit_to_last(&self, n: i32) -> Query {
        let mut q = self.clone();
        q.limit = Some(n);
        q.limit_to_last = true;
        q
    }

    /// Skip the first `n` results
    pub fn offset(&self, n: i32) -> Query {
        let mut q = self.clone();
        q.offset = n;
        q
    }

    /// Start at the document whose ordered fields equal `values` (inclusive)
    pub fn start_at(&self, values: Vec<Value>) -> Query {
        self.with_start(values, true)
    }

    /// Start after the document whose ordered fields equal `values`
    pub fn start_after(&self, values: Vec<Value>) -> Query {
        self.with_start(values, false)
    }

    /// End at the document whose ordered fields equal `values` (inclusive)
    pub fn end_at(&self, values: Vec<Value>) -> Query {
        self.with_end(values, false)
    }

    /// End before the document whose ordered fields equal `values`
    pub fn end_before(&self, values: Vec<Value>) -> Query {
        self.with_end(values, true)
    }

    fn with_start(&self, values: Vec<Value>, before: bool) -> Query {
        let mut q = self.clone();
        q.start = Some(Bound { values, before });
        q
    }

    fn with_end(&self, values: Vec<Value>, before: bool) -> Query {
        let mut q = self.clone();
        q.end = Some(Bound { values, before });
        q
    }

    /// Return only the given field paths
    ///
    /// With no paths, only document names are returned.
    pub fn select<S: Into<String>>(&self, paths: impl IntoIterator<Item = S>) -> Query {
        let mut q = self.clone();
        let mut paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            paths.push(DOCUMENT_ID.to_string());
        }
        q.projection = Some(paths);
        q
    }

    /// Run the query, yielding matching documents one at a time
    pub fn documents(&self) -> DocumentIterator {
        DocumentIterator::new(self.clone(), None)
    }

    /// Listen for changes to the query's result set
    pub fn snapshots(&self) -> QuerySnapshotIterator {
        QuerySnapshotIterator::new(self.clone())
    }

    /// Start an aggregation over this query's results
    pub fn new_aggregation_query(&self) -> AggregationQuery {
        AggregationQuery::new(self.clone())
    }

    /// Full resource name of the query's parent
    pub fn parent_name(&self) -> &str {
        &self.parent
    }

    pub(crate) fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    pub(crate) fn limit_value(&self) -> Option<i32> {
        self.limit
    }

    /// Whether results must be reversed after reading (`limit_to_last`)
    pub(crate) fn is_limit_to_last(&self) -> bool {
        self.limit_to_last
    }

    /// Render the query in its wire form
    pub fn to_structured_query(&self) -> Result<StructuredQuery> {
        if self.limit_to_last && self.orders.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "limit_to_last requires at least one order_by".to_string(),
            ));
        }

        let mut filters: Vec<Filter> = self.filters.iter().map(render_filter).collect();
        let r#where = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter {
                filter_type: Some(FilterType::CompositeFilter(CompositeFilter {
                    op: CompositeFilterOp::And as i32,
                    filters,
                })),
            }),
        };

        let flip = |direction: Direction| match (self.limit_to_last, direction) {
            (true, Direction::Descending) => Direction::Ascending,
            (true, _) => Direction::Descending,
            (false, d) => d,
        };
        let order_by = self
            .orders
            .iter()
            .map(|(path, direction)| Order {
                field: Some(field_reference(path)),
                direction: flip(*direction) as i32,
            })
            .collect();

        let cursor = |bound: &Bound, flip_before: bool| Cursor {
            values: bound.values.clone(),
            before: bound.before != flip_before,
        };
        let (start_at, end_at) = if self.limit_to_last {
            (
                self.end.as_ref().map(|b| cursor(b, true)),
                self.start.as_ref().map(|b| cursor(b, true)),
            )
        } else {
            (
                self.start.as_ref().map(|b| cursor(b, false)),
                self.end.as_ref().map(|b| cursor(b, false)),
            )
        };

        Ok(StructuredQuery {
            select: self.projection.as_ref().map(|paths| Projection {
                fields: paths.iter().map(|p| field_reference(p)).collect(),
            }),
            from: vec![CollectionSelector {
                collection_id: self.collection_id.clone(),
                all_descendants: self.all_descendants,
            }],
            r#where,
            order_by,
            start_at,
            end_at,
            offset: self.offset,
            limit: self.limit,
            ..Default::default()
        })
    }

    pub(crate) fn run_query_request(&self, transaction: Option<Vec<u8>>) -> Result<RunQueryRequest> {
        Ok(RunQueryRequest {
            parent: self.parent.clone(),
            query_type: Some(QueryType::StructuredQuery(self.to_structured_query()?)),
            consistency_selector: transaction.map(ConsistencySelector::Transaction),
            ..Default::default()
        })
    }

    pub(crate) fn query_target(&self) -> Result<QueryTarget> {
        Ok(QueryTarget {
            parent: self.parent.clone(),
            query_type: Some(firestore_proto::target::query_target::QueryType::StructuredQuery(
                self.to_structured_query()?,
            )),
        })
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("parent", &self.parent)
            .field("collection_id", &self.collection_id)
            .field("all_descendants", &self.all_descendants)
            .field("filters", &self.filters)
            .field("orders", &self.orders)
            .field("limit", &self.limit)
            .field("limit_to_last", &self.limit_to_last)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

fn field_reference(path: &str) -> FieldReference {
    FieldReference {
        field_path: path.to_string(),
    }
}

fn render_filter(condition: &FieldCondition) -> Filter {
    let unary = match condition.op {
        Operator::Equal if condition.value.is_null() => Some(UnaryFilterOp::IsNull),
        Operator::Equal if condition.value.is_nan() => Some(UnaryFilterOp::IsNan),
        Operator::NotEqual if condition.value.is_null() => Some(UnaryFilterOp::IsNotNull),
        Operator::NotEqual if condition.value.is_nan() => Some(UnaryFilterOp::IsNotNan),
        _ => None,
    };

    let filter_type = match unary {
        Some(op) => FilterType::UnaryFilter(UnaryFilter {
            op: op as i32,
            operand_type: Some(OperandType::Field(field_reference(&condition.path))),
        }),
        None => FilterType::FieldFilter(FieldFilter {
            field: Some(field_reference(&condition.path)),
            op: condition.op.to_proto() as i32,
            value: Some(condition.value.clone()),
        }),
    };
    Filter {
        filter_type: Some(filter_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::client::test_client;

    fn field_filter(filter: &Filter) -> &FieldFilter {
        match filter.filter_type.as_ref() {
            Some(FilterType::FieldFilter(f)) => f,
            other => panic!("Expected FieldFilter, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Equal);
        assert_eq!("not-in".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!(Operator::ArrayContainsAny.to_string(), "array-contains-any");
        assert!("=~".parse::<Operator>().is_err());
    }

    #[tokio::test]
    async fn test_modifiers_leave_receiver_unchanged() {
        let base = test_client().collection("users");
        let filtered = base.where_("age", Operator::GreaterThan, 18i64);

        let base_query = base.to_structured_query().unwrap();
        assert!(base_query.r#where.is_none());

        let query = filtered.to_structured_query().unwrap();
        let filter = field_filter(query.r#where.as_ref().unwrap());
        assert_eq!(filter.field.as_ref().unwrap().field_path, "age");
        assert_eq!(filter.op, FieldFilterOp::GreaterThan as i32);
    }

    #[tokio::test]
    async fn test_filters_compose_with_and() {
        let query = test_client()
            .collection("users")
            .where_("age", Operator::GreaterThanOrEqual, 18i64)
            .where_("city", Operator::Equal, "Paris")
            .to_structured_query()
            .unwrap();

        let Some(FilterType::CompositeFilter(composite)) =
            query.r#where.and_then(|f| f.filter_type)
        else {
            panic!("Expected CompositeFilter");
        };
        assert_eq!(composite.op, CompositeFilterOp::And as i32);
        assert_eq!(composite.filters.len(), 2);
        assert_eq!(field_filter(&composite.filters[1]).field.as_ref().unwrap().field_path, "city");
    }

    #[tokio::test]
    async fn test_null_and_nan_become_unary_filters() {
        let users = test_client().collection("users");
        let cases = [
            (Operator::Equal, Value::null(), UnaryFilterOp::IsNull),
            (Operator::Equal, Value::from(f64::NAN), UnaryFilterOp::IsNan),
            (Operator::NotEqual, Value::null(), UnaryFilterOp::IsNotNull),
            (Operator::NotEqual, Value::from(f64::NAN), UnaryFilterOp::IsNotNan),
        ];

        for (op, value, expected) in cases {
            let query = users.where_("x", op, value).to_structured_query().unwrap();
            match query.r#where.and_then(|f| f.filter_type) {
                Some(FilterType::UnaryFilter(unary)) => assert_eq!(unary.op, expected as i32),
                other => panic!("Expected UnaryFilter, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_pagination_composes() {
        let query = test_client()
            .collection("users")
            .order_by("age", Direction::Ascending)
            .start_after(vec![Value::from(18i64)])
            .end_at(vec![Value::from(65i64)])
            .offset(5)
            .limit(10)
            .to_structured_query()
            .unwrap();

        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, 5);
        assert_eq!(query.order_by[0].direction, Direction::Ascending as i32);
        let start = query.start_at.unwrap();
        assert!(!start.before);
        assert_eq!(start.values, vec![Value::from(18i64)]);
        assert!(!query.end_at.unwrap().before);
    }

    #[tokio::test]
    async fn test_limit_to_last_reverses_order_and_cursors() {
        let query = test_client()
            .collection("users")
            .order_by("age", Direction::Ascending)
            .start_at(vec![Value::from(18i64)])
            .end_before(vec![Value::from(65i64)])
            .limit_to_last(3)
            .to_structured_query()
            .unwrap();

        assert_eq!(query.limit, Some(3));
        assert_eq!(query.order_by[0].direction, Direction::Descending as i32);

        let start = query.start_at.unwrap();
        assert_eq!(start.values, vec![Value::from(65i64)]);
        assert!(!start.before);

        let end = query.end_at.unwrap();
        assert_eq!(end.values, vec![Value::from(18i64)]);
        assert!(!end.before);
    }

    #[tokio::test]
    async fn test_limit_to_last_requires_order() {
        let result = test_client().collection("users").limit_to_last(3).to_structured_query();
        assert!(matches!(result, Err(FirestoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_select_without_paths_selects_names() {
        let users = test_client().collection("users");

        let names = users.select(Vec::<String>::new()).to_structured_query().unwrap();
        assert_eq!(names.select.unwrap().fields[0].field_path, DOCUMENT_ID);

        let some = users.select(["name", "age"]).to_structured_query().unwrap();
        assert_eq!(some.select.unwrap().fields.len(), 2);
    }

    #[tokio::test]
    async fn test_collection_group_selects_all_descendants() {
        let client = test_client();
        let query = client.collection_group("orders").to_structured_query().unwrap();
        assert!(query.from[0].all_descendants);
        assert_eq!(query.from[0].collection_id, "orders");
    }

    #[tokio::test]
    async fn test_subcollection_query_parent() {
        let client = test_client();
        let orders = client.doc("users/alice").collection("orders");
        let request = orders.run_query_request(Some(vec![1, 2])).unwrap();

        assert_eq!(
            request.parent,
            "projects/test-project/databases/(default)/documents/users/alice"
        );
        assert_eq!(
            request.consistency_selector,
            Some(ConsistencySelector::Transaction(vec![1, 2]))
        );
    }
}
