//! Firestore aggregation queries
//!
//! An [`AggregationQuery`] computes counts, sums and averages over the
//! documents matched by a [`Query`] without transferring the documents.
//! Each aggregation is named by an alias, under which its value is found in
//! the [`AggregationResult`].

use std::collections::HashMap;

use tracing::debug;

use super::query::Query;
use super::timestamp::Timestamp;
use super::value::{proto, Value, ValueType};
use crate::error::{FirestoreError, Result};

use proto::google::firestore::v1 as firestore_proto;
use firestore_proto::run_aggregation_query_request::QueryType as RequestQueryType;
use firestore_proto::structured_aggregation_query::aggregation::{Avg, Count, Operator, Sum};
use firestore_proto::structured_aggregation_query::{Aggregation, QueryType};
use firestore_proto::structured_query::FieldReference;
use firestore_proto::{RunAggregationQueryRequest, StructuredAggregationQuery};

#[derive(Debug, Clone, PartialEq)]
enum AggregationKind {
    Count,
    Sum(String),
    Avg(String),
}

#[derive(Debug, Clone, PartialEq)]
struct AggregationField {
    alias: String,
    kind: AggregationKind,
}

/// Aggregations over the results of a query
#[derive(Clone)]
pub struct AggregationQuery {
    query: Query,
    fields: Vec<AggregationField>,
}

impl AggregationQuery {
    pub(crate) fn new(query: Query) -> Self {
        Self {
            query,
            fields: Vec::new(),
        }
    }

    fn with(&self, alias: impl Into<String>, kind: AggregationKind) -> Self {
        let mut aq = self.clone();
        aq.fields.push(AggregationField {
            alias: alias.into(),
            kind,
        });
        aq
    }

    /// Count the matching documents under `alias`
    pub fn with_count(&self, alias: impl Into<String>) -> Self {
        self.with(alias, AggregationKind::Count)
    }

    /// Sum the numeric field at `path` under `alias`
    pub fn with_sum(&self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.with(alias, AggregationKind::Sum(path.into()))
    }

    /// Average the numeric field at `path` under `alias`
    pub fn with_avg(&self, path: impl Into<String>, alias: impl Into<String>) -> Self {
        self.with(alias, AggregationKind::Avg(path.into()))
    }

    pub(crate) fn request(&self) -> Result<RunAggregationQueryRequest> {
        if self.fields.is_empty() {
            return Err(FirestoreError::InvalidArgument(
                "aggregation query has no aggregations".to_string(),
            ));
        }

        let aggregations = self
            .fields
            .iter()
            .map(|field| {
                let field_ref = |path: &str| {
                    Some(FieldReference {
                        field_path: path.to_string(),
                    })
                };
                let operator = match &field.kind {
                    AggregationKind::Count => Operator::Count(Count::default()),
                    AggregationKind::Sum(path) => Operator::Sum(Sum {
                        field: field_ref(path),
                    }),
                    AggregationKind::Avg(path) => Operator::Avg(Avg {
                        field: field_ref(path),
                    }),
                };
                Aggregation {
                    alias: field.alias.clone(),
                    operator: Some(operator),
                }
            })
            .collect();

        Ok(RunAggregationQueryRequest {
            parent: self.query.parent_name().to_string(),
            query_type: Some(RequestQueryType::StructuredAggregationQuery(
                StructuredAggregationQuery {
                    aggregations,
                    query_type: Some(QueryType::StructuredQuery(
                        self.query.to_structured_query()?,
                    )),
                },
            )),
            ..Default::default()
        })
    }

    /// Run the aggregations
    pub async fn get(&self) -> Result<AggregationResult> {
        let request = self.request()?;
        debug!(parent = %request.parent, aggregations = self.fields.len(), "RunAggregationQuery");

        let mut stream = self
            .query
            .client
            .grpc()?
            .run_aggregation_query(request)
            .await?
            .into_inner();
        while let Some(response) = stream.message().await? {
            if let Some(result) = response.result {
                return Ok(AggregationResult {
                    fields: result.aggregate_fields,
                    read_time: response.read_time.map(Timestamp::from),
                });
            }
        }
        Err(FirestoreError::InvalidData(
            "aggregation query returned no result".to_string(),
        ))
    }
}

impl std::fmt::Debug for AggregationQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationQuery")
            .field("query", &self.query)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Values computed by an [`AggregationQuery`], keyed by alias
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    /// Aggregated values keyed by alias
    pub fields: HashMap<String, Value>,

    /// Time at which the aggregation was computed
    pub read_time: Option<Timestamp>,
}

impl AggregationResult {
    /// Value computed under `alias`
    pub fn value(&self, alias: &str) -> Result<&Value> {
        self.fields
            .get(alias)
            .ok_or_else(|| FirestoreError::FieldNotFound(alias.to_string()))
    }

    /// Count computed under `alias`
    ///
    /// Fails if no aggregation has that alias or its value is not an integer.
    pub fn count(&self, alias: &str) -> Result<i64> {
        match &self.value(alias)?.value_type {
            Some(ValueType::IntegerValue(count)) => Ok(*count),
            other => Err(FirestoreError::InvalidData(format!(
                "aggregation {:?} is not a count: {:?}",
                alias, other
            ))),
        }
    }
}
