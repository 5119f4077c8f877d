use async_trait::async_trait;

use crate::error::Result;
use crate::firestore::{self, Timestamp, Value};

/// Counts, sums and averages over a query's results
#[async_trait]
pub trait AggregationQuery: Send + Sync {
    /// Count the matching documents under `alias`
    fn with_count(&self, alias: &str) -> Box<dyn AggregationQuery>;

    /// Sum the numeric field at `path` under `alias`
    fn with_sum(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery>;

    /// Average the numeric field at `path` under `alias`
    fn with_avg(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery>;

    /// Run the aggregations
    async fn get(&self) -> Result<Box<dyn AggregationResult>>;
}

/// Values computed by an aggregation query, keyed by alias
pub trait AggregationResult: Send + Sync {
    /// Count computed under `alias`
    ///
    /// Fails when no aggregation has that alias or its value is not an
    /// integer.
    fn count(&self, alias: &str) -> Result<i64>;

    /// Raw value computed under `alias`
    fn value(&self, alias: &str) -> Result<Value>;

    /// Time at which the aggregation was computed
    fn read_time(&self) -> Option<Timestamp>;
}

/// [`AggregationQuery`] backed by a [`firestore::AggregationQuery`]
#[derive(Debug, Clone)]
pub struct AggregationQueryAdapter {
    query: firestore::AggregationQuery,
}

impl AggregationQueryAdapter {
    /// Wrap `query`
    pub fn new(query: firestore::AggregationQuery) -> Self {
        Self { query }
    }
}

#[async_trait]
impl AggregationQuery for AggregationQueryAdapter {
    fn with_count(&self, alias: &str) -> Box<dyn AggregationQuery> {
        Box::new(Self::new(self.query.with_count(alias)))
    }

    fn with_sum(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery> {
        Box::new(Self::new(self.query.with_sum(path, alias)))
    }

    fn with_avg(&self, path: &str, alias: &str) -> Box<dyn AggregationQuery> {
        Box::new(Self::new(self.query.with_avg(path, alias)))
    }

    async fn get(&self) -> Result<Box<dyn AggregationResult>> {
        let result = self.query.get().await?;
        Ok(Box::new(AggregationResultAdapter::new(result)))
    }
}

/// [`AggregationResult`] backed by a [`firestore::AggregationResult`]
#[derive(Debug, Clone)]
pub struct AggregationResultAdapter {
    result: firestore::AggregationResult,
}

impl AggregationResultAdapter {
    /// Wrap `result`
    pub fn new(result: firestore::AggregationResult) -> Self {
        Self { result }
    }
}

impl AggregationResult for AggregationResultAdapter {
    fn count(&self, alias: &str) -> Result<i64> {
        self.result.count(alias)
    }

    fn value(&self, alias: &str) -> Result<Value> {
        self.result.value(alias).cloned()
    }

    fn read_time(&self) -> Option<Timestamp> {
        self.result.read_time
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::FirestoreError;

    #[test]
    fn test_count_returns_the_computed_value() {
        let result = AggregationResultAdapter::new(firestore::AggregationResult {
            fields: HashMap::from([("total".to_string(), Value::from(7i64))]),
            read_time: None,
        });

        assert_eq!(result.count("total").unwrap(), 7);
        assert!(matches!(result.count("other"), Err(FirestoreError::FieldNotFound(_))));
        assert_eq!(result.value("total").unwrap().as_i64(), Some(7));
    }
}
