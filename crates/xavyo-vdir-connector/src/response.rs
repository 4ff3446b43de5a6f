//! Streaming search responses.
//!
//! Search results are pushed into a [`SearchResponse`] one at a time. A
//! sink may reject a result (for example once a size limit is reached) by
//! returning an error, which unwinds every join stage above it.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::SearchResult;
use crate::types::ResultCode;

/// Incremental sink for search results.
#[async_trait]
pub trait SearchResponse: Send {
    /// Deliver one result.
    async fn add(&mut self, result: SearchResult) -> ConnectorResult<()>;

    /// Finish the response with a result code.
    ///
    /// Called exactly once by the party that owns the response. Join stages
    /// that wrap a response never close it themselves.
    fn close(&mut self, code: ResultCode) {
        let _ = code;
    }
}

/// Response that collects every result in memory.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    results: Vec<SearchResult>,
    result_code: Option<ResultCode>,
}

impl BufferedResponse {
    /// Create an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Results received so far, in arrival order.
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Take ownership of the collected results.
    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }

    /// Code passed to `close`, if the response was closed.
    pub fn result_code(&self) -> Option<ResultCode> {
        self.result_code
    }

    /// Check if the response was closed.
    pub fn is_closed(&self) -> bool {
        self.result_code.is_some()
    }

    /// Number of results received.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if no result was received.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[async_trait]
impl SearchResponse for BufferedResponse {
    async fn add(&mut self, result: SearchResult) -> ConnectorResult<()> {
        if self.is_closed() {
            return Err(ConnectorError::internal("result added to a closed response"));
        }
        self.results.push(result);
        Ok(())
    }

    fn close(&mut self, code: ResultCode) {
        if let Some(previous) = self.result_code {
            warn!(previous = %previous, code = %code, "Response closed twice, ignoring");
            return;
        }
        self.result_code = Some(code);
    }
}

/// Wrapper that enforces a size limit on the wrapped response.
///
/// The first `limit` results pass through; the next one is refused with
/// [`ConnectorError::SizeLimitExceeded`]. A limit of 0 means unlimited.
pub struct LimitedResponse<'a> {
    inner: &'a mut dyn SearchResponse,
    limit: usize,
    sent: usize,
}

impl<'a> LimitedResponse<'a> {
    /// Wrap `inner` with a size limit.
    pub fn new(inner: &'a mut dyn SearchResponse, limit: usize) -> Self {
        Self {
            inner,
            limit,
            sent: 0,
        }
    }

    /// Results delivered to the wrapped response.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// The configured limit (0 = unlimited).
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[async_trait]
impl<'a> SearchResponse for LimitedResponse<'a> {
    async fn add(&mut self, result: SearchResult) -> ConnectorResult<()> {
        if self.limit > 0 && self.sent >= self.limit {
            return Err(ConnectorError::SizeLimitExceeded { limit: self.limit });
        }
        self.inner.add(result).await?;
        self.sent += 1;
        Ok(())
    }

    fn close(&mut self, code: ResultCode) {
        self.inner.close(code);
    }
}
