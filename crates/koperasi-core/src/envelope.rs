//! # Response Envelope
//!
//! Every list read leaves the engine as `{ data, pagination? }`, so the web
//! client never has to guess whether it got an array or a wrapper.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Page request for list reads. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            per_page: 50,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        PageRequest {
            page: page.max(1),
            per_page: per_page.clamp(1, 500),
        }
    }

    /// SQL `LIMIT`.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let per_page = i64::from(request.per_page.max(1));
        Pagination {
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

/// Typed response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    /// Envelope for a single record.
    pub fn single(data: T) -> Self {
        ApiResponse {
            data,
            pagination: None,
        }
    }

    /// Envelope for one page of a list.
    pub fn page(data: T, request: PageRequest, total: i64) -> Self {
        ApiResponse {
            data,
            pagination: Some(Pagination::new(request, total)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            pagination: self.pagination,
        }
    }
}
