use std::future::Future;
use std::path::{Path, PathBuf};

use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{StudentLookup, StudentRecord};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("record source answered with HTTP {0}")]
    Status(u16),
    #[error("record source unreachable: {0}")]
    Transport(String),
    #[error("record source sent an unreadable payload: {0}")]
    Malformed(String),
    #[error("could not read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
}

impl SourceQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize", page_size.to_string()));
        }
        pairs
    }
}

pub trait RecordSource {
    fn fetch(
        &self,
        query: &SourceQuery,
    ) -> impl Future<Output = Result<Vec<StudentRecord>, FetchError>> + Send;
}

#[derive(Debug, Default, PartialEq)]
pub struct DecodedRecords {
    pub records: Vec<StudentRecord>,
    pub skipped: usize,
}

/// Decodes each array element on its own so one bad entry cannot sink the rest.
pub fn decode_records(payload: Value) -> Result<DecodedRecords, FetchError> {
    let Value::Array(items) = payload else {
        return Err(FetchError::Malformed("expected a JSON array of students".into()));
    };

    let mut decoded = DecodedRecords::default();
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<StudentRecord>(item) {
            Ok(record) => decoded.records.push(record),
            Err(error) => {
                warn!(position, %error, "skipping malformed student record");
                decoded.skipped += 1;
            }
        }
    }
    Ok(decoded)
}

/// Backend over HTTP. Credentials are passed in, never read from ambient state.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRecordSource {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, FetchError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }

    /// Single-student search used by the submission form.
    pub async fn lookup(&self, exam_code: &str) -> Result<StudentLookup, FetchError> {
        let request = self.get("/student/search").query(&[("query", exam_code)]);
        let payload = self.get_json(request).await?;
        serde_json::from_value(payload).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

impl RecordSource for HttpRecordSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<StudentRecord>, FetchError> {
        let request = self.get("/student/").query(&query.pairs());
        let decoded = decode_records(self.get_json(request).await?)?;
        debug!(
            fetched = decoded.records.len(),
            skipped = decoded.skipped,
            "fetched student records"
        );
        Ok(decoded.records)
    }
}

/// JSON snapshot on disk, same shape as the backend list response.
#[derive(Debug, Clone)]
pub struct FileRecordSource {
    path: PathBuf,
}

impl FileRecordSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl RecordSource for FileRecordSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<StudentRecord>, FetchError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| FetchError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))?;
        let records = decode_records(payload)?.records;

        // Mirror server-side paging so the file stands in for the backend.
        match (query.page, query.page_size) {
            (Some(page), Some(size)) if size > 0 => Ok(records
                .into_iter()
                .skip(page.saturating_sub(1) as usize * size as usize)
                .take(size as usize)
                .collect()),
            (None, Some(size)) => Ok(records.into_iter().take(size as usize).collect()),
            _ => Ok(records),
        }
    }
}
