//! Google Sheets row sink (Sheets API v4, `values` endpoints).
//!
//! Column A holds the identity id. The id column is read once, then kept
//! in memory so each upsert costs a single request.

use super::{row_values, RowSink, RowUpsert};
use crate::error::AuditError;
use crate::models::{Identity, IdentityActivity};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Last column written by [`row_values`].
const LAST_COLUMN: char = 'F';

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

/// Row positions of known ids, loaded lazily.
#[derive(Debug, Default)]
struct RowIndex {
    rows: HashMap<String, usize>,
    /// Number of occupied rows, header included.
    used: usize,
}

impl RowIndex {
    fn from_column(values: &[Vec<String>]) -> Self {
        let mut rows = HashMap::new();
        for (idx, row) in values.iter().enumerate() {
            if let Some(id) = row.first() {
                if !id.is_empty() {
                    rows.entry(id.clone()).or_insert(idx + 1);
                }
            }
        }
        Self {
            rows,
            used: values.len(),
        }
    }
}

/// Upserts identity rows into one sheet of a spreadsheet.
pub struct SheetsSink {
    http_client: reqwest::Client,
    api_url: Url,
    spreadsheet_id: String,
    sheet_name: String,
    token: String,
    index: Mutex<Option<RowIndex>>,
}

impl SheetsSink {
    pub fn new(
        api_url: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, AuditError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| AuditError::Config(format!("invalid Sheets API URL {}: {}", api_url, e)))?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuditError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            token: token.to_string(),
            index: Mutex::new(None),
        })
    }

    /// `<api>/spreadsheets/<id>/values/<range>`
    fn values_url(&self, range: &str) -> Result<Url, AuditError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuditError::Config(format!("Sheets API URL {} cannot hold a path", self.api_url)))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    /// A1 range on this sheet; the name is always quoted.
    fn sheet_range(&self, cells: &str) -> String {
        format!("{}!{}", quote_sheet_name(&self.sheet_name), cells)
    }

    fn row_range(&self, row: usize) -> String {
        self.sheet_range(&format!("A{}:{}{}", row, LAST_COLUMN, row))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuditError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AuditError::Sink(format!("Sheets API error {}: {}", status, body.trim())))
    }

    async fn load_index(&self) -> Result<RowIndex, AuditError> {
        let url = self.values_url(&self.sheet_range("A:A"))?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AuditError::Sink(format!("failed to read id column: {}", e)))?;

        let range: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| AuditError::Sink(format!("unexpected id column response: {}", e)))?;

        let index = RowIndex::from_column(&range.values);
        debug!("Sheet {} holds {} rows", self.sheet_name, index.used);
        Ok(index)
    }

    async fn update_row(&self, row: usize, values: Vec<String>) -> Result<(), AuditError> {
        let range = self.row_range(row);
        let url = self.values_url(&range)?;
        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![values],
        };

        let response = self
            .http_client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuditError::Sink(format!("failed to update row {}: {}", row, e)))?;
        Self::check(response).await.map(|_| ())
    }

    async fn append_row(&self, values: Vec<String>) -> Result<(), AuditError> {
        let range = self.sheet_range(&format!("A:{}", LAST_COLUMN));
        let url = self.values_url(&format!("{}:append", range))?;
        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![values],
        };

        let response = self
            .http_client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuditError::Sink(format!("failed to append row: {}", e)))?;
        Self::check(response).await.map(|_| ())
    }
}

#[async_trait]
impl RowSink for SheetsSink {
    async fn upsert_row(
        &self,
        identity: &Identity,
        activity: &IdentityActivity,
    ) -> Result<RowUpsert, AuditError> {
        let mut guard = self.index.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_index().await?);
        }
        let index = match guard.as_mut() {
            Some(index) => index,
            None => return Err(AuditError::Sink("row index unavailable".to_string())),
        };

        let values = row_values(identity, activity);
        match index.rows.get(&identity.id).copied() {
            Some(row) => {
                self.update_row(row, values).await?;
                Ok(RowUpsert::Updated { row })
            }
            None => {
                self.append_row(values).await?;
                index.used += 1;
                index.rows.insert(identity.id.clone(), index.used);
                Ok(RowUpsert::Appended)
            }
        }
    }
}

/// Sheet names go inside single quotes in A1 notation, with `'` doubled.
fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
