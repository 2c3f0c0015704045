//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{AccessToken, Sheet};
use crate::error::Res;
use anyhow::Context;
use sheets::types::{
    BatchUpdateValuesRequest, DateTimeRenderOption, Dimension, ValueInputOption, ValueRange,
    ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;

/// Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.
pub(crate) struct GoogleSheet {
    spreadsheet_id: String,
    client: sheets::Client,
}

impl GoogleSheet {
    pub(crate) fn new(spreadsheet_id: impl Into<String>, token: &AccessToken) -> Self {
        // The client wants OAuth app credentials for its own refresh flow, which is not used here.
        let client = sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            token.access_token().to_string(),
            String::new(),
        );
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn read(&mut self, range: &str) -> Res<Vec<Vec<String>>> {
        trace!("read {range}");
        let response = self
            .client
            .spreadsheets()
            .values_get(
                &self.spreadsheet_id,
                range,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to fetch {range}"))?;
        Ok(response.body.values)
    }

    async fn append(&mut self, rows: &[Vec<String>], range: &str) -> Res<()> {
        trace!("append {} rows to {range}", rows.len());
        let request = append_request(rows, range);

        self.client
            .spreadsheets()
            .values_batch_update(&self.spreadsheet_id, &request)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to write {range}"))?;
        Ok(())
    }
}

/// Values are stored as given; the sheet does not re-parse amounts, ids or dates in its own locale.
fn append_request(rows: &[Vec<String>], range: &str) -> BatchUpdateValuesRequest {
    BatchUpdateValuesRequest {
        data: vec![ValueRange {
            major_dimension: Some(Dimension::Rows),
            range: range.to_string(),
            values: rows.to_vec(),
        }],
        include_values_in_response: Some(false),
        response_date_time_render_option: None,
        response_value_render_option: None,
        value_input_option: Some(ValueInputOption::Raw),
    }
}

fn map_client_error(e: ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { .. } => "HttpError".to_string(),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(error_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_request_writes_raw_values() {
        let rows = vec![vec!["7".to_string(), "-12,30".to_string(), "02.01.2023".to_string()]];
        let request = append_request(&rows, "Transakcje!A2:C2");
        assert!(matches!(
            request.value_input_option,
            Some(ValueInputOption::Raw)
        ));
        assert_eq!(request.data.len(), 1);
        assert_eq!(request.data[0].range, "Transakcje!A2:C2");
        assert_eq!(request.data[0].values, rows);
    }
}
