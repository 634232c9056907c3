use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use super::{RecordSink, SinkError, SinkRecord};

/// Spreadsheet and worksheet a run appends to.
#[derive(Debug, Clone)]
pub struct SheetsTarget {
    pub spreadsheet_id: String,
    pub worksheet: String,
}

/// REST client for a Google-Sheets-compatible values API.
///
/// Authenticates with a pre-minted bearer token. The worksheet is created on
/// first use so a fresh spreadsheet needs no manual setup.
pub struct SheetsClient {
    client: HttpClient,
    token: String,
    base_url: String,
    target: SheetsTarget,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsClient {
    pub fn new(base_url: String, token: String, target: SheetsTarget) -> Result<Self, SinkError> {
        let client = HttpClient::builder().build()?;
        Ok(Self {
            client,
            token,
            base_url,
            target,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    async fn ensure_worksheet(&self) -> Result<(), SinkError> {
        let url = self.endpoint(&self.target.spreadsheet_id);
        let response = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = check_status(response, "spreadsheet metadata").await?;
        let metadata: SpreadsheetMetadata = response.json().await?;

        if metadata
            .sheets
            .iter()
            .any(|sheet| sheet.properties.title == self.target.worksheet)
        {
            return Ok(());
        }

        let url = self.endpoint(&format!("{}:batchUpdate", self.target.spreadsheet_id));
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": self.target.worksheet,
                        "gridProperties": { "rowCount": 1000, "columnCount": 10 }
                    }
                }
            }]
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check_status(response, "worksheet creation").await?;
        Ok(())
    }

    async fn append_row(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let url = self.endpoint(&format!(
            "{}/values/{}!A1:append",
            self.target.spreadsheet_id, self.target.worksheet
        ));
        let numeric = record
            .numeric
            .map(|value| value.to_string())
            .unwrap_or_default();
        let body = json!({
            "values": [[
                record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                record.raw,
                numeric,
            ]]
        });

        let response = self
            .client
            .post(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check_status(response, "row append").await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SheetsClient {
    fn name(&self) -> &'static str {
        "sheets"
    }

    async fn record(&self, record: &SinkRecord) -> Result<(), SinkError> {
        self.ensure_worksheet().await?;
        self.append_row(record).await
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, SinkError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable>".to_string());
        Err(SinkError::Api {
            context: context.to_string(),
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target() -> SheetsTarget {
        SheetsTarget {
            spreadsheet_id: "sheet-1".to_string(),
            worksheet: "returns".to_string(),
        }
    }

    fn sample_record() -> SinkRecord {
        SinkRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            raw: "7.97%".to_string(),
            numeric: Some(7.97),
        }
    }

    #[tokio::test]
    async fn appends_to_an_existing_worksheet() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sheet-1"))
            .and(query_param("fields", "sheets.properties.title"))
            .and(header("authorization", "Bearer sheets-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "title": "returns" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sheet-1/values/returns!A1:append"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .and(header("authorization", "Bearer sheets-token"))
            .and(body_json(json!({
                "values": [["2024-05-01T12:00:00Z", "7.97%", "7.97"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SheetsClient::new(server.uri(), "sheets-token".to_string(), target())
            .expect("client");
        client.record(&sample_record()).await.expect("append");
    }

    #[tokio::test]
    async fn creates_the_worksheet_when_missing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "title": "Sheet1" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sheet-1:batchUpdate"))
            .and(body_partial_json(json!({
                "requests": [{ "addSheet": { "properties": { "title": "returns" } } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sheet-1/values/returns!A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SheetsClient::new(server.uri(), "sheets-token".to_string(), target())
            .expect("client");
        client.record(&sample_record()).await.expect("append");
    }

    #[tokio::test]
    async fn api_rejection_carries_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sheet-1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let client = SheetsClient::new(server.uri(), "sheets-token".to_string(), target())
            .expect("client");
        let err = client
            .record(&sample_record())
            .await
            .expect_err("metadata fetch must fail");

        match err {
            SinkError::Api { status, body, .. } => {
                assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
                assert!(body.contains("permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparsed_values_append_an_empty_numeric_cell() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "title": "returns" } }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/sheet-1/values/returns!A1:append"))
            .and(body_json(json!({
                "values": [["2024-05-01T12:00:00Z", "N/A", ""]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let record = SinkRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            raw: "N/A".to_string(),
            numeric: None,
        };
        let client = SheetsClient::new(server.uri(), "sheets-token".to_string(), target())
            .expect("client");
        client.record(&record).await.expect("append");
    }
}
