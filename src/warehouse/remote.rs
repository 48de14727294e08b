//! Remote cloud warehouse backend.
//!
//! Talks to a warehouse HTTP gateway with bulk JSON uploads: one request
//! per batch instead of row-at-a-time inserts. The gateway is multi-writer
//! safe, but the orchestrator still serializes loads so both backends see
//! identical calling patterns. Schema provisioning is requested once per
//! process.

use std::time::Duration;

use log::{debug, info};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::WarehouseError;
use crate::ingest::EpochRecord;
use crate::warehouse::WarehouseClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// DDL shipped to the gateway's schema endpoint on first use
const ENSURE_STATEMENTS: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS SLEEP_EPOCHS (
        SUBJECT_ID INTEGER, EPOCH_IDX INTEGER, STAGE TEXT,
        DELTA_POWER FLOAT, THETA_POWER FLOAT, ALPHA_POWER FLOAT,
        SIGMA_POWER FLOAT, BETA_POWER FLOAT,
        LOAD_TIMESTAMP TIMESTAMP DEFAULT CURRENT_TIMESTAMP())",
    "CREATE TABLE IF NOT EXISTS INGESTION_ERRORS (
        ERROR_ID TEXT DEFAULT UUID_STRING(), SUBJECT_ID INTEGER,
        ERROR_TYPE TEXT, ERROR_MESSAGE TEXT, STACK_TRACE TEXT,
        OCCURRED_AT TIMESTAMP DEFAULT CURRENT_TIMESTAMP())",
];

#[derive(Serialize)]
struct EnsureSchemaRequest<'a> {
    statements: &'a [&'a str],
}

#[derive(Serialize)]
struct LoadEpochsRequest<'a> {
    subject_id: u32,
    overwrite: bool,
    rows: &'a [EpochRecord],
}

#[derive(Serialize)]
struct AppendErrorRequest<'a> {
    subject_id: u32,
    error_type: &'a str,
    error_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<&'a str>,
}

/// HTTP implementation of the warehouse client
pub struct RemoteWarehouse {
    base_url: String,
    token: Option<String>,
    client: Client,
    schema_ready: OnceCell<()>,
}

impl RemoteWarehouse {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, WarehouseError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| WarehouseError::ConnectionFailed {
                details: err.to_string(),
            })?;

        info!("[Warehouse] Remote gateway at {}", base_url);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
            schema_ready: OnceCell::new(),
        })
    }

    fn post<T: Serialize>(&self, endpoint: &str, payload: &T) -> Result<(), WarehouseError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self.client.post(&url).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(WarehouseError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn ensure_schema(&self) -> Result<(), WarehouseError> {
        self.schema_ready
            .get_or_try_init(|| {
                debug!("[Warehouse] Ensuring remote schema");
                self.post(
                    "v1/schema:ensure",
                    &EnsureSchemaRequest {
                        statements: &ENSURE_STATEMENTS,
                    },
                )
                .map_err(|err| WarehouseError::SchemaSetupFailed {
                    details: err.to_string(),
                })
            })
            .map(|_| ())
    }
}

impl WarehouseClient for RemoteWarehouse {
    fn load_epochs(
        &self,
        rows: &[EpochRecord],
        subject_id: u32,
        overwrite: bool,
    ) -> Result<(), WarehouseError> {
        self.ensure_schema()?;
        if rows.is_empty() && !overwrite {
            return Ok(());
        }
        debug!(
            "[Warehouse] Bulk upload: subject {}, {} rows, overwrite={}",
            subject_id,
            rows.len(),
            overwrite
        );
        self.post(
            "v1/epochs:load",
            &LoadEpochsRequest {
                subject_id,
                overwrite,
                rows,
            },
        )
    }

    fn log_ingestion_error(
        &self,
        subject_id: u32,
        error_type: &str,
        error_message: &str,
        stack_trace: Option<&str>,
    ) -> Result<(), WarehouseError> {
        self.ensure_schema()?;
        self.post(
            "v1/errors:append",
            &AppendErrorRequest {
                subject_id,
                error_type,
                error_message,
                stack_trace,
            },
        )
        .map_err(|err| WarehouseError::ErrorLogFailed {
            details: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SleepStage;

    #[test]
    fn base_url_is_normalized() {
        let client = RemoteWarehouse::new("https://wh.example.com/".to_string(), None).unwrap();
        assert_eq!(client.base_url, "https://wh.example.com");
    }

    #[test]
    fn load_payload_has_wire_shape() {
        let rows = vec![EpochRecord {
            subject_id: 1,
            epoch_idx: 0,
            stage: SleepStage::Rem,
            delta_power: -5.0,
            theta_power: 14.2,
            alpha_power: 8.0,
            sigma_power: 1.2,
            beta_power: 2.5,
        }];
        let payload = LoadEpochsRequest {
            subject_id: 1,
            overwrite: true,
            rows: &rows,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["subject_id"], 1);
        assert_eq!(json["overwrite"], true);
        assert_eq!(json["rows"][0]["stage"], "REM");
        assert_eq!(json["rows"][0]["delta_power"], -5.0);
    }

    #[test]
    fn error_payload_omits_absent_stack_trace() {
        let payload = AppendErrorRequest {
            subject_id: 2,
            error_type: "NoData",
            error_message: "no files",
            stack_trace: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("stack_trace").is_none());
    }
}
