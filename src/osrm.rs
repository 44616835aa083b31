//! OSRM HTTP adapter for travel matrices.

use serde::{Deserialize, Serialize};

use crate::error::MatrixError;
use crate::traits::{DistanceMatrixProvider, TravelMatrix};

/// Placeholder cost for pairs OSRM cannot route between (one day).
const UNREACHABLE: i32 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    /// Build a client with the configured request timeout.
    pub fn new(config: OsrmConfig) -> Result<Self, MatrixError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, locations: &[(f64, f64)]) -> String {
        let coords = locations
            .iter()
            .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=duration,distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Result<TravelMatrix, MatrixError> {
        if locations.is_empty() {
            return Ok(TravelMatrix {
                durations: Vec::new(),
                distances: Vec::new(),
            });
        }

        let url = self.table_url(locations);
        tracing::debug!(locations = locations.len(), "requesting OSRM table");

        let response = self.client.get(url).send()?;
        let status = response.status();
        let body = response.text()?;
        parse_response(status, &body, locations.len())
    }
}

/// Decode a table response, keeping OSRM's own error for failed requests.
fn parse_response(status: reqwest::StatusCode, body: &str, expected: usize) -> Result<TravelMatrix, MatrixError> {
    if status.is_success() {
        return parse_table(body, expected);
    }
    // OSRM reports bad requests as a JSON body with a 4xx status.
    match serde_json::from_str::<OsrmTableResponse>(body) {
        Ok(response) if response.code != "Ok" => Err(MatrixError::Backend {
            code: response.code,
            message: response.message.unwrap_or_default(),
        }),
        _ => Err(MatrixError::Status(status)),
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

/// Decode an OSRM `table` response body for `expected` locations.
pub fn parse_table(body: &str, expected: usize) -> Result<TravelMatrix, MatrixError> {
    let response: OsrmTableResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        return Err(MatrixError::Backend {
            code: response.code,
            message: response.message.unwrap_or_default(),
        });
    }

    let durations = response
        .durations
        .ok_or(MatrixError::MissingAnnotation("durations"))?;
    let distances = response
        .distances
        .ok_or(MatrixError::MissingAnnotation("distances"))?;

    let matrix = TravelMatrix {
        durations: round_table(durations),
        distances: round_table(distances),
    };
    matrix.check_shape(expected)?;
    Ok(matrix)
}

fn round_table(table: Vec<Vec<Option<f64>>>) -> Vec<Vec<i32>> {
    table
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|value| value.map_or(UNREACHABLE, |v| v.round() as i32))
                .collect()
        })
        .collect()
}
