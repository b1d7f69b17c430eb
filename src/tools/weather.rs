//! Weather lookup against a wttr.in-style endpoint

use super::{parse_input, Tool, ToolError, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WeatherTool {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WeatherInput {
    location: String,
}

impl WeatherTool {
    pub fn new(base_url: &str) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ToolError::Failed(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &'static str {
        super::names::GET_WEATHER
    }

    fn description(&self) -> String {
        "Get the current weather for a location (city name or place).".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["location"],
            "properties": {
                "location": { "type": "string", "description": "City or place name" }
            }
        })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let WeatherInput { location } = parse_input(input)?;
        let location = location.trim();
        if location.is_empty() {
            return Err(ToolError::InvalidInput("location is empty".to_string()));
        }

        let response = self
            .client
            .get(format!("{}/{location}", self.base_url))
            .query(&[("format", "3")])
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Weather request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to read weather response: {e}")))?;

        if !status.is_success() {
            return Err(ToolError::Failed(format!("Weather service returned {status}")));
        }
        Ok(ToolOutput::text(body.trim()))
    }
}
