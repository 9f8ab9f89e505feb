//! Remote data-logging endpoint for probe readings.

use log::{info, warn};
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    ClientBuild(String),
    Network(String),
    Status(u16, String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::ClientBuild(msg) => write!(f, "Failed to create HTTP client: {}", msg),
            SinkError::Network(msg) => write!(f, "Network error: {}", msg),
            SinkError::Status(code, body) => write!(f, "Sink rejected reading ({}): {}", code, body),
        }
    }
}

impl std::error::Error for SinkError {}

/// Accepts one reading with its `YYYY-MM-DD HH:MM:SS` timestamp.
pub trait DataSink {
    fn post(&mut self, value: f32, timestamp: &str) -> Result<(), SinkError>;
}

impl<S: DataSink + ?Sized> DataSink for Box<S> {
    fn post(&mut self, value: f32, timestamp: &str) -> Result<(), SinkError> {
        (**self).post(value, timestamp)
    }
}

#[derive(Debug, Serialize)]
struct Reading<'a> {
    value: f32,
    timestamp: &'a str,
}

/// POSTs readings as JSON to a remote logging endpoint.
pub struct HttpDataSink {
    client: Client,
    url: String,
}

impl HttpDataSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SinkError::ClientBuild(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DataSink for HttpDataSink {
    fn post(&mut self, value: f32, timestamp: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Reading { value, timestamp })
            .send()
            .map_err(|e| SinkError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            Err(SinkError::Status(status.as_u16(), body))
        }
    }
}

/// Local fallback when no endpoint is configured.
#[derive(Debug, Default)]
pub struct LogSink;

impl DataSink for LogSink {
    fn post(&mut self, value: f32, timestamp: &str) -> Result<(), SinkError> {
        info!("Probe reading {:.2} °C at {}", value, timestamp);
        Ok(())
    }
}

/// Remote sink when a URL is configured, log sink otherwise.
pub fn sink_for(url: Option<&str>) -> Box<dyn DataSink> {
    match url.map(HttpDataSink::new) {
        Some(Ok(sink)) => {
            info!("Probe readings go to {}", sink.url());
            Box::new(sink)
        }
        Some(Err(e)) => {
            warn!("{}; logging probe readings locally", e);
            Box::new(LogSink)
        }
        None => Box::new(LogSink),
    }
}
