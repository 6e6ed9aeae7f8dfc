//! Venue REST operations: position queries and cancel-all
//!
//! Used by the reconciliation loop (synchronous position fetch on its
//! own thread) and by the shutdown path (best-effort cancel of all
//! resting orders). Signing specifics stay behind the venue gateway;
//! this client only carries the key material as headers.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::position::PositionSource;

#[derive(Debug, Clone)]
pub struct RestCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

pub struct RestClient {
    base_url: String,
    instrument: String,
    credentials: RestCredentials,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    ok: bool,
    #[serde(default)]
    position: f64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct CancelAllResponse {
    ok: bool,
    #[serde(default)]
    msg: String,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        instrument: impl Into<String>,
        credentials: RestCredentials,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            base_url: base_url.into(),
            instrument: instrument.into(),
            credentials,
            client,
        })
    }

    /// Query the venue's reported position for the configured instrument.
    pub fn fetch_position(&self) -> Result<f64> {
        let url = format!("{}/v1/position", self.base_url);
        let response: PositionResponse = self
            .client
            .get(&url)
            .query(&[("instId", self.instrument.as_str())])
            .header("X-API-KEY", &self.credentials.api_key)
            .header("X-API-PASSPHRASE", &self.credentials.api_passphrase)
            .send()
            .context("position query failed")?
            .error_for_status()
            .context("position query returned error status")?
            .json()
            .context("position response was not valid json")?;

        if !response.ok {
            bail!("position query rejected: {}", response.msg);
        }
        Ok(response.position)
    }

    /// Best-effort cancel of every resting order on this venue. A
    /// failure is logged; there is no further automated action.
    pub fn cancel_all(&self) -> bool {
        let url = format!("{}/v1/cancel-all", self.base_url);
        let result = self
            .client
            .post(&url)
            .query(&[("instId", self.instrument.as_str())])
            .header("X-API-KEY", &self.credentials.api_key)
            .header("X-API-PASSPHRASE", &self.credentials.api_passphrase)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(anyhow::Error::from)
            .and_then(|response| {
                response
                    .json::<CancelAllResponse>()
                    .context("cancel-all response was not valid json")
            });

        match result {
            Ok(response) if response.ok => {
                info!(action = "cancel_all", instrument = %self.instrument, result = "pass");
                true
            }
            Ok(response) => {
                warn!(
                    action = "cancel_all",
                    instrument = %self.instrument,
                    result = "fail",
                    reason = %response.msg,
                );
                false
            }
            Err(err) => {
                warn!(
                    action = "cancel_all",
                    instrument = %self.instrument,
                    result = "fail",
                    error = %err,
                );
                false
            }
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }
}

impl PositionSource for RestClient {
    fn fetch_position(&self) -> Result<f64> {
        RestClient::fetch_position(self)
    }
}
