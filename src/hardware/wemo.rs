//! Belkin WeMo smart plug over UPnP SOAP.
//!
//! Only the `basicevent` service is used: `GetBinaryState` to read the relay
//! and `SetBinaryState` to drive it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::switch::{Switch, SwitchError};
use crate::domain::SwitchState;

pub const DEFAULT_PORT: u16 = 49153;
const CONTROL_PATH: &str = "/upnp/control/basicevent1";
const SERVICE: &str = "urn:Belkin:service:basicevent:1";

pub struct WemoSwitch {
    endpoint: String,
    client: reqwest::Client,
    cached: RwLock<Option<SwitchState>>,
}

impl WemoSwitch {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, SwitchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("heat-ctrl/0.3"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=\"utf-8\""),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SwitchError::Communication(e.to_string()))?;
        Ok(Self::with_client(
            format!("http://{host}:{port}{CONTROL_PATH}"),
            client,
        ))
    }

    pub fn with_client(endpoint: String, client: reqwest::Client) -> Self {
        Self {
            endpoint,
            client,
            cached: RwLock::new(None),
        }
    }

    async fn call(&self, action: &str, args: &str) -> Result<String, SwitchError> {
        let body = format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
                r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
                r#"<s:Body><u:{action} xmlns:u="{service}">{args}</u:{action}></s:Body>"#,
                r#"</s:Envelope>"#
            ),
            action = action,
            service = SERVICE,
            args = args,
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .header("SOAPACTION", format!("\"{SERVICE}#{action}\""))
            .body(body)
            .send()
            .await
            .map_err(|e| SwitchError::Communication(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SwitchError::Communication(e.to_string()))?;
        if !status.is_success() {
            return Err(SwitchError::Protocol(format!("{action}: HTTP {status}")));
        }
        Ok(text)
    }

    async fn set(&self, target: SwitchState) -> Result<(), SwitchError> {
        let value = match target {
            SwitchState::On => 1,
            SwitchState::Off => 0,
        };
        self.call(
            "SetBinaryState",
            &format!("<BinaryState>{value}</BinaryState>"),
        )
        .await?;
        *self.cached.write().await = Some(target);
        debug!(endpoint = %self.endpoint, state = %target, "wemo state set");
        Ok(())
    }
}

#[async_trait]
impl Switch for WemoSwitch {
    async fn get_state(&self, force_update: bool) -> Result<SwitchState, SwitchError> {
        if !force_update {
            if let Some(state) = *self.cached.read().await {
                return Ok(state);
            }
        }
        let body = self.call("GetBinaryState", "").await?;
        let state = parse_binary_state(&body)?;
        *self.cached.write().await = Some(state);
        Ok(state)
    }

    async fn on(&self) -> Result<(), SwitchError> {
        self.set(SwitchState::On).await
    }

    async fn off(&self) -> Result<(), SwitchError> {
        self.set(SwitchState::Off).await
    }
}

/// Extracts the relay state from a `GetBinaryState` response.
///
/// Insight plugs report `8` for "on, idle" and append `|`-separated power
/// figures; only the first field matters and anything non-zero is on.
pub fn parse_binary_state(body: &str) -> Result<SwitchState, SwitchError> {
    const OPEN: &str = "<BinaryState>";
    const CLOSE: &str = "</BinaryState>";

    let start = body
        .find(OPEN)
        .map(|i| i + OPEN.len())
        .ok_or_else(|| SwitchError::Protocol("no BinaryState in response".to_string()))?;
    let len = body[start..]
        .find(CLOSE)
        .ok_or_else(|| SwitchError::Protocol("unterminated BinaryState".to_string()))?;
    let raw = body[start..start + len].trim();
    let first = raw.split('|').next().unwrap_or(raw).trim();

    match first.parse::<u8>() {
        Ok(0) => Ok(SwitchState::Off),
        Ok(_) => Ok(SwitchState::On),
        Err(_) => Err(SwitchError::Protocol(format!("unexpected BinaryState '{raw}'"))),
    }
}
