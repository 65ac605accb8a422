use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{ApplianceControl, ControlError, DeviceRecord, DeviceState};

const DEFAULT_BASE_URL: &str = "https://api.mcs3.miele.com";
const TOKEN_PATH: &str = "/thirdparty/token";
const ACTION_START: u8 = 1;

/// Credentials and endpoint of the Miele 3rd-party API.
#[derive(Clone)]
pub struct MieleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    /// Country selector of the Miele@home account, e.g. `de-CH`.
    pub vg: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for MieleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            vg: "de-CH".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl std::fmt::Debug for MieleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MieleConfig")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("vg", &self.vg)
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct MieleClient {
    config: MieleConfig,
    http: Client,
    token: RwLock<String>,
}

impl MieleClient {
    /// Builds the HTTP client and obtains an access token with the password grant.
    pub async fn login(config: MieleConfig) -> Result<Self, ControlError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let token = fetch_token(&http, &config).await?;
        Ok(Self {
            config,
            http,
            token: RwLock::new(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn refresh_token(&self) -> Result<(), ControlError> {
        let token = fetch_token(&self.http, &self.config).await?;
        *self.token.write().await = token;
        Ok(())
    }

    /// Sends an authorized request, logging in again once if the token was rejected.
    async fn send<F>(&self, build: F) -> Result<Response, ControlError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.token.read().await.clone();
        let response = build(&self.http).bearer_auth(token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        warn!("miele token rejected, logging in again");
        self.refresh_token().await?;
        let token = self.token.read().await.clone();
        let response = build(&self.http).bearer_auth(token).send().await?;
        check_status(response).await
    }
}

async fn fetch_token(http: &Client, config: &MieleConfig) -> Result<String, ControlError> {
    let url = format!("{}{}", config.base_url.trim_end_matches('/'), TOKEN_PATH);
    let form = [
        ("grant_type", "password"),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("username", config.username.as_str()),
        ("password", config.password.as_str()),
        ("vg", config.vg.as_str()),
    ];

    let response = http.post(url).form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ControlError::Auth(format!("token request returned {status}: {body}")));
    }

    let token: TokenResponse = serde_json::from_str(&body)?;
    info!(expires_in = token.expires_in, "miele token acquired");
    Ok(token.access_token)
}

async fn check_status(response: Response) -> Result<Response, ControlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ControlError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ApplianceControl for MieleClient {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ControlError> {
        let url = self.url("/v1/devices");
        let body = self.send(|http| http.get(url.as_str())).await?.text().await?;
        let devices = parse_device_list(&body)?;
        debug!(count = devices.len(), "miele devices listed");
        Ok(devices)
    }

    async fn get_device_state(&self, id: &str) -> Result<DeviceState, ControlError> {
        let url = self.url(&format!("/v1/devices/{id}/state"));
        let body = self.send(|http| http.get(url.as_str())).await?.text().await?;
        parse_device_state(&body)
    }

    async fn start_device(&self, id: &str) -> Result<(), ControlError> {
        let url = self.url(&format!("/v1/devices/{id}/actions"));
        let action = serde_json::json!({ "processAction": ACTION_START });
        self.send(|http| http.put(url.as_str()).json(&action)).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    value_raw: Option<i64>,
    #[serde(default)]
    value_localized: Option<String>,
}

impl RawValue {
    fn code(&self) -> u16 {
        self.value_raw
            .and_then(|value| u16::try_from(value).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRemoteEnable {
    #[serde(default)]
    full_remote_control: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawState {
    #[serde(default)]
    status: RawValue,
    #[serde(default)]
    remote_enable: RawRemoteEnable,
}

impl From<RawState> for DeviceState {
    fn from(raw: RawState) -> Self {
        DeviceState {
            status: raw.status.code(),
            full_remote_control: raw.remote_enable.full_remote_control,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdentLabel {
    #[serde(default)]
    fab_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdent {
    #[serde(rename = "type", default)]
    device_type: RawValue,
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    device_ident_label: RawIdentLabel,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(default)]
    ident: RawIdent,
    #[serde(default)]
    state: RawState,
}

/// Parses the `GET /v1/devices` body, ordered by device id.
pub fn parse_device_list(body: &str) -> Result<Vec<DeviceRecord>, ControlError> {
    let raw: BTreeMap<String, RawDevice> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .map(|(key, device)| {
            let id = if device.ident.device_ident_label.fab_number.is_empty() {
                key
            } else {
                device.ident.device_ident_label.fab_number
            };
            let name = if !device.ident.device_name.is_empty() {
                device.ident.device_name
            } else {
                device
                    .ident
                    .device_type
                    .value_localized
                    .clone()
                    .unwrap_or_else(|| id.clone())
            };
            DeviceRecord {
                id,
                name,
                device_type: device.ident.device_type.code(),
                state: device.state.into(),
            }
        })
        .collect())
}

/// Parses the `GET /v1/devices/{id}/state` body.
pub fn parse_device_state(body: &str) -> Result<DeviceState, ControlError> {
    let raw: RawState = serde_json::from_str(body)?;
    Ok(raw.into())
}
