//! Messaging gateway connector
//!
//! Talks to an Evolution-API-compatible HTTP gateway that hosts the actual
//! protocol session. Connection progress is obtained by polling the
//! instance state and replayed to the session manager as ordered
//! `ClientEvent`s.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::service::{ClientConnector, MessagingClient};
use super::types::{
    ClientError, ClientEvent, ConnectOptions, Connection, ConnectionUpdate, Credentials,
    DisconnectReason, SendReceipt,
};
use super::webhook;
use crate::config::GatewayConfig;

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    /// Raw pairing code to encode as QR
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionStateResponse {
    instance: InstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceState {
    state: String,
    status_reason: Option<u16>,
    owner_jid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SendTextResponse {
    key: Option<MessageKey>,
}

#[derive(Debug, Deserialize)]
struct MessageKey {
    id: Option<String>,
}

/// Shared HTTP plumbing for one gateway instance
#[derive(Clone)]
struct GatewayHttp {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GatewayHttp {
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn fetch_pairing_code(&self, instance: &str) -> Result<Option<String>, ClientError> {
        let resp: ConnectResponse = self
            .get_json(&format!("/instance/connect/{}", instance))
            .await?;
        Ok(resp.code.filter(|c| !c.is_empty()))
    }
}

/// Hands webhook deliveries to the event stream of the latest connection
#[derive(Clone, Default)]
pub struct GatewayInbound {
    current: Arc<Mutex<Option<InboundTarget>>>,
}

struct InboundTarget {
    instance: String,
    events: mpsc::Sender<ClientEvent>,
}

impl GatewayInbound {
    fn attach(&self, instance: &str, events: mpsc::Sender<ClientEvent>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(InboundTarget {
            instance: instance.to_string(),
            events,
        });
    }

    /// Stop routing into `events` if it is still the live connection
    fn detach(&self, events: &mpsc::Sender<ClientEvent>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current
            .as_ref()
            .is_some_and(|t| t.events.same_channel(events))
        {
            *current = None;
        }
    }

    /// Forward the messages in a webhook delivery. Returns how many were
    /// queued on the live connection.
    pub async fn deliver(&self, payload: &Value) -> usize {
        let messages = webhook::inbound_messages(payload);
        if messages.is_empty() {
            debug!("Ignoring gateway webhook event {:?}", webhook::event_name(payload));
            return 0;
        }

        let target = {
            let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            current
                .as_ref()
                .map(|t| (t.instance.clone(), t.events.clone()))
        };
        let Some((instance, events)) = target else {
            warn!("Dropping {} inbound message(s): no live connection", messages.len());
            return 0;
        };
        if let Some(other) = webhook::instance_name(payload)
            && other != instance
        {
            warn!("Dropping webhook for unknown instance {}", other);
            return 0;
        }

        let mut delivered = 0;
        for message in messages {
            if events.send(message).await.is_err() {
                debug!("Connection for {} already closed", instance);
                break;
            }
            delivered += 1;
        }
        delivered
    }
}

/// `ClientConnector` backed by a messaging gateway
pub struct GatewayConnector {
    http: GatewayHttp,
    config: GatewayConfig,
    inbound: GatewayInbound,
}

impl GatewayConnector {
    pub fn new(config: GatewayConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http: GatewayHttp {
                http,
                base_url: config.url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
            },
            config,
            inbound: GatewayInbound::default(),
        })
    }

    /// Sink for the gateway's webhook deliveries
    pub fn inbound(&self) -> GatewayInbound {
        self.inbound.clone()
    }
}

#[async_trait]
impl ClientConnector for GatewayConnector {
    async fn latest_version(&self) -> Result<Option<String>, ClientError> {
        let resp: VersionResponse = self.http.get_json("/").await?;
        Ok(resp.version)
    }

    async fn connect(
        &self,
        credentials: Credentials,
        options: ConnectOptions,
    ) -> Result<Connection, ClientError> {
        let instance = options.session_name.clone();
        info!(
            "Connecting gateway instance {} (version={:?}, browser={:?}, registered={})",
            instance, options.version, options.browser, credentials.registered
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.inbound.attach(&instance, tx.clone());

        let initial_code = self.http.fetch_pairing_code(&instance).await?;
        if let Some(ref code) = initial_code {
            debug!("Gateway issued pairing code for {}", instance);
            // Receiver is held locally, so this cannot fail
            let _ = tx
                .send(ClientEvent::Connection(ConnectionUpdate::pairing_code(
                    code.clone(),
                )))
                .await;
        }

        let poller = StatePoller {
            http: self.http.clone(),
            instance: instance.clone(),
            config: self.config.clone(),
            credentials,
            last_code: initial_code,
            inbound: self.inbound.clone(),
        };
        tokio::spawn(poller.run(tx));

        let client = GatewayClient {
            http: self.http.clone(),
            instance,
        };
        Ok(Connection {
            client: Arc::new(client),
            events: rx,
        })
    }
}

/// Polls the gateway instance state and turns changes into events
struct StatePoller {
    http: GatewayHttp,
    instance: String,
    config: GatewayConfig,
    credentials: Credentials,
    last_code: Option<String>,
    inbound: GatewayInbound,
}

impl StatePoller {
    async fn run(mut self, tx: mpsc::Sender<ClientEvent>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        let mut is_open = false;
        let mut last_code_at = Instant::now();

        loop {
            interval.tick().await;
            if tx.is_closed() {
                debug!("Event receiver for {} dropped, stopping poller", self.instance);
                self.inbound.detach(&tx);
                return;
            }

            let state: ConnectionStateResponse = match self
                .http
                .get_json(&format!("/instance/connectionState/{}", self.instance))
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    warn!("Connection state check for {} failed: {}", self.instance, e);
                    continue;
                }
            };

            let mut events = Vec::new();
            match state.instance.state.as_str() {
                "open" if !is_open => {
                    is_open = true;
                    self.last_code = None;
                    self.credentials.registered = true;
                    if state.instance.owner_jid.is_some() {
                        self.credentials.me = state.instance.owner_jid.clone();
                    }
                    events.push(ClientEvent::CredentialsUpdated(self.credentials.clone()));
                    events.push(ClientEvent::Connection(ConnectionUpdate::open()));
                }
                "open" => {}
                "close" => {
                    self.inbound.detach(&tx);
                    let reason = DisconnectReason::from_code(state.instance.status_reason);
                    let _ = tx
                        .send(ClientEvent::Connection(ConnectionUpdate::close(reason)))
                        .await;
                    return;
                }
                other => {
                    if is_open {
                        is_open = false;
                        info!("Gateway instance {} left open state ({})", self.instance, other);
                        events.push(ClientEvent::Connection(ConnectionUpdate::connecting()));
                    }
                    if last_code_at.elapsed() >= self.config.qr_refresh_interval {
                        last_code_at = Instant::now();
                        match self.http.fetch_pairing_code(&self.instance).await {
                            Ok(Some(code)) if self.last_code.as_ref() != Some(&code) => {
                                self.last_code = Some(code.clone());
                                events.push(ClientEvent::Connection(
                                    ConnectionUpdate::pairing_code(code),
                                ));
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Pairing code refresh failed: {}", e),
                        }
                    }
                }
            }

            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Client handle for one gateway instance
pub struct GatewayClient {
    http: GatewayHttp,
    instance: String,
}

#[async_trait]
impl MessagingClient for GatewayClient {
    async fn send_text(&self, address: &str, text: &str) -> Result<SendReceipt, ClientError> {
        let resp: SendTextResponse = self
            .http
            .post_json(
                &format!("/message/sendText/{}", self.instance),
                &json!({ "number": address, "text": text }),
            )
            .await?;
        Ok(SendReceipt {
            message_id: resp.key.and_then(|k| k.id),
        })
    }
}
