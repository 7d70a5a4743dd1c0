use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use bytes::Bytes;
use prometheus::{opts, IntCounter, IntCounterVec, Registry};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::{
    alert::AlertGroup,
    settings::Settings,
    telegram::TelegramClient,
    translator::{AlertTranslator, OutboundMessage},
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for AlertReceiverSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9270,
        }
    }
}

impl AlertReceiverSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

struct Metrics {
    received: IntCounterVec,
    invalid: IntCounter,
}

impl Metrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let received = IntCounterVec::new(
            opts!("received_groups", "total number of deserialized alert groups")
                .namespace("alertgram")
                .subsystem("alertmanager_webhook"),
            &["status"],
        )?;

        let invalid = IntCounter::with_opts(
            opts!("invalid_payloads", "number of request bodies that failed to deserialize")
                .namespace("alertgram")
                .subsystem("alertmanager_webhook"),
        )?;

        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(invalid.clone()))?;

        Ok(Self { received, invalid })
    }

    fn record_received(&self, status: &str) {
        // alertmanager only knows these two, anything else is lumped together
        let status = match status {
            "firing" | "resolved" => status,
            _ => "other",
        };

        self.received.with_label_values(&[status]).inc();
    }
}

/// everything a request needs, built once at startup
pub struct State {
    translator: AlertTranslator,
    telegram: TelegramClient,
    metrics: Metrics,
}

impl State {
    pub fn new(settings: &Settings, registry: &Registry) -> Result<Self> {
        let telegram = TelegramClient::new(&settings.telegram, settings.key.clone(), registry)
            .context("failed to construct telegram client")?;

        let metrics = Metrics::new(registry).context("failed to register prometheus meters")?;

        Ok(Self {
            translator: AlertTranslator::new(settings.carry_over),
            telegram,
            metrics,
        })
    }

    /// Logs the account behind the bot token. Runs in the background so an
    /// unresponsive bot api can't hold back the listeners.
    pub fn spawn_account_check(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);

        tokio::spawn(async move {
            match state.telegram.get_me().await {
                Ok(user) => tracing::info!(
                    "authorized on account {}",
                    user.username.as_deref().unwrap_or(user.first_name.as_str())
                ),
                Err(err) => tracing::warn!(
                    "telegram bot not authorized, alerts can't be delivered: {}",
                    err
                ),
            }
        })
    }

    /// Delivers messages one after another. A failed delivery is logged and
    /// the remaining messages are still sent.
    async fn dispatch(&self, messages: Vec<OutboundMessage>) {
        for OutboundMessage { destination, text } in messages {
            tracing::info!("send message to {}", destination);

            if let Err(err) = self.telegram.send_message(&destination, &text).await {
                tracing::error!("failed to deliver alert to {}: {}", destination, err);
            }
        }
    }
}

async fn healthz() -> &'static str {
    "ok\n"
}

async fn alerts(
    Extension(state): Extension<Arc<State>>,
    method: Method,
    body: Bytes,
) -> Response {
    match method {
        Method::GET => (StatusCode::OK, Json("OK")).into_response(),
        Method::POST => receive_alerts(&state, &body).await.into_response(),
        _ => (StatusCode::BAD_REQUEST, "unsupported HTTP method").into_response(),
    }
}

async fn receive_alerts(state: &State, body: &[u8]) -> Response {
    let group = match AlertGroup::decode(body) {
        Ok(group) => group,
        Err(err) => {
            tracing::debug!("failed to deserialize alert: {:?}", err);
            state.metrics.invalid.inc();
            return (StatusCode::BAD_REQUEST, "invalid request body").into_response();
        }
    };

    tracing::info!("alert received: {}[{}]", group.alert_name(), group.status);
    state.metrics.record_received(&group.status);

    state.dispatch(state.translator.translate(&group)).await;

    StatusCode::OK.into_response()
}

pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/healthz", any(healthz))
        .route("/alerts", any(alerts))
        .layer(Extension(state))
}

pub async fn run_prometheus_receiver(settings: &AlertReceiverSettings, state: Arc<State>) -> Result<()> {
    let addr = settings.to_socket_addr();

    tracing::info!("listening for alertmanager webhooks on {}", addr);

    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await
        .context("prometheus endpoint crashed")?;

    Ok(())
}
