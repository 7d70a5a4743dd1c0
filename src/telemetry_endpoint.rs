//! Here we expose prometheus metrics about alertgram
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryEndpointSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for TelemetryEndpointSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9271,
        }
    }
}

impl TelemetryEndpointSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

async fn metrics_handler(Extension(registry): Extension<Registry>) -> Response {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();

    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", err);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response()
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(Extension(registry))
}

pub async fn run_telemetry_endpoint(
    settings: &TelemetryEndpointSettings,
    registry: Registry,
) -> Result<()> {
    axum::Server::bind(&settings.to_socket_addr())
        .serve(router(registry).into_make_service())
        .await
        .context("telemetry endpoint crashed")?;

    Ok(())
}
