mod device;
mod entities;
mod entity;
mod error;
mod frame;
mod http_server;
mod mdns;
mod proto;

mod api_server;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use api_server::NativeApiServer;
use device::{Device, DeviceConfig};
use entities::binary_sensor::BinarySensor;
use entities::listener::Listener;
use entities::switch::Switch;

/// Assembles one illustrative device — a binary sensor, a switch, and a
/// listener wiring the switch's state onto the sensor — mirroring
/// `aioesphomeserver`'s `basic_server.py` demo. A declarative, multi-device
/// config-file launcher is out of scope here.
fn build_demo_device(config: DeviceConfig) -> Arc<Device> {
    let device = Device::new(config);

    let motion = Arc::new(BinarySensor::new("Motion", &device.name, &device.mac_address, None, None));
    device.add_entity(motion.clone()).expect("motion sensor has a unique object_id");

    let lamp = Arc::new(Switch::new("Lamp", &device.name, &device.mac_address, None, None));
    device.add_entity(lamp.clone()).expect("lamp switch has a unique object_id");

    let listener = Arc::new(Listener::new(
        "Lamp Listener",
        &device.name,
        &device.mac_address,
        lamp.info().key(),
        motion,
    ));
    device.add_entity(listener).expect("listener has a unique object_id");

    device
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,esphome_sim=debug")),
        )
        .init();

    tracing::info!("Starting esphome-sim v{}", env!("CARGO_PKG_VERSION"));

    let api_port: u16 = std::env::var("ESPHOME_SIM_API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6053);
    let web_port: u16 = std::env::var("ESPHOME_SIM_WEB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let password = std::env::var("ESPHOME_SIM_PASSWORD").ok().filter(|p| !p.is_empty());

    let device = build_demo_device(DeviceConfig {
        name: std::env::var("ESPHOME_SIM_NAME").unwrap_or_else(|_| "esphome-sim".to_string()),
        model: Some("esphome-sim-virtual".to_string()),
        password,
        ..Default::default()
    });

    tracing::info!(
        name = %device.name,
        mac = %device.mac_address,
        entities = device.entity_count(),
        "device assembled"
    );

    let bus_pump = tokio::spawn(device.clone().run_bus_pump());

    let api_server = NativeApiServer::new(api_port, &device);
    device
        .add_entity(api_server.clone())
        .expect("native API server's reserved object_id is unique");
    let api_task = tokio::spawn(api_server.run());

    let http_app = http_server::router(device.clone());
    let http_listener = tokio::net::TcpListener::bind(("0.0.0.0", web_port)).await?;
    tracing::info!(port = web_port, "HTTP/SSE server listening");
    let http_task = tokio::spawn(
        axum::serve(http_listener, http_app).with_graceful_shutdown(shutdown_signal()),
    );

    let advertiser = mdns::MdnsAdvertiser::register(&device, api_port);

    tokio::select! {
        result = api_task => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "native API server exited"),
                Err(e) => tracing::error!(error = %e, "native API server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        result = http_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server task panicked");
            }
        }
    }

    bus_pump.abort();
    if let Some(advertiser) = advertiser {
        advertiser.unregister();
    }
    tracing::info!("esphome-sim shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}
