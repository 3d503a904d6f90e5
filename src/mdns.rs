//! mDNS advertisement: registers `_esphomelib._tcp.local.` with the
//! TXT properties upstream ESPHome clients expect, deregistering at
//! shutdown. Grounded on
//! `examples/original_source/aioesphomeserver/basic_entity.py`'s
//! `register_zeroconf`/`unregister_zeroconf` (property set, service-name
//! derivation), generalized from a per-entity call into one device-level
//! advertiser.

use crate::device::Device;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

const SERVICE_TYPE: &str = "_esphomelib._tcp.local.";

fn service_name(device_name: &str) -> String {
    let mut out = String::with_capacity(device_name.len());
    for ch in device_name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// Discover this host's LAN-facing address by connecting a UDP socket to a
/// non-routable address and reading back the local bound address, falling
/// back to loopback if that fails (no network, sandboxed test run, …).
fn local_ip() -> IpAddr {
    (|| -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("10.255.255.255:1")?;
        Ok(socket.local_addr()?.ip())
    })()
    .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// A registered mDNS advertisement. Dropping this does not unregister the
/// service — call `unregister` explicitly during shutdown, mirroring the
/// source's separate `unregister_zeroconf` step.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsAdvertiser {
    /// Register the device on the local network. Registration
    /// failure is logged and swallowed: mDNS is a discovery convenience,
    /// not a requirement for the native API or HTTP surfaces to function.
    pub fn register(device: &Arc<Device>, api_port: u16) -> Option<Self> {
        let daemon = match ServiceDaemon::new() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start mDNS daemon");
                return None;
            }
        };

        let host_ip = local_ip();
        let instance_name = service_name(&device.name);
        let hostname = format!("{instance_name}.local.");

        let mut properties = vec![
            ("network".to_string(), device.network.clone()),
            ("board".to_string(), device.board.clone()),
            ("platform".to_string(), device.platform.clone()),
            ("mac".to_string(), device.mac_address.clone()),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            (
                "friendly_name".to_string(),
                device.friendly_name.clone().unwrap_or_else(|| device.name.clone()),
            ),
            ("api_version".to_string(), "1.5.0".to_string()),
            ("manufacturer".to_string(), device.manufacturer.clone()),
            ("model".to_string(), device.model.clone().unwrap_or_default()),
            ("name".to_string(), device.name.clone()),
            ("project_name".to_string(), device.project_name.clone().unwrap_or_default()),
        ];
        properties.retain(|(_, v)| !v.is_empty());

        let service_info = match ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &hostname,
            host_ip,
            api_port,
            properties,
        ) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(error = %e, "failed to build mDNS service info");
                return None;
            }
        };

        let fullname = service_info.get_fullname().to_string();
        match daemon.register(service_info) {
            Ok(()) => {
                tracing::info!(%instance_name, %host_ip, port = api_port, "mDNS registration successful");
                Some(Self { daemon, fullname })
            }
            Err(e) => {
                tracing::error!(error = %e, "mDNS registration failed");
                None
            }
        }
    }

    /// Deregister at shutdown. Both calls return a
    /// receiver reporting async completion; this is best-effort teardown so
    /// the result is not awaited.
    pub fn unregister(&self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(_receiver) => {}
            Err(e) => tracing::warn!(error = %e, "mDNS unregistration failed"),
        }
        let _ = self.daemon.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_replaces_non_alphanumerics() {
        assert_eq!(service_name("Kitchen ESP-01"), "kitchen_esp_01");
    }
}
