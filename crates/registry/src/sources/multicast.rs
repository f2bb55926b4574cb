// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UDP multicast beacon: peers announce themselves on a group address.
//!
//! Announcements are JSON datagrams of shape
//! `{"type":"mcp_announcement","name":…,"port":…,"url"?:…,"protocol"?:…}`
//! and register an HTTP descriptor at the sender's address unless the
//! announcement carries an explicit URL.

use crate::registry::McpRegistry;
use sb_core::{DiscoverySource, McpDescriptor, OrchestratorError, Transport};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Default group and port used when the environment config names none.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 41, 42);
pub const DEFAULT_PORT: u16 = 41_420;

const ANNOUNCEMENT_TYPE: &str = "mcp_announcement";

#[derive(Debug, Deserialize)]
struct Announcement {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
}

/// Parse one datagram into a descriptor, if it is a valid announcement.
pub fn descriptor_from_announcement(payload: &[u8], sender: IpAddr) -> Option<McpDescriptor> {
    let announcement: Announcement = match serde_json::from_slice(payload) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed multicast datagram");
            return None;
        }
    };
    if announcement.kind != ANNOUNCEMENT_TYPE || announcement.name.is_empty() {
        return None;
    }

    let url = match announcement.url {
        Some(url) if !url.is_empty() => url,
        _ => {
            let port = announcement.port?;
            let scheme = match announcement.protocol.as_deref() {
                Some("https") => "https",
                _ => "http",
            };
            format!("{scheme}://{sender}:{port}")
        }
    };
    Some(McpDescriptor::new(
        announcement.name,
        Transport::Http { url },
        DiscoverySource::Multicast,
    ))
}

/// Join the multicast group and register announcements as they arrive.
pub async fn spawn_multicast_listener(
    registry: Arc<McpRegistry>,
    group: Ipv4Addr,
    port: u16,
) -> Result<tokio::task::JoinHandle<()>, OrchestratorError> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("bind multicast: {e}")))?;
    socket
        .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
        .map_err(|e| OrchestratorError::NetworkUnavailable(format!("join {group}: {e}")))?;
    tracing::info!(%group, port, "multicast discovery listening");

    Ok(tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, sender)) => {
                    if let Some(descriptor) =
                        descriptor_from_announcement(&buf[..len], sender.ip())
                    {
                        registry.register_aux(descriptor);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "multicast receive failed");
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
#[path = "multicast_tests.rs"]
mod tests;
