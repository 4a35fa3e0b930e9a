//! UDP discovery of bridges on the local network.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::{debug, info};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use comfoconnect_protocol::discovery::{decode_search_response, encode_probe};
use comfoconnect_protocol::{BridgeDescriptor, BRIDGE_PORT};

use crate::error::Result;

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUFFER_SIZE: usize = 256;

/// Find bridges.
///
/// Without a target the probe is broadcast and replies are collected until
/// `timeout`. With a target only that host is probed and the first reply is
/// returned. Running out of time is not an error; whatever arrived is
/// returned in arrival order.
pub async fn discover(target: Option<IpAddr>, timeout: Duration) -> Result<Vec<BridgeDescriptor>> {
    let dest = SocketAddr::new(
        target.unwrap_or(IpAddr::V4(Ipv4Addr::BROADCAST)),
        BRIDGE_PORT,
    );
    probe(dest, target.is_some(), timeout).await
}

/// Send one probe to `dest` and collect the replies.
pub async fn probe(dest: SocketAddr, first_only: bool, timeout: Duration) -> Result<Vec<BridgeDescriptor>> {
    let socket = UdpSocket::bind(bind_addr(dest)).await?;
    if dest.is_ipv4() {
        socket.set_broadcast(true)?;
    }

    debug!("Sending discovery probe to {}", dest);
    socket.send_to(&encode_probe(), dest).await?;

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut bridges = Vec::new();

    loop {
        let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(result) => result?,
        };

        match decode_search_response(&buf[..len]) {
            Ok(bridge) => {
                info!(
                    "Found bridge {} at {} (version {})",
                    bridge.id, bridge.address, bridge.version
                );
                bridges.push(bridge);
                if first_only {
                    break;
                }
            }
            Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
        }
    }

    Ok(bridges)
}

/// Ephemeral local address in the same family as `dest`.
fn bind_addr(dest: SocketAddr) -> SocketAddr {
    let ip = match dest {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfoconnect_protocol::discovery::encode_search_response;
    use comfoconnect_protocol::{DeviceId, DISCOVERY_PROBE};

    async fn fake_bridge(replies: Vec<Vec<u8>>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &DISCOVERY_PROBE);
            for reply in replies {
                socket.send_to(&reply, from).await.unwrap();
            }
        });
        addr
    }

    fn descriptor(last: u8) -> BridgeDescriptor {
        BridgeDescriptor {
            address: "127.0.0.1".parse().unwrap(),
            id: DeviceId::new([last; 16]),
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_first_reply_returns_early() {
        let addr = fake_bridge(vec![encode_search_response(&descriptor(7)).to_vec()]).await;

        let started = Instant::now();
        let found = probe(addr, true, Duration::from_secs(5)).await.unwrap();
        assert_eq!(found, vec![descriptor(7)]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_collects_until_timeout_skipping_garbage() {
        let addr = fake_bridge(vec![
            encode_search_response(&descriptor(1)).to_vec(),
            vec![0xFF, 0xFF, 0xFF],
            encode_search_response(&descriptor(2)).to_vec(),
        ])
        .await;

        let found = probe(addr, false, Duration::from_millis(300)).await.unwrap();
        assert_eq!(found, vec![descriptor(1), descriptor(2)]);
    }

    #[test]
    fn test_bind_addr_follows_target_family() {
        let v4 = bind_addr("192.168.1.213:56747".parse().unwrap());
        assert_eq!(v4, "0.0.0.0:0".parse::<SocketAddr>().unwrap());

        let v6 = bind_addr("[fe80::1]:56747".parse().unwrap());
        assert!(v6.is_ipv6());
        assert!(v6.ip().is_unspecified());
        assert_eq!(v6.port(), 0);
    }

    #[tokio::test]
    async fn test_silence_is_empty() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let found = probe(addr, true, Duration::from_millis(100)).await.unwrap();
        assert!(found.is_empty());
        drop(silent);
    }
}
