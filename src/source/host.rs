//! Host name and the addresses it resolves to.

use std::net::{IpAddr, ToSocketAddrs};
use tracing::debug;

use super::HostAddresses;

/// Picks the first IPv4 and first IPv6 address in resolver order.
pub fn first_addresses(addrs: impl IntoIterator<Item = IpAddr>) -> (Option<String>, Option<String>) {
    let mut ipv4 = None;
    let mut ipv6 = None;
    for addr in addrs {
        match addr {
            IpAddr::V4(v4) if ipv4.is_none() => ipv4 = Some(v4.to_string()),
            IpAddr::V6(v6) if ipv6.is_none() => ipv6 = Some(v6.to_string()),
            _ => {}
        }
        if ipv4.is_some() && ipv6.is_some() {
            break;
        }
    }
    (ipv4, ipv6)
}

/// Resolves the local host name through the system resolver.
pub fn read_host_addresses() -> HostAddresses {
    let hostname = match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            debug!("gethostname failed: {}", e);
            return HostAddresses {
                hostname: "localhost".to_string(),
                ipv4: None,
                ipv6: None,
            };
        }
    };

    let (ipv4, ipv6) = match (hostname.as_str(), 0u16).to_socket_addrs() {
        Ok(addrs) => first_addresses(addrs.map(|a| a.ip())),
        Err(e) => {
            debug!("Failed to resolve {}: {}", hostname, e);
            (None, None)
        }
    };

    HostAddresses {
        hostname,
        ipv4,
        ipv6,
    }
}
