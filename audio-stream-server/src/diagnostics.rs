use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// IPv4 addresses of every local interface a client could reach, loopback excluded.
pub fn local_ipv4_addresses() -> io::Result<Vec<Ipv4Addr>> {
    let interfaces = if_addrs::get_if_addrs()?;
    Ok(reachable_ipv4(interfaces.iter().map(|iface| iface.ip())))
}

/// Sorted, deduplicated IPv4 addresses that are neither loopback nor unspecified.
fn reachable_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut out: Vec<Ipv4Addr> = addrs
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
            _ => None,
        })
        .collect();
    out.sort();
    out.dedup();
    out
}
