use std::net::{IpAddr, SocketAddr, TcpListener};

use crate::error::{HarnessError, HarnessResult};

/// Asks the OS for a free port on `address` and releases it immediately.
///
/// Call once per fixture and put the result in the [`ServiceSpec`]. Another
/// process can in principle take the port before the server binds it.
///
/// [`ServiceSpec`]: crate::ServiceSpec
pub fn reserve_ephemeral_port(address: IpAddr) -> HarnessResult<u16> {
    let listener = TcpListener::bind(SocketAddr::new(address, 0))
        .map_err(|e| HarnessError::Internal(format!("failed to obtain an ephemeral port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| HarnessError::Internal(format!("could not read local address: {e}")))?
        .port();
    drop(listener);
    crate::trace!("reserved ephemeral port {port} on {address}");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn port_is_nonzero_and_bindable() {
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let port = reserve_ephemeral_port(addr).unwrap();
        assert_ne!(port, 0);
        TcpListener::bind(SocketAddr::new(addr, port)).unwrap();
    }
}
