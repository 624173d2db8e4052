use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use tracing::{debug, warn};

use crate::utils::Seq8;

use super::{receiver, sender, Config, Endpoint, Error, Result};

/// A one-directional reliable byte transfer over a datagram [`Endpoint`].
///
/// Sequence state survives across calls: a second `send` continues at the
/// sequence number the previous one stopped at, and a second `receive`
/// expects exactly that.
pub struct Connection<E: Endpoint = UdpSocket> {
    endpoint: Option<E>,
    peer: Option<SocketAddr>,
    config: Config,
    next_seq_base: Seq8,
    is_primed: bool,
    is_open: bool,
    is_started: bool,
}

impl Connection<UdpSocket> {
    /// Prepares to send to `addr:port` from an ephemeral local port.
    pub fn open(addr: IpAddr, port: u16) -> Result<Self> {
        let local = match addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0))?;
        let peer = SocketAddr::new(addr, port);
        debug!(local = %socket.local_addr()?, %peer, "Opened connection");
        Ok(Connection::with_endpoint(socket, Some(peer)))
    }

    /// Binds `addr:port` and waits for whoever sends first.
    pub fn listen(addr: IpAddr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(addr, port))?;
        debug!(local = %socket.local_addr()?, "Listening");
        Ok(Connection::with_endpoint(socket, None))
    }
}

impl<E: Endpoint> Connection<E> {
    /// Wraps an existing endpoint. With `peer` unset, the first datagram
    /// received decides who the peer is.
    #[must_use]
    pub fn with_endpoint(endpoint: E, peer: Option<SocketAddr>) -> Self {
        Connection {
            endpoint: Some(endpoint),
            peer,
            config: Config::default(),
            next_seq_base: Seq8::zero(),
            is_primed: false,
            is_open: true,
            is_started: false,
        }
    }

    /// Replaces the configuration. Refused once a transfer has started.
    pub fn configure(&mut self, config: Config) -> Result<()> {
        if self.is_started {
            return Err(Error::ConfigLocked);
        }
        self.config = config;
        Ok(())
    }

    /// Sends all of `data`, returning how many bytes the peer acknowledged.
    ///
    /// The count is below `data.len()` only if the transfer had to be given
    /// up; the cause is logged.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        sender::send(self, data)
    }

    /// Receives into `buf` until it is full or the peer closes. Returns the
    /// number of bytes written.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        receiver::receive(self, buf)
    }

    /// Signals the peer with an empty datagram and releases the endpoint.
    /// Calling it again does nothing.
    pub fn close(&mut self) {
        let endpoint = match self.endpoint.take() {
            Some(x) => x,
            None => return,
        };
        if self.is_open {
            if let Some(peer) = self.peer {
                match endpoint.send_to(&[], peer) {
                    Ok(_) => debug!(%peer, "Sent close signal"),
                    Err(e) => warn!(%peer, "Failed to send close signal: {e}"),
                }
            }
        }
        self.is_open = false;
    }

    #[must_use]
    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    #[must_use]
    #[inline]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[must_use]
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sequence number the next transfer starts at.
    #[must_use]
    #[inline]
    pub fn next_seq_base(&self) -> Seq8 {
        self.next_seq_base
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint()?.local_addr()?)
    }

    pub(crate) fn endpoint(&self) -> Result<&E> {
        self.endpoint.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Fixes the configuration for the rest of the connection's life.
    pub(crate) fn start_transfer(&mut self) -> Result<()> {
        if !self.is_open || self.endpoint.is_none() {
            return Err(Error::ConnectionClosed);
        }
        self.is_started = true;
        Ok(())
    }

    #[must_use]
    #[inline]
    pub(crate) fn is_primed(&self) -> bool {
        self.is_primed
    }

    pub(crate) fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Records where the sequence space stands after a transfer.
    pub(crate) fn settle(&mut self, next_seq_base: Seq8) {
        self.next_seq_base = next_seq_base;
        self.is_primed = true;
    }

    pub(crate) fn mark_closed_by_peer(&mut self) {
        self.is_open = false;
    }
}

impl<E: Endpoint> Drop for Connection<E> {
    fn drop(&mut self) {
        self.close();
    }
}
