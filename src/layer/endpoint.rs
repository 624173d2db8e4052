use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    Datagram { len: usize, from: SocketAddr },
    /// Nothing arrived before the timeout.
    Timeout,
}

/// Datagram transport under a [`super::Connection`].
///
/// Datagrams are unreliable, unordered and carry their sender's address.
pub trait Endpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Waits for one datagram. `None` waits forever.
    ///
    /// A datagram longer than `buf` is truncated to `buf.len()`.
    fn recv_from(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Recv>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Endpoint for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Recv> {
        self.set_read_timeout(timeout)?;
        match UdpSocket::recv_from(self, buf) {
            Ok((len, from)) => Ok(Recv::Datagram { len, from }),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(Recv::Timeout)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropDecision {
    Deliver,
    Drop,
}

type DropFn = Box<dyn FnMut(&[u8]) -> DropDecision + Send>;

/// One end of an in-process datagram link.
///
/// Every outgoing datagram is recorded before the drop rule sees it, so tests
/// can inspect exactly what went on the wire.
pub struct MemEndpoint {
    addr: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    drop_rule: Mutex<Option<DropFn>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemEndpoint {
    /// Two ends wired to each other.
    #[must_use]
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (MemEndpoint, MemEndpoint) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        let a_end = MemEndpoint {
            addr: a,
            peer: b,
            tx: a_tx,
            rx: a_rx,
            drop_rule: Mutex::new(None),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        let b_end = MemEndpoint {
            addr: b,
            peer: a,
            tx: b_tx,
            rx: b_rx,
            drop_rule: Mutex::new(None),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        (a_end, b_end)
    }

    /// Decides the fate of each outgoing datagram.
    #[must_use]
    pub fn with_drop_rule(
        self,
        rule: impl FnMut(&[u8]) -> DropDecision + Send + 'static,
    ) -> Self {
        if let Ok(mut slot) = self.drop_rule.lock() {
            *slot = Some(Box::new(rule));
        }
        self
    }

    /// Shared log of every datagram passed to `send_to`, dropped or not.
    #[must_use]
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }

    #[must_use]
    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Endpoint for MemEndpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(buf.to_vec());
        }
        if addr != self.peer {
            // nobody listens there
            return Ok(buf.len());
        }
        let decision = match self.drop_rule.lock() {
            Ok(mut rule) => match rule.as_mut() {
                Some(rule) => rule(buf),
                None => DropDecision::Deliver,
            },
            Err(_) => DropDecision::Deliver,
        };
        if decision == DropDecision::Deliver {
            // a vanished peer swallows datagrams like an unbound UDP port
            let _ = self.tx.send(buf.to_vec());
        }
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Recv> {
        let datagram = match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(x) => x,
                Err(RecvTimeoutError::Timeout) => return Ok(Recv::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::ErrorKind::NotConnected.into())
                }
            },
            None => self
                .rx
                .recv()
                .map_err(|_| io::Error::from(io::ErrorKind::NotConnected))?,
        };
        let len = usize::min(datagram.len(), buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(Recv::Datagram {
            len,
            from: self.peer,
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
