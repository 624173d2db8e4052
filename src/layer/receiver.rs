use std::net::SocketAddr;

use tracing::{debug, error, info_span, trace, warn};

use crate::{
    protocol::{
        packet::Packet,
        packet_hdr::{Flag, PacketHeader},
        DecodingError,
    },
    utils::{RecvRing, Seq8, SeqLocationToRwnd},
};

use super::{Config, Connection, Endpoint, Error, Recv, Result, MAX_CONSECUTIVE_TRANSPORT_ERRORS};

pub(crate) fn receive<E: Endpoint>(conn: &mut Connection<E>, buf: &mut [u8]) -> Result<usize> {
    conn.start_transfer()?;
    if buf.is_empty() {
        return Ok(0);
    }
    let config = conn.config().clone();
    let span = info_span!("receive", peer = ?conn.peer(), max_len = buf.len());
    let _enter = span.enter();

    let ring = RecvRing::new(config.recv_window_packets(), conn.next_seq_base())?;
    let mut scratch = Vec::new();
    scratch.try_reserve_exact(config.max_packet_size() + 1)?;
    scratch.resize(config.max_packet_size() + 1, 0);

    let mut receiver = Receiver {
        endpoint: conn.endpoint()?,
        config: &config,
        ring,
        scratch,
        ack_buf: Vec::new(),
        out: buf,
        received_len: 0,
        peer: conn.peer(),
        is_primed: conn.is_primed(),
        pending_ack: false,
    };
    let exit = receiver.run();

    let received_len = receiver.received_len;
    let window_start = receiver.ring.start();
    let is_primed = receiver.is_primed;
    if let Some(peer) = receiver.peer {
        conn.set_peer(peer);
    }
    if is_primed {
        conn.settle(window_start);
    }
    match exit {
        Exit::Full => debug!(received_len, "Receive buffer filled"),
        Exit::Closed => {
            debug!(received_len, "Peer closed the stream");
            conn.mark_closed_by_peer();
        }
        Exit::GaveUp => error!(received_len, "Giving up after repeated transport errors"),
    }
    Ok(received_len)
}

enum Exit {
    Full,
    Closed,
    GaveUp,
}

#[derive(Debug, PartialEq, Eq)]
enum Flush {
    Drained,
    /// The next in-order payload does not fit the caller's buffer.
    Overflow,
}

struct Receiver<'a, E> {
    endpoint: &'a E,
    config: &'a Config,
    ring: RecvRing<Vec<u8>>,
    scratch: Vec<u8>,
    ack_buf: Vec<u8>,
    out: &'a mut [u8],
    received_len: usize,
    peer: Option<SocketAddr>,
    is_primed: bool,
    /// A datagram arrived since the last ACK.
    pending_ack: bool,
}

impl<'a, E: Endpoint> Receiver<'a, E> {
    fn run(&mut self) -> Exit {
        let mut is_bootstrapped = false;
        let mut errors = 0;
        while self.received_len < self.out.len() {
            // block for the first packet, then poll with the idle timeout
            let timeout = match is_bootstrapped {
                true => Some(self.config.recv_idle_timeout()),
                false => None,
            };
            let (len, from) = match self.endpoint.recv_from(&mut self.scratch, timeout) {
                Ok(Recv::Datagram { len, from }) => {
                    errors = 0;
                    (len, from)
                }
                Ok(Recv::Timeout) => {
                    errors = 0;
                    if self.pending_ack && self.deliver_and_ack() == Flush::Overflow {
                        return Exit::Full;
                    }
                    continue;
                }
                Err(e) => {
                    errors += 1;
                    error!("Failed to receive packet: {e}");
                    if errors >= MAX_CONSECUTIVE_TRANSPORT_ERRORS {
                        return Exit::GaveUp;
                    }
                    continue;
                }
            };
            if let Some(peer) = self.peer {
                if peer != from {
                    debug!(%from, "Ignoring datagram from unknown address");
                    continue;
                }
            }
            if len == 0 {
                let _ = self.deliver();
                return Exit::Closed;
            }

            if is_bootstrapped {
                self.on_datagram(len);
                continue;
            }

            if !self.is_primed {
                let seq = match Packet::from_datagram(&self.scratch[..len]) {
                    Ok(x) => x.hdr().seq(),
                    Err(e) => {
                        warn!(%from, "Malformed first packet: {e:?}");
                        continue;
                    }
                };
                debug!(%seq, "Receive window starts at first packet");
                self.ring.reset_start(seq);
                self.is_primed = true;
            }
            self.peer = Some(from);
            is_bootstrapped = true;
            self.on_datagram(len);
            if self.deliver_and_ack() == Flush::Overflow {
                return Exit::Full;
            }
        }
        Exit::Full
    }

    fn on_datagram(&mut self, len: usize) {
        self.pending_ack = true;
        match store(&mut self.ring, &self.scratch[..len]) {
            Ok(seq) => trace!(%seq, len, "Stored packet"),
            Err(e) => warn!("Discarding packet: {e}"),
        }
    }

    /// Copies in-order payloads out of the ring.
    fn deliver(&mut self) -> (usize, Flush) {
        let mut delivered = 0;
        while let Some(len) = self.ring.front().map(Vec::len) {
            if self.received_len + len > self.out.len() {
                warn!(
                    received_len = self.received_len,
                    next_len = len,
                    "Receive buffer cannot hold the next packet"
                );
                return (delivered, Flush::Overflow);
            }
            let payload = match self.ring.pop_front() {
                Some(x) => x,
                None => break,
            };
            self.out[self.received_len..self.received_len + len].copy_from_slice(&payload);
            self.received_len += len;
            delivered += 1;
        }
        (delivered, Flush::Drained)
    }

    fn deliver_and_ack(&mut self) -> Flush {
        let (delivered, flush) = self.deliver();
        if delivered == 0 {
            debug!(window_start = %self.ring.start(), "Nothing in order to deliver");
        }
        let wnd = self.ring.capacity() - self.ring.len();
        debug!(
            ack = %self.ring.start(),
            wnd,
            gap = self.ring.leading_free(),
            delivered,
            "Sending ACK"
        );
        self.send_ack(self.ring.start(), wnd as u8);
        self.pending_ack = false;
        flush
    }

    fn send_ack(&mut self, ack: Seq8, wnd: u8) {
        let peer = match self.peer {
            Some(x) => x,
            None => return,
        };
        self.ack_buf.clear();
        if let Err(e) = PacketHeader::ack(ack, wnd).append_to(&mut self.ack_buf) {
            warn!("Failed to encode ACK: {e:?}");
            return;
        }
        if let Err(e) = self.endpoint.send_to(&self.ack_buf, peer) {
            warn!(%ack, "Failed to send ACK: {e}");
        }
    }
}

/// Validates a data packet and parks its payload in the ring.
fn store(ring: &mut RecvRing<Vec<u8>>, datagram: &[u8]) -> Result<Seq8> {
    let packet = Packet::from_datagram(datagram)?;
    let hdr = packet.hdr();
    if hdr.flags().contains(Flag::Ack) {
        return Err(Error::MalformedPacket(DecodingError::Decoding { field: "flags" }));
    }
    let seq = hdr.seq();
    match ring.location(seq) {
        SeqLocationToRwnd::OutOfWindow => Err(Error::OutOfWindowPacket {
            seq,
            window_start: ring.start(),
        }),
        SeqLocationToRwnd::AlreadyReceived => Err(Error::DuplicatePacket { seq }),
        SeqLocationToRwnd::InRecvWindow => {
            let mut payload = Vec::new();
            payload.try_reserve_exact(packet.payload().len())?;
            payload.extend_from_slice(packet.payload());
            let _ = ring.insert(seq, payload);
            Ok(seq)
        }
    }
}
