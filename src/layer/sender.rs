use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use tracing::{debug, error, info_span, trace, warn};

use crate::{
    protocol::{
        packet::{Packet, PacketBuilder},
        packet_hdr::{Flag, Flags, PacketHeader, PacketHeaderBuilder},
    },
    utils::{AckOutcome, RoundPacket, Seq8, SendState, Swnd},
};

use super::{Config, Connection, Endpoint, Error, Recv, Result, MAX_CONSECUTIVE_TRANSPORT_ERRORS};

pub(crate) fn send<E: Endpoint>(conn: &mut Connection<E>, data: &[u8]) -> Result<usize> {
    conn.start_transfer()?;
    let peer = conn.peer().ok_or(Error::NoPeer)?;
    if data.is_empty() {
        return Ok(0);
    }
    let config = conn.config().clone();
    let span = info_span!("send", %peer, len = data.len());
    let _enter = span.enter();

    let mut packet_buf = Vec::new();
    packet_buf.try_reserve_exact(config.max_packet_size())?;
    let mut ack_buf = Vec::new();
    ack_buf.try_reserve_exact(config.max_packet_size() + 1)?;
    ack_buf.resize(config.max_packet_size() + 1, 0);

    let mut swnd = Swnd::new(data.len(), config.payload_size(), conn.next_seq_base());
    let mut sender = Sender {
        endpoint: conn.endpoint()?,
        peer,
        config: &config,
        data,
        packet_buf,
        ack_buf,
    };
    let res = sender.run(&mut swnd);

    conn.settle(swnd.last_acked());
    match res {
        Ok(()) => {
            debug!(next_seq = %swnd.last_acked(), "Transfer complete");
        }
        Err(Stop::PeerClosed) => {
            warn!(sent = swnd.sent_len(), "Peer closed before everything was acknowledged");
            conn.mark_closed_by_peer();
        }
        Err(Stop::GaveUp) => {
            error!(sent = swnd.sent_len(), "Giving up after repeated transport errors");
        }
        Err(Stop::Fatal(e)) => return Err(e),
    }
    Ok(swnd.sent_len())
}

enum Stop {
    PeerClosed,
    GaveUp,
    Fatal(Error),
}

enum Wait {
    Ack(PacketHeader),
    Timeout,
    PeerClosed,
    /// The datagram is not an acknowledgement from the peer.
    Discard,
}

struct Sender<'a, E> {
    endpoint: &'a E,
    peer: SocketAddr,
    config: &'a Config,
    data: &'a [u8],
    packet_buf: Vec<u8>,
    ack_buf: Vec<u8>,
}

impl<'a, E: Endpoint> Sender<'a, E> {
    fn run(&mut self, swnd: &mut Swnd) -> std::result::Result<(), Stop> {
        let mut deadline = Instant::now();
        let mut errors = 0;
        loop {
            match swnd.state() {
                SendState::Done => return Ok(()),
                SendState::SendRound | SendState::Retransmit => {
                    let round = swnd.round();
                    debug!(
                        seq = %round[0].seq,
                        packets = round.len(),
                        retransmission = swnd.is_retransmission(),
                        "Sending round"
                    );
                    for packet in &round {
                        self.transmit(packet).map_err(Stop::Fatal)?;
                    }
                    deadline = Instant::now() + self.config.ack_timeout();
                }
                SendState::AwaitAck => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let wait = match remaining.is_zero() {
                        true => Ok(Wait::Timeout),
                        false => self.wait(remaining),
                    };
                    match wait {
                        Ok(Wait::Ack(hdr)) => {
                            errors = 0;
                            self.on_ack(swnd, &hdr);
                        }
                        Ok(Wait::Timeout) => {
                            errors = 0;
                            debug!(seq = %swnd.last_acked(), "ACK timeout, resending round");
                            swnd.on_timeout();
                        }
                        Ok(Wait::PeerClosed) => return Err(Stop::PeerClosed),
                        Ok(Wait::Discard) => (),
                        Err(e) => {
                            errors += 1;
                            error!("Failed to wait for ACK: {e}");
                            if errors >= MAX_CONSECUTIVE_TRANSPORT_ERRORS {
                                return Err(Stop::GaveUp);
                            }
                            swnd.on_error();
                        }
                    }
                }
            }
        }
    }

    fn on_ack(&self, swnd: &mut Swnd, hdr: &PacketHeader) {
        let ack = hdr.ack_num();
        match swnd.on_ack(ack, hdr.wnd()) {
            AckOutcome::Complete { newly_acked } => {
                debug!(%ack, wnd = hdr.wnd(), newly_acked, "Round acknowledged");
            }
            AckOutcome::Partial { newly_acked } => {
                debug!(
                    %ack,
                    wnd = hdr.wnd(),
                    newly_acked,
                    "Packets lost, retransmitting from ack"
                );
            }
            AckOutcome::Ignored => {
                debug!(%ack, last_acked = %swnd.last_acked(), "Ignoring ACK for unsent data");
            }
        }
    }

    fn transmit(&mut self, packet: &RoundPacket) -> Result<()> {
        let mut flags = Flags::empty();
        if packet.is_retransmission {
            flags = flags.with(Flag::Retransmission);
        }
        if packet.offset + packet.len == self.data.len() {
            flags = flags.with(Flag::EndOfTransmission);
        }
        let encoded = PacketBuilder {
            hdr: PacketHeaderBuilder {
                seq: packet.seq,
                ack: Seq8::zero(),
                wnd: packet.remaining_in_round,
                flags,
                data_len: 0,
            },
            payload: &self.data[packet.offset..packet.offset + packet.len],
        }
        .build()?;
        self.packet_buf.clear();
        encoded.append_to(&mut self.packet_buf)?;

        trace!(seq = %packet.seq, len = packet.len, "Sending packet");
        if let Err(e) = self.endpoint.send_to(&self.packet_buf, self.peer) {
            // counts as lost; the ACK will tell
            warn!(seq = %packet.seq, "Failed to send packet: {e}");
        }
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> std::io::Result<Wait> {
        let (len, from) = match self.endpoint.recv_from(&mut self.ack_buf, Some(timeout))? {
            Recv::Datagram { len, from } => (len, from),
            Recv::Timeout => return Ok(Wait::Timeout),
        };
        if from != self.peer {
            debug!(%from, "Ignoring datagram from unknown address");
            return Ok(Wait::Discard);
        }
        if len == 0 {
            return Ok(Wait::PeerClosed);
        }
        let packet = match Packet::from_datagram(&self.ack_buf[..len]) {
            Ok(x) => x,
            Err(e) => {
                warn!("Malformed ACK: {e:?}");
                return Ok(Wait::Discard);
            }
        };
        if !packet.hdr().flags().contains(Flag::Ack) || !packet.payload().is_empty() {
            warn!(seq = %packet.hdr().seq(), "Expected an ACK, got a data packet");
            return Ok(Wait::Discard);
        }
        Ok(Wait::Ack(packet.hdr().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::{
        layer::{DropDecision, MemEndpoint},
        protocol::packet_hdr::HEADER_LEN,
    };

    use super::*;

    fn mem_pair() -> (MemEndpoint, MemEndpoint) {
        MemEndpoint::pair(
            "10.0.0.1:1000".parse().unwrap(),
            "10.0.0.2:2000".parse().unwrap(),
        )
    }

    fn ack(ack: u8, wnd: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        PacketHeader::ack(Seq8::from_u8(ack), wnd)
            .append_to(&mut buf)
            .unwrap();
        buf
    }

    /// Answers every data packet it sees with `respond`, for as long as the
    /// sender keeps talking.
    fn scripted_peer(
        end: MemEndpoint,
        mut respond: impl FnMut(&Packet) -> Option<Vec<u8>> + Send + 'static,
    ) -> thread::JoinHandle<Vec<(u8, u8)>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            let mut buf = [0; 512];
            while let Ok(Recv::Datagram { len, from }) =
                end.recv_from(&mut buf, Some(Duration::from_millis(200)))
            {
                if len == 0 {
                    break;
                }
                let packet = Packet::from_datagram(&buf[..len]).unwrap();
                seen.push((packet.hdr().seq().to_u8(), packet.hdr().flags().bits()));
                if let Some(reply) = respond(&packet) {
                    end.send_to(&reply, from).unwrap();
                }
            }
            seen
        })
    }

    #[test]
    fn empty_send_puts_nothing_on_the_wire() {
        let (a, _b) = mem_pair();
        let peer = a.peer();
        let log = a.sent_log();
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(&[]).unwrap(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn no_peer() {
        let (a, _b) = mem_pair();
        let mut conn = Connection::with_endpoint(a, None);
        assert!(matches!(conn.send(b"abc"), Err(Error::NoPeer)));
    }

    #[test]
    fn single_packet_is_end_of_transmission() {
        let (a, b) = mem_pair();
        let peer = a.peer();
        let log = a.sent_log();
        let peer_thread = scripted_peer(b, |p| {
            Some(ack(p.hdr().seq().to_u8().wrapping_add(1), 10))
        });
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(b"hello").unwrap(), 5);
        assert_eq!(conn.next_seq_base(), Seq8::from_u8(1));
        drop(conn);

        let seen = peer_thread.join().unwrap();
        assert_eq!(seen, vec![(0, u8::from(Flag::EndOfTransmission))]);
        let log = log.lock().unwrap();
        assert_eq!(log[0].len(), HEADER_LEN + 5);
        assert_eq!(&log[0][HEADER_LEN..], b"hello");
    }

    #[test]
    fn timeout_resends_with_retransmission_flag() {
        let (a, b) = mem_pair();
        let peer = a.peer();
        let mut dropped = false;
        let a = a.with_drop_rule(move |_| match dropped {
            true => DropDecision::Deliver,
            false => {
                dropped = true;
                DropDecision::Drop
            }
        });
        let peer_thread = scripted_peer(b, |p| {
            Some(ack(p.hdr().seq().to_u8().wrapping_add(1), 10))
        });
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(b"abc").unwrap(), 3);
        drop(conn);

        let seen = peer_thread.join().unwrap();
        let flags = u8::from(Flag::EndOfTransmission) | u8::from(Flag::Retransmission);
        assert_eq!(seen, vec![(0, flags)]);
    }

    #[test]
    fn stale_and_foreign_acks_are_ignored() {
        let (a, b) = mem_pair();
        let peer = a.peer();
        let mut replies = 0;
        let peer_thread = scripted_peer(b, move |p| {
            replies += 1;
            match replies {
                // acknowledges a packet never sent
                1 => Some(ack(p.hdr().seq().to_u8().wrapping_add(9), 10)),
                // a data packet instead of an ACK
                2 => {
                    let mut buf = Vec::new();
                    PacketBuilder {
                        hdr: PacketHeaderBuilder {
                            seq: Seq8::zero(),
                            ack: Seq8::from_u8(1),
                            wnd: 0,
                            flags: Flags::empty(),
                            data_len: 0,
                        },
                        payload: b"x",
                    }
                    .build()
                    .unwrap()
                    .append_to(&mut buf)
                    .unwrap();
                    Some(buf)
                }
                _ => Some(ack(p.hdr().seq().to_u8().wrapping_add(1), 10)),
            }
        });
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(b"abc").unwrap(), 3);
        assert_eq!(conn.next_seq_base(), Seq8::from_u8(1));
        drop(conn);
        peer_thread.join().unwrap();
    }

    #[test]
    fn peer_close_stops_send() {
        let (a, b) = mem_pair();
        let peer = a.peer();
        let peer_thread = scripted_peer(b, |_| Some(Vec::new()));
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(&[1; 200]).unwrap(), 0);
        assert!(!conn.is_open());
        drop(conn);
        peer_thread.join().unwrap();
    }

    #[test]
    fn gives_up_when_peer_is_gone() {
        let (a, b) = mem_pair();
        let peer = a.peer();
        drop(b);
        let mut conn = Connection::with_endpoint(a, Some(peer));
        assert_eq!(conn.send(&[1; 100]).unwrap(), 0);
        assert!(conn.is_open());
    }
}
