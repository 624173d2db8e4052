use crate::utils::{Seq8, MAX_RING_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    SendRound,
    AwaitAck,
    Retransmit,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The ack covers every packet of the round.
    Complete { newly_acked: usize },
    /// Some packets of the round are still missing.
    Partial { newly_acked: usize },
    /// Acknowledges something never sent (stale or bogus); nothing changed.
    Ignored,
}

/// One packet to put on the wire in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPacket {
    pub seq: Seq8,
    /// Byte offset into the caller's data.
    pub offset: usize,
    pub len: usize,
    /// Packets still to come in this round after this one.
    pub remaining_in_round: u8,
    pub is_retransmission: bool,
}

/// Sender bookkeeping for one `send` call.
///
/// ```text
///  last_acked        next_seq      highest_sent
///      |                 |               |
///  ----+-----------------+---------------+----> seq space (mod 256)
///      | <- this round ->|
///      | <------ ever transmitted ------>|
/// ```
pub struct Swnd {
    len: usize,
    payload_size: usize,
    sent_len: usize,
    last_acked: Seq8,
    next_seq: Seq8,
    highest_sent: Seq8, // exclusive
    peer_wnd: usize,
    is_retransmission: bool,
    state: SendState,
}

impl Swnd {
    fn check_rep(&self) {
        assert!(self.payload_size > 0);
        assert!(self.sent_len <= self.len);
        assert!(self.next_seq.sub(&self.last_acked) <= self.highest_sent.sub(&self.last_acked));
        assert!(self.highest_sent.sub(&self.last_acked) <= u8::MAX as usize / 2 + 1);
        assert_eq!(self.state == SendState::Done, self.sent_len == self.len);
    }

    #[must_use]
    pub fn new(len: usize, payload_size: usize, start: Seq8) -> Self {
        let this = Swnd {
            len,
            payload_size,
            sent_len: 0,
            last_acked: start,
            next_seq: start,
            highest_sent: start,
            // one packet before the receiver has granted anything
            peer_wnd: 1,
            is_retransmission: false,
            state: match len {
                0 => SendState::Done,
                _ => SendState::SendRound,
            },
        };
        this.check_rep();
        this
    }

    #[must_use]
    #[inline]
    pub fn state(&self) -> SendState {
        self.state
    }

    #[must_use]
    #[inline]
    pub fn sent_len(&self) -> usize {
        self.sent_len
    }

    #[must_use]
    #[inline]
    pub fn last_acked(&self) -> Seq8 {
        self.last_acked
    }

    #[must_use]
    #[inline]
    pub fn next_seq(&self) -> Seq8 {
        self.next_seq
    }

    #[must_use]
    #[inline]
    pub fn peer_wnd(&self) -> usize {
        self.peer_wnd
    }

    #[must_use]
    #[inline]
    pub fn is_retransmission(&self) -> bool {
        self.is_retransmission
    }

    /// Packets sent but not cumulatively acknowledged.
    #[must_use]
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.next_seq.sub(&self.last_acked)
    }

    #[must_use]
    fn packets_remaining(&self) -> usize {
        let bytes = self.len - self.sent_len;
        (bytes + self.payload_size - 1) / self.payload_size
    }

    /// Plans the next round starting at `last_acked` and moves to
    /// [`SendState::AwaitAck`].
    ///
    /// # Panics
    ///
    /// Panics unless the state is [`SendState::SendRound`] or
    /// [`SendState::Retransmit`].
    pub fn round(&mut self) -> Vec<RoundPacket> {
        assert!(matches!(
            self.state,
            SendState::SendRound | SendState::Retransmit
        ));
        self.is_retransmission = self.state == SendState::Retransmit;

        // a zero grant still lets one packet probe the receiver
        let wnd = usize::max(self.peer_wnd, 1);
        let count = usize::min(wnd, self.packets_remaining());
        let mut packets = Vec::with_capacity(count);
        let mut seq = self.last_acked;
        for i in 0..count {
            let offset = self.sent_len + i * self.payload_size;
            let len = usize::min(self.payload_size, self.len - offset);
            packets.push(RoundPacket {
                seq,
                offset,
                len,
                remaining_in_round: (count - i - 1) as u8,
                is_retransmission: self.is_retransmission,
            });
            seq.increment();
        }

        self.next_seq = seq;
        if self.next_seq.sub(&self.last_acked) > self.highest_sent.sub(&self.last_acked) {
            self.highest_sent = self.next_seq;
        }
        self.state = SendState::AwaitAck;
        self.check_rep();
        packets
    }

    /// Applies a cumulative acknowledgement carrying the receiver's grant.
    pub fn on_ack(&mut self, ack: Seq8, wnd: u8) -> AckOutcome {
        assert_eq!(self.state, SendState::AwaitAck);
        let delta = ack.sub(&self.last_acked);
        if delta > self.highest_sent.sub(&self.last_acked) {
            return AckOutcome::Ignored;
        }
        let round_end = self.next_seq;
        let round_start = self.last_acked;

        let newly_acked = usize::min(delta * self.payload_size, self.len - self.sent_len);
        self.sent_len += newly_acked;
        self.last_acked = ack;
        // a grant beyond any valid ring would break the sequence space
        self.peer_wnd = usize::min(wnd as usize, MAX_RING_CAPACITY);

        let outcome = if self.sent_len == self.len {
            self.next_seq = self.last_acked;
            self.state = SendState::Done;
            AckOutcome::Complete { newly_acked }
        } else if ack.is_before(&round_end, &round_start) {
            // packets of this round went missing
            self.next_seq = self.last_acked;
            self.state = SendState::Retransmit;
            AckOutcome::Partial { newly_acked }
        } else {
            self.next_seq = self.last_acked;
            self.state = SendState::SendRound;
            AckOutcome::Complete { newly_acked }
        };
        self.check_rep();
        outcome
    }

    /// No acknowledgement within the ack timeout: resend the same data.
    pub fn on_timeout(&mut self) {
        assert_eq!(self.state, SendState::AwaitAck);
        self.next_seq = self.last_acked;
        self.state = SendState::Retransmit;
        self.check_rep();
    }

    /// The wait for an acknowledgement failed; the round is repeated.
    pub fn on_error(&mut self) {
        self.on_timeout();
    }
}
