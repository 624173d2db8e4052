use std::time::Duration;

use thiserror::Error;

use crate::{protocol::packet_hdr::HEADER_LEN, utils::MAX_RING_CAPACITY};

pub const DEFAULT_PAYLOAD_SIZE: usize = 64;
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(10);
pub const DEFAULT_RECV_IDLE_TIMEOUT: Duration = Duration::from_millis(5);
pub const DEFAULT_RECV_WINDOW_PACKETS: usize = 10;
/// The payload length field is a single byte.
pub const MAX_PACKET_SIZE: usize = HEADER_LEN + u8::MAX as usize;

/// Per-connection tuning. Fixed once the first transfer starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    max_packet_size: usize,
    ack_timeout: Duration,
    recv_idle_timeout: Duration,
    recv_window_packets: usize,
}

pub struct ConfigBuilder {
    /// Header plus payload, in bytes.
    pub max_packet_size: usize,
    /// How long the sender waits for an ACK before resending the round.
    pub ack_timeout: Duration,
    /// Silence after which the receiver delivers what it has and ACKs.
    pub recv_idle_timeout: Duration,
    /// Reassembly ring capacity, in packets.
    pub recv_window_packets: usize,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        ConfigBuilder {
            max_packet_size: HEADER_LEN + DEFAULT_PAYLOAD_SIZE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            recv_idle_timeout: DEFAULT_RECV_IDLE_TIMEOUT,
            recv_window_packets: DEFAULT_RECV_WINDOW_PACKETS,
        }
    }
}

impl ConfigBuilder {
    pub fn build(self) -> Result<Config, ConfigError> {
        if !(HEADER_LEN < self.max_packet_size && self.max_packet_size <= MAX_PACKET_SIZE) {
            return Err(ConfigError::MaxPacketSize {
                size: self.max_packet_size,
            });
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "ack_timeout",
            });
        }
        if self.recv_idle_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "recv_idle_timeout",
            });
        }
        if !(1..=MAX_RING_CAPACITY).contains(&self.recv_window_packets) {
            return Err(ConfigError::RecvWindow {
                packets: self.recv_window_packets,
            });
        }
        let this = Config {
            max_packet_size: self.max_packet_size,
            ack_timeout: self.ack_timeout,
            recv_idle_timeout: self.recv_idle_timeout,
            recv_window_packets: self.recv_window_packets,
        };
        this.check_rep();
        Ok(this)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max packet size {size} must be in {}..={}", HEADER_LEN + 1, MAX_PACKET_SIZE)]
    MaxPacketSize { size: usize },
    #[error("{name} must not be zero")]
    ZeroTimeout { name: &'static str },
    #[error("receive window of {packets} packets must be in 1..={}", MAX_RING_CAPACITY)]
    RecvWindow { packets: usize },
}

impl Default for Config {
    fn default() -> Self {
        let b = ConfigBuilder::default();
        Config {
            max_packet_size: b.max_packet_size,
            ack_timeout: b.ack_timeout,
            recv_idle_timeout: b.recv_idle_timeout,
            recv_window_packets: b.recv_window_packets,
        }
    }
}

impl Config {
    #[inline]
    fn check_rep(&self) {
        assert!(HEADER_LEN < self.max_packet_size);
        assert!(0 < self.recv_window_packets && self.recv_window_packets <= MAX_RING_CAPACITY);
    }

    /// Starts a builder from the current values, so callers can override
    /// only what they need.
    #[must_use]
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder {
            max_packet_size: self.max_packet_size,
            ack_timeout: self.ack_timeout,
            recv_idle_timeout: self.recv_idle_timeout,
            recv_window_packets: self.recv_window_packets,
        }
    }

    #[must_use]
    #[inline]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    #[must_use]
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.max_packet_size - HEADER_LEN
    }

    #[must_use]
    #[inline]
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    #[must_use]
    #[inline]
    pub fn recv_idle_timeout(&self) -> Duration {
        self.recv_idle_timeout
    }

    #[must_use]
    #[inline]
    pub fn recv_window_packets(&self) -> usize {
        self.recv_window_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_packet_size(), HEADER_LEN + 64);
        assert_eq!(config.payload_size(), 64);
        assert_eq!(config.ack_timeout(), Duration::from_millis(10));
        assert_eq!(config.recv_idle_timeout(), Duration::from_millis(5));
        assert_eq!(config.recv_window_packets(), 10);
        assert_eq!(ConfigBuilder::default().build().unwrap(), config);
    }

    #[test]
    fn override_subset() {
        let config = ConfigBuilder {
            recv_window_packets: 32,
            ..Config::default().into_builder()
        }
        .build()
        .unwrap();
        assert_eq!(config.recv_window_packets(), 32);
        assert_eq!(config.ack_timeout(), DEFAULT_ACK_TIMEOUT);
    }

    #[test]
    fn packet_size_bounds() {
        let too_small = ConfigBuilder {
            max_packet_size: HEADER_LEN,
            ..Default::default()
        }
        .build();
        assert_eq!(
            too_small,
            Err(ConfigError::MaxPacketSize { size: HEADER_LEN })
        );

        let largest = ConfigBuilder {
            max_packet_size: HEADER_LEN + 255,
            ..Default::default()
        }
        .build()
        .unwrap();
        assert_eq!(largest.payload_size(), 255);

        assert!(ConfigBuilder {
            max_packet_size: HEADER_LEN + 256,
            ..Default::default()
        }
        .build()
        .is_err());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let res = ConfigBuilder {
            recv_idle_timeout: Duration::ZERO,
            ..Default::default()
        }
        .build();
        assert_eq!(
            res,
            Err(ConfigError::ZeroTimeout {
                name: "recv_idle_timeout"
            })
        );
    }

    #[test]
    fn recv_window_bounds() {
        for packets in [0, MAX_RING_CAPACITY + 1] {
            let res = ConfigBuilder {
                recv_window_packets: packets,
                ..Default::default()
            }
            .build();
            assert_eq!(res, Err(ConfigError::RecvWindow { packets }));
        }
    }
}
