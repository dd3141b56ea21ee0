use std::time::Duration;

use crate::profile::Endpoint;

/// Settings for a [`Discovery`](crate::discovery::Discovery) instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Sample rate the audio server runs at. SBC negotiation picks the
    /// lowest frequency at or above this.
    pub default_sample_rate: u32,
    /// Channel count the audio server runs at; decides whether stereo or
    /// mono channel modes are preferred.
    pub default_channels: u8,
    /// Lowest SBC bitpool we accept.
    pub min_bitpool: u8,
    /// Highest SBC bitpool we advertise and accept. Deployments disagree on
    /// this value (53 upstream, 35 on some device families).
    pub max_bitpool: u8,
    /// Endpoints registered on every adapter.
    pub endpoints: Vec<Endpoint>,
    /// Timeout for calls that wait on their reply, such as acquiring a
    /// transport.
    pub call_timeout: Duration,
}

pub const DEFAULT_MIN_BITPOOL: u8 = 2;
pub const DEFAULT_MAX_BITPOOL: u8 = 53;

impl Default for Config {
    fn default() -> Self {
        Config {
            default_sample_rate: 44100,
            default_channels: 2,
            min_bitpool: DEFAULT_MIN_BITPOOL,
            max_bitpool: DEFAULT_MAX_BITPOOL,
            endpoints: vec![Endpoint::A2dpSource, Endpoint::A2dpSink],
            // same as the bus library's default reply timeout
            call_timeout: Duration::from_secs(25),
        }
    }
}

impl Config {
    pub fn with_default_sample_rate(mut self, rate: u32) -> Self {
        self.default_sample_rate = rate;
        self
    }

    pub fn with_default_channels(mut self, channels: u8) -> Self {
        self.default_channels = channels;
        self
    }

    pub fn with_max_bitpool(mut self, max_bitpool: u8) -> Self {
        self.max_bitpool = max_bitpool;
        self
    }

    /// Also register the aptX source endpoint.
    pub fn with_aptx(mut self) -> Self {
        if !self.endpoints.contains(&Endpoint::A2dpSourceAptx) {
            self.endpoints.push(Endpoint::A2dpSourceAptx);
        }
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}
