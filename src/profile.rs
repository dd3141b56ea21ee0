use std::fmt::{Display, Formatter};

use crate::codec::Codec;

pub const UUID_A2DP_SOURCE: &str = "0000110a-0000-1000-8000-00805f9b34fb";
pub const UUID_A2DP_SINK: &str = "0000110b-0000-1000-8000-00805f9b34fb";
pub const UUID_HSP_HS: &str = "00001108-0000-1000-8000-00805f9b34fb";
pub const UUID_HSP_AG: &str = "00001112-0000-1000-8000-00805f9b34fb";
pub const UUID_HFP_HF: &str = "0000111e-0000-1000-8000-00805f9b34fb";
pub const UUID_HFP_AG: &str = "0000111f-0000-1000-8000-00805f9b34fb";

/// The audio role a transport plays from our side of the link.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Profile {
    /// We send audio to a remote A2DP sink.
    A2dpSink = 0,
    /// We receive audio from a remote A2DP source.
    A2dpSource,
    HeadsetHeadUnit,
    HeadsetAudioGateway,
}

pub const PROFILE_COUNT: usize = 4;

impl Profile {
    pub const ALL: [Profile; PROFILE_COUNT] = [
        Profile::A2dpSink,
        Profile::A2dpSource,
        Profile::HeadsetHeadUnit,
        Profile::HeadsetAudioGateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::A2dpSink => "a2dp_sink",
            Profile::A2dpSource => "a2dp_source",
            Profile::HeadsetHeadUnit => "hsp",
            Profile::HeadsetAudioGateway => "hfgw",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        f.write_str(self.as_str())
    }
}

/// A media endpoint object we export on the bus and register with every
/// adapter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Endpoint {
    /// SBC endpoint registered with the A2DP source UUID. Remote sinks
    /// configure it, giving us the [`Profile::A2dpSink`] role.
    A2dpSource,
    /// SBC endpoint registered with the A2DP sink UUID. Remote sources
    /// configure it, giving us the [`Profile::A2dpSource`] role.
    A2dpSink,
    /// aptX flavour of [`Endpoint::A2dpSource`].
    A2dpSourceAptx,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [
        Endpoint::A2dpSource,
        Endpoint::A2dpSink,
        Endpoint::A2dpSourceAptx,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::A2dpSource => "/MediaEndpoint/A2DPSource",
            Endpoint::A2dpSink => "/MediaEndpoint/A2DPSink",
            Endpoint::A2dpSourceAptx => "/MediaEndpoint/A2DPSource_aptx",
        }
    }

    pub fn from_path(path: &str) -> Option<Endpoint> {
        Endpoint::ALL.iter().copied().find(|e| e.path() == path)
    }

    /// The UUID passed to `RegisterEndpoint`.
    pub fn uuid(&self) -> &'static str {
        match self {
            Endpoint::A2dpSource | Endpoint::A2dpSourceAptx => UUID_A2DP_SOURCE,
            Endpoint::A2dpSink => UUID_A2DP_SINK,
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            Endpoint::A2dpSource | Endpoint::A2dpSink => Codec::Sbc,
            Endpoint::A2dpSourceAptx => Codec::Vendor,
        }
    }

    /// Maps the UUID a remote stack configured this endpoint with to the
    /// local profile of the resulting transport. Any other combination is
    /// rejected.
    pub fn profile_for(&self, uuid: &str) -> Option<Profile> {
        match self {
            Endpoint::A2dpSource | Endpoint::A2dpSourceAptx if uuid == UUID_A2DP_SOURCE => {
                Some(Profile::A2dpSink)
            }
            Endpoint::A2dpSink if uuid == UUID_A2DP_SINK => Some(Profile::A2dpSource),
            _ => None,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        f.write_str(self.path())
    }
}
