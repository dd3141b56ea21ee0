use bytes::{Buf, BufMut, Bytes, BytesMut};
use enumflags2::BitFlags;
use tracing::debug;

use super::{get_field, set_field, ChannelMode, SamplingFrequency};
use crate::{Error, Result};

/// Size of the aptX codec information element.
pub const APTX_SIZE: usize = 7;

pub const APTX_VENDOR_ID: [u8; 4] = [0x4F, 0x00, 0x00, 0x00];
pub const APTX_CODEC_ID: [u8; 2] = [0x01, 0x00];

/// aptX capabilities. The element starts with the vendor and codec id and
/// reuses the SBC masks for frequency and channel mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AptxCapabilities {
    pub vendor_id: [u8; 4],
    pub codec_id: [u8; 2],
    pub frequencies: BitFlags<SamplingFrequency>,
    pub channel_modes: BitFlags<ChannelMode>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AptxConfiguration {
    pub frequency: SamplingFrequency,
    pub channel_mode: ChannelMode,
}

fn parse_raw(bytes: &[u8]) -> Result<([u8; 4], [u8; 2], u8, u8)> {
    if bytes.len() != APTX_SIZE {
        return Err(Error::InvalidConfigurationSize {
            expected: APTX_SIZE,
            found: bytes.len(),
        });
    }

    let mut buf = bytes;
    let mut vendor_id = [0u8; 4];
    buf.copy_to_slice(&mut vendor_id);
    let mut codec_id = [0u8; 2];
    buf.copy_to_slice(&mut codec_id);
    let modes = buf.get_u8();

    Ok((
        vendor_id,
        codec_id,
        get_field(modes, 4..8),
        get_field(modes, 0..4),
    ))
}

fn to_bytes(vendor_id: [u8; 4], codec_id: [u8; 2], frequency: u8, channel_mode: u8) -> Bytes {
    let mut modes = 0u8;
    set_field(&mut modes, 0..4, channel_mode);
    set_field(&mut modes, 4..8, frequency);

    let mut buf = BytesMut::with_capacity(APTX_SIZE);
    buf.put_slice(&vendor_id);
    buf.put_slice(&codec_id);
    buf.put_u8(modes);
    buf.freeze()
}

impl AptxCapabilities {
    /// What we advertise for the aptX endpoint: 44.1 kHz stereo only.
    pub fn local() -> Self {
        AptxCapabilities {
            vendor_id: APTX_VENDOR_ID,
            codec_id: APTX_CODEC_ID,
            frequencies: SamplingFrequency::F44100.into(),
            channel_modes: ChannelMode::Stereo.into(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (vendor_id, codec_id, frequency, channel_mode) = parse_raw(bytes)?;

        Ok(AptxCapabilities {
            vendor_id,
            codec_id,
            frequencies: BitFlags::from_bits_truncate(frequency),
            channel_modes: BitFlags::from_bits_truncate(channel_mode),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        to_bytes(
            self.vendor_id,
            self.codec_id,
            self.frequencies.bits(),
            self.channel_modes.bits(),
        )
    }

    pub fn is_aptx(&self) -> bool {
        self.vendor_id == APTX_VENDOR_ID && self.codec_id == APTX_CODEC_ID
    }

    /// Prefers 44.1 kHz, then 48, 32 and 16 kHz. The channel mode is always
    /// stereo since that is the only mode aptX encodes, whatever the peer
    /// claims to support.
    pub fn select(&self) -> Result<AptxConfiguration> {
        if !self.is_aptx() {
            debug!("Vendor codec {:02x?}/{:02x?} is not aptX", self.vendor_id, self.codec_id);
            return Err(Error::NoSuitableConfiguration {
                field: "vendor codec id",
            });
        }

        let frequency = [
            SamplingFrequency::F44100,
            SamplingFrequency::F48000,
            SamplingFrequency::F32000,
            SamplingFrequency::F16000,
        ]
        .iter()
        .copied()
        .find(|f| self.frequencies.contains(*f))
        .ok_or(Error::NoSuitableConfiguration {
            field: "sampling frequency",
        })?;

        Ok(AptxConfiguration {
            frequency,
            channel_mode: ChannelMode::Stereo,
        })
    }
}

impl AptxConfiguration {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (vendor_id, codec_id, frequency, channel_mode) = parse_raw(bytes)?;

        if vendor_id != APTX_VENDOR_ID || codec_id != APTX_CODEC_ID {
            return Err(Error::InvalidConfiguration {
                field: "vendor codec id",
            });
        }

        let frequency = BitFlags::<SamplingFrequency>::from_bits(frequency)
            .ok()
            .and_then(BitFlags::exactly_one)
            .ok_or(Error::InvalidConfiguration {
                field: "sampling frequency",
            })?;

        if channel_mode != ChannelMode::Stereo as u8 {
            return Err(Error::InvalidConfiguration {
                field: "channel mode",
            });
        }

        Ok(AptxConfiguration {
            frequency,
            channel_mode: ChannelMode::Stereo,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        to_bytes(
            APTX_VENDOR_ID,
            APTX_CODEC_ID,
            self.frequency as u8,
            self.channel_mode as u8,
        )
    }
}
