use bytes::{Buf, BufMut, Bytes, BytesMut};
use enumflags2::{bitflags, BitFlags};
use tracing::error;

use super::{get_field, set_field, ChannelMode, SamplingFrequency};
use crate::{Config, Error, Result};

/// Size of the SBC codec information element.
pub const SBC_SIZE: usize = 4;

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockLength {
    L16 = 1 << 0,
    L12 = 1 << 1,
    L8 = 1 << 2,
    L4 = 1 << 3,
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Subbands {
    S8 = 1 << 0,
    S4 = 1 << 1,
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocationMethod {
    Loudness = 1 << 0,
    Snr = 1 << 1,
}

// lowest frequency first; selection walks this table in both directions
const FREQUENCY_TABLE: [SamplingFrequency; 4] = [
    SamplingFrequency::F16000,
    SamplingFrequency::F32000,
    SamplingFrequency::F44100,
    SamplingFrequency::F48000,
];

/// The raw fields of the element, before they are interpreted as masks or
/// single values.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
struct RawSbc {
    channel_mode: u8,
    frequency: u8,
    allocation_method: u8,
    subbands: u8,
    block_length: u8,
    min_bitpool: u8,
    max_bitpool: u8,
}

impl RawSbc {
    fn parse<B: Buf>(mut buf: B) -> Result<Self> {
        if buf.remaining() != SBC_SIZE {
            return Err(Error::InvalidConfigurationSize {
                expected: SBC_SIZE,
                found: buf.remaining(),
            });
        }

        let modes = buf.get_u8();
        let blocks = buf.get_u8();

        Ok(RawSbc {
            channel_mode: get_field(modes, 0..4),
            frequency: get_field(modes, 4..8),
            allocation_method: get_field(blocks, 0..2),
            subbands: get_field(blocks, 2..4),
            block_length: get_field(blocks, 4..8),
            min_bitpool: buf.get_u8(),
            max_bitpool: buf.get_u8(),
        })
    }

    fn to_bytes(&self) -> Bytes {
        let mut modes = 0u8;
        set_field(&mut modes, 0..4, self.channel_mode);
        set_field(&mut modes, 4..8, self.frequency);

        let mut blocks = 0u8;
        set_field(&mut blocks, 0..2, self.allocation_method);
        set_field(&mut blocks, 2..4, self.subbands);
        set_field(&mut blocks, 4..8, self.block_length);

        let mut buf = BytesMut::with_capacity(SBC_SIZE);
        buf.put_u8(modes);
        buf.put_u8(blocks);
        buf.put_u8(self.min_bitpool);
        buf.put_u8(self.max_bitpool);
        buf.freeze()
    }
}

/// Everything an SBC endpoint supports; each field is a set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SbcCapabilities {
    pub frequencies: BitFlags<SamplingFrequency>,
    pub channel_modes: BitFlags<ChannelMode>,
    pub block_lengths: BitFlags<BlockLength>,
    pub subbands: BitFlags<Subbands>,
    pub allocation_methods: BitFlags<AllocationMethod>,
    pub min_bitpool: u8,
    pub max_bitpool: u8,
}

/// One concrete SBC configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SbcConfiguration {
    pub frequency: SamplingFrequency,
    pub channel_mode: ChannelMode,
    pub block_length: BlockLength,
    pub subbands: Subbands,
    pub allocation_method: AllocationMethod,
    pub min_bitpool: u8,
    pub max_bitpool: u8,
}

/// Recommended maximum bitpool for a frequency and channel mode, as given by
/// the A2DP specification.
pub fn default_bitpool(frequency: SamplingFrequency, channel_mode: ChannelMode) -> u8 {
    let mono_or_dual = matches!(channel_mode, ChannelMode::Mono | ChannelMode::DualChannel);

    match frequency {
        SamplingFrequency::F16000 | SamplingFrequency::F32000 => 53,
        SamplingFrequency::F44100 if mono_or_dual => 31,
        SamplingFrequency::F44100 => 53,
        SamplingFrequency::F48000 if mono_or_dual => 29,
        SamplingFrequency::F48000 => 51,
    }
}

impl SbcCapabilities {
    /// Every field fully populated, with the given bitpool range. This is
    /// what we advertise when registering an SBC endpoint.
    pub fn all(min_bitpool: u8, max_bitpool: u8) -> Self {
        SbcCapabilities {
            frequencies: BitFlags::all(),
            channel_modes: BitFlags::all(),
            block_lengths: BitFlags::all(),
            subbands: BitFlags::all(),
            allocation_methods: BitFlags::all(),
            min_bitpool,
            max_bitpool,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw = RawSbc::parse(bytes)?;

        Ok(SbcCapabilities {
            frequencies: BitFlags::from_bits_truncate(raw.frequency),
            channel_modes: BitFlags::from_bits_truncate(raw.channel_mode),
            block_lengths: BitFlags::from_bits_truncate(raw.block_length),
            subbands: BitFlags::from_bits_truncate(raw.subbands),
            allocation_methods: BitFlags::from_bits_truncate(raw.allocation_method),
            min_bitpool: raw.min_bitpool,
            max_bitpool: raw.max_bitpool,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        RawSbc {
            channel_mode: self.channel_modes.bits(),
            frequency: self.frequencies.bits(),
            allocation_method: self.allocation_methods.bits(),
            subbands: self.subbands.bits(),
            block_length: self.block_lengths.bits(),
            min_bitpool: self.min_bitpool,
            max_bitpool: self.max_bitpool,
        }
        .to_bytes()
    }

    /// Picks one configuration out of what the peer advertised.
    ///
    /// The sampling frequency is the lowest one at or above the configured
    /// default rate, falling back to the highest one the peer supports. The
    /// bitpool range is narrowed to what both sides accept and fails if the
    /// result is empty.
    pub fn select(&self, config: &Config) -> Result<SbcConfiguration> {
        let frequency = FREQUENCY_TABLE
            .iter()
            .find(|f| f.rate() >= config.default_sample_rate && self.frequencies.contains(**f))
            .or_else(|| {
                FREQUENCY_TABLE
                    .iter()
                    .rev()
                    .find(|f| self.frequencies.contains(**f))
            })
            .copied()
            .ok_or(Error::NoSuitableConfiguration {
                field: "sampling frequency",
            })?;

        let mode_preference = if config.default_channels >= 2 {
            [
                ChannelMode::JointStereo,
                ChannelMode::Stereo,
                ChannelMode::DualChannel,
                ChannelMode::Mono,
            ]
        } else {
            [
                ChannelMode::Mono,
                ChannelMode::DualChannel,
                ChannelMode::Stereo,
                ChannelMode::JointStereo,
            ]
        };

        let channel_mode = pick(self.channel_modes, &mode_preference).ok_or(
            Error::NoSuitableConfiguration {
                field: "channel mode",
            },
        )?;

        let block_length = pick(
            self.block_lengths,
            &[
                BlockLength::L16,
                BlockLength::L12,
                BlockLength::L8,
                BlockLength::L4,
            ],
        )
        .ok_or(Error::NoSuitableConfiguration {
            field: "block length",
        })?;

        let subbands = pick(self.subbands, &[Subbands::S8, Subbands::S4])
            .ok_or(Error::NoSuitableConfiguration { field: "subbands" })?;

        let allocation_method = pick(
            self.allocation_methods,
            &[AllocationMethod::Loudness, AllocationMethod::Snr],
        )
        .ok_or(Error::NoSuitableConfiguration {
            field: "allocation method",
        })?;

        let min_bitpool = config.min_bitpool.max(self.min_bitpool);
        let max_bitpool = default_bitpool(frequency, channel_mode)
            .min(config.max_bitpool)
            .min(self.max_bitpool);

        if min_bitpool > max_bitpool {
            error!(
                "Bitpool range [{}, {}] is empty for {} Hz",
                min_bitpool,
                max_bitpool,
                frequency.rate()
            );
            return Err(Error::NoSuitableConfiguration { field: "bitpool" });
        }

        Ok(SbcConfiguration {
            frequency,
            channel_mode,
            block_length,
            subbands,
            allocation_method,
            min_bitpool,
            max_bitpool,
        })
    }
}

fn pick<T>(available: BitFlags<T>, preference: &[T]) -> Option<T>
where
    T: enumflags2::BitFlag,
{
    preference.iter().copied().find(|v| available.contains(*v))
}

fn single<T>(raw: u8, field: &'static str) -> Result<T>
where
    T: enumflags2::BitFlag<Numeric = u8>,
{
    BitFlags::<T>::from_bits(raw)
        .ok()
        .and_then(BitFlags::exactly_one)
        .ok_or(Error::InvalidConfiguration { field })
}

impl SbcConfiguration {
    /// Parses a configuration chosen by the remote side. Every field has to
    /// hold exactly one legal value.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw = RawSbc::parse(bytes)?;

        Ok(SbcConfiguration {
            frequency: single(raw.frequency, "sampling frequency")?,
            channel_mode: single(raw.channel_mode, "channel mode")?,
            allocation_method: single(raw.allocation_method, "allocation method")?,
            subbands: single(raw.subbands, "subbands")?,
            block_length: single(raw.block_length, "block length")?,
            min_bitpool: raw.min_bitpool,
            max_bitpool: raw.max_bitpool,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        RawSbc {
            channel_mode: self.channel_mode as u8,
            frequency: self.frequency as u8,
            allocation_method: self.allocation_method as u8,
            subbands: self.subbands as u8,
            block_length: self.block_length as u8,
            min_bitpool: self.min_bitpool,
            max_bitpool: self.max_bitpool,
        }
        .to_bytes()
    }

    /// Whether every field of this configuration is offered by `caps`.
    pub fn is_subset_of(&self, caps: &SbcCapabilities) -> bool {
        caps.frequencies.contains(self.frequency)
            && caps.channel_modes.contains(self.channel_mode)
            && caps.block_lengths.contains(self.block_length)
            && caps.subbands.contains(self.subbands)
            && caps.allocation_methods.contains(self.allocation_method)
            && self.min_bitpool >= caps.min_bitpool
            && self.max_bitpool <= caps.max_bitpool
    }
}
