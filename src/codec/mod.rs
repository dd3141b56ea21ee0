//! Capability and configuration blobs exchanged with the remote A2DP stack.
//!
//! Each codec information element packs several sub-byte fields into one
//! octet. The fields are listed lowest bits first, so a field declared first
//! occupies the least significant bits of its octet. The packing is done
//! explicitly here instead of relying on any particular bit-field layout.

use std::ops::Range;

use bitvec::{field::BitField, prelude as bv, view::BitView};
use enumflags2::bitflags;
use num_traits::FromPrimitive;

pub use aptx::*;
pub use sbc::*;

mod aptx;
mod sbc;

/// A2DP codec identifiers, as passed in the `Codec` property.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum Codec {
    Sbc = 0x00,
    Mpeg12 = 0x01,
    Mpeg24 = 0x02,
    Atrac = 0x03,
    /// Non-A2DP codec identified by a vendor and codec id; used for aptX.
    Vendor = 0xFF,
}

impl Codec {
    pub fn from_u8(value: u8) -> Option<Codec> {
        FromPrimitive::from_u8(value)
    }
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SamplingFrequency {
    F48000 = 1 << 0,
    F44100 = 1 << 1,
    F32000 = 1 << 2,
    F16000 = 1 << 3,
}

impl SamplingFrequency {
    pub fn rate(&self) -> u32 {
        match self {
            SamplingFrequency::F16000 => 16000,
            SamplingFrequency::F32000 => 32000,
            SamplingFrequency::F44100 => 44100,
            SamplingFrequency::F48000 => 48000,
        }
    }
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelMode {
    JointStereo = 1 << 0,
    Stereo = 1 << 1,
    DualChannel = 1 << 2,
    Mono = 1 << 3,
}

impl ChannelMode {
    pub fn channels(&self) -> u8 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

pub(crate) fn get_field(byte: u8, bits: Range<usize>) -> u8 {
    byte.view_bits::<bv::Lsb0>()[bits].load::<u8>()
}

pub(crate) fn set_field(byte: &mut u8, bits: Range<usize>, value: u8) {
    byte.view_bits_mut::<bv::Lsb0>()[bits].store::<u8>(value);
}
