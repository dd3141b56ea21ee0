use std::fmt::{Display, Formatter};

use bitvec::{field::BitField, prelude as bv, view::BitView};
use enumflags2::{bitflags, BitFlags};

#[bitflags]
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ServiceClass {
    Positioning = 1 << 16,
    Networking = 1 << 17,
    Rendering = 1 << 18,
    Capturing = 1 << 19,
    ObjectTransfer = 1 << 20,
    Audio = 1 << 21,
    Telephony = 1 << 22,
    Information = 1 << 23,
}

pub type ServiceClasses = BitFlags<ServiceClass>;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MajorClass {
    Miscellaneous,
    Computer,
    Phone,
    AccessPoint,
    AudioVideo,
    Peripheral,
    Imaging,
    Wearable,
    Toy,
    Health,
    Uncategorized,
    Unknown,
}

/// Minor classes of the audio/video major class.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum AudioVideoClass {
    Uncategorized,
    Headset,
    HandsFree,
    Microphone,
    Loudspeaker,
    Headphones,
    Portable,
    Car,
    SetTop,
    HiFi,
    Vcr,
    VideoCamera,
    Camcorder,
    VideoMonitor,
    VideoDisplayLoudspeaker,
    VideoConferencing,
    Gaming,
    Unknown,
}

/// How an audio device is meant to be used, as derived from its class of
/// device.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum FormFactor {
    Unknown,
    Headset,
    HandsFree,
    Microphone,
    Speaker,
    Headphone,
    Portable,
    Car,
    HiFi,
    Phone,
}

impl FormFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormFactor::Unknown => "unknown",
            FormFactor::Headset => "headset",
            FormFactor::HandsFree => "hands-free",
            FormFactor::Microphone => "microphone",
            FormFactor::Speaker => "speaker",
            FormFactor::Headphone => "headphone",
            FormFactor::Portable => "portable",
            FormFactor::Car => "car",
            FormFactor::HiFi => "hifi",
            FormFactor::Phone => "phone",
        }
    }
}

impl Display for FormFactor {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        f.write_str(self.as_str())
    }
}

/// The 24-bit class of device reported in a device's `Class` property.
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone)]
pub struct DeviceClass(pub u32);

impl DeviceClass {
    pub fn service_classes(&self) -> ServiceClasses {
        ServiceClasses::from_bits_truncate(self.0)
    }

    pub fn major(&self) -> MajorClass {
        // major device class encoded in bits 8-12
        match self.0.view_bits::<bv::Lsb0>()[8..13].load::<u8>() {
            0b00000 => MajorClass::Miscellaneous,
            0b00001 => MajorClass::Computer,
            0b00010 => MajorClass::Phone,
            0b00011 => MajorClass::AccessPoint,
            0b00100 => MajorClass::AudioVideo,
            0b00101 => MajorClass::Peripheral,
            0b00110 => MajorClass::Imaging,
            0b00111 => MajorClass::Wearable,
            0b01000 => MajorClass::Toy,
            0b01001 => MajorClass::Health,
            0b11111 => MajorClass::Uncategorized,
            _ => MajorClass::Unknown,
        }
    }

    fn minor(&self) -> u8 {
        // minor device class in bits 2-7
        self.0.view_bits::<bv::Lsb0>()[2..8].load::<u8>()
    }

    pub fn audio_video(&self) -> Option<AudioVideoClass> {
        if self.major() != MajorClass::AudioVideo {
            return None;
        }

        Some(match self.minor() {
            0b000000 => AudioVideoClass::Uncategorized,
            0b000001 => AudioVideoClass::Headset,
            0b000010 => AudioVideoClass::HandsFree,
            // 000011 is reserved
            0b000100 => AudioVideoClass::Microphone,
            0b000101 => AudioVideoClass::Loudspeaker,
            0b000110 => AudioVideoClass::Headphones,
            0b000111 => AudioVideoClass::Portable,
            0b001000 => AudioVideoClass::Car,
            0b001001 => AudioVideoClass::SetTop,
            0b001010 => AudioVideoClass::HiFi,
            0b001011 => AudioVideoClass::Vcr,
            0b001100 => AudioVideoClass::VideoCamera,
            0b001101 => AudioVideoClass::Camcorder,
            0b001110 => AudioVideoClass::VideoMonitor,
            0b001111 => AudioVideoClass::VideoDisplayLoudspeaker,
            0b010000 => AudioVideoClass::VideoConferencing,
            // 010001 is reserved
            0b010010 => AudioVideoClass::Gaming,
            _ => AudioVideoClass::Unknown,
        })
    }

    pub fn form_factor(&self) -> FormFactor {
        if self.major() == MajorClass::Phone {
            return FormFactor::Phone;
        }

        match self.audio_video() {
            Some(AudioVideoClass::Headset) => FormFactor::Headset,
            Some(AudioVideoClass::HandsFree) => FormFactor::HandsFree,
            Some(AudioVideoClass::Microphone) => FormFactor::Microphone,
            Some(AudioVideoClass::Loudspeaker) => FormFactor::Speaker,
            Some(AudioVideoClass::Headphones) => FormFactor::Headphone,
            Some(AudioVideoClass::Portable) => FormFactor::Portable,
            Some(AudioVideoClass::Car) => FormFactor::Car,
            Some(AudioVideoClass::HiFi) => FormFactor::HiFi,
            _ => FormFactor::Unknown,
        }
    }
}

impl From<u32> for DeviceClass {
    fn from(class: u32) -> Self {
        DeviceClass(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn headset_class() {
        // rendering + audio, audio/video major, headset minor
        let class = DeviceClass(0x240404);
        assert_eq!(class.major(), MajorClass::AudioVideo);
        assert_eq!(class.audio_video(), Some(AudioVideoClass::Headset));
        assert_eq!(class.form_factor(), FormFactor::Headset);
        assert_eq!(
            class.service_classes(),
            ServiceClass::Rendering | ServiceClass::Audio
        );
    }

    #[test]
    pub fn form_factors() {
        assert_eq!(DeviceClass(0x200418).form_factor(), FormFactor::Headphone);
        assert_eq!(DeviceClass(0x240414).form_factor(), FormFactor::Speaker);
        assert_eq!(DeviceClass(0x200420).form_factor(), FormFactor::Car);
        assert_eq!(DeviceClass(0x5a020c).form_factor(), FormFactor::Phone);
        assert_eq!(DeviceClass(0x10010c).form_factor(), FormFactor::Unknown);
        assert_eq!(DeviceClass(0x10010c).audio_video(), None);
        assert_eq!(DeviceClass(0).major(), MajorClass::Miscellaneous);
    }
}
