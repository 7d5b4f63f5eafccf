//! Frame validation for the sensors that append a crc-8 (polynomial 0x31,
//! top bit first) to their data words. The two families only differ in
//! the seed.

use crc::{Algorithm, Crc, CRC_8_NRSC_5};

use crate::Error;

/// Same as [`CRC_8_NRSC_5`] but seeded with zero.
const CRC_8_ZERO_SEED: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xa2,
    residue: 0x00,
};

const ZERO_SEED: Crc<u8> = Crc::<u8>::new(&CRC_8_ZERO_SEED);
const FF_SEED: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// Climate and co2 family (htu21d), seed 0x00
    Zero,
    /// Voc family (sgp30), seed 0xFF
    Ff,
}

impl Seed {
    fn crc(self) -> &'static Crc<u8> {
        match self {
            Seed::Zero => &ZERO_SEED,
            Seed::Ff => &FF_SEED,
        }
    }

    pub fn checksum(self, data: &[u8]) -> u8 {
        self.crc().checksum(data)
    }

    /// A frame is `[payload.., crc]`. Running the crc over the whole frame,
    /// trailing crc byte included, yields zero iff the frame is intact.
    pub fn is_valid(self, frame: &[u8]) -> bool {
        !frame.is_empty() && self.checksum(frame) == 0
    }

    /// Returns the payload of a valid frame.
    pub fn validate(self, frame: &[u8]) -> Result<&[u8], Error> {
        let Some((got, payload)) = frame.split_last() else {
            return Err(Error::Crc {
                expected: self.checksum(&[]),
                got: 0,
            });
        };

        if self.is_valid(frame) {
            Ok(payload)
        } else {
            Err(Error::Crc {
                expected: self.checksum(payload),
                got: *got,
            })
        }
    }

    /// Decodes one big endian data word followed by its crc.
    pub fn word(self, frame: [u8; 3]) -> Result<u16, Error> {
        let payload = self.validate(&frame)?;
        Ok(u16::from_be_bytes([payload[0], payload[1]]))
    }

    /// Encodes a data word and appends its crc.
    pub fn encode_word(self, word: u16) -> [u8; 3] {
        let [msb, lsb] = word.to_be_bytes();
        [msb, lsb, self.checksum(&[msb, lsb])]
    }
}
