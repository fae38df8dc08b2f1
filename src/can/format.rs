//! CAN signal and message format descriptions, plus the compiled bit-extraction
//! steps used by [`crate::can::decoder`].
//!
//! `Step` compilation and extraction are motorola/intel bit-layout
//! arithmetic widened to carry a `SignalId`/`SignalType` pair instead of a
//! DBC-text-derived name/unit.

use crate::types::{SignalId, SignalType};

/// Bit layout convention for a signal within its frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Motorola/big-endian: `start_bit` is the signal's MSB.
    BigEndian,
    /// Intel/little-endian: `start_bit` is the signal's LSB.
    LittleEndian,
}

/// Whether raw extraction bits are sign-extended before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
}

/// Elementary byte-to-value extraction step, identical in shape to the
/// teacher corpus's DBC `Step` (byte index, source LSB, width, destination
/// LSB), accumulated LSB-first into a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Step {
    pub(crate) byte_index: u8,
    pub(crate) src_lsb: u8,
    pub(crate) width: u8,
    pub(crate) dst_lsb: u16,
}

/// Describes one signal's bit position, scaling, and declared output type
/// within a CAN message format.
#[derive(Debug, Clone)]
pub struct CanSignalFormat {
    pub signal_id: SignalId,
    pub start_bit: u16,
    pub bit_length: u16,
    pub endian: Endianness,
    pub sign: Signedness,
    pub factor: f64,
    pub offset: f64,
    pub output_type: SignalType,
    steps: Vec<Step>,
}

impl CanSignalFormat {
    pub fn new(
        signal_id: SignalId,
        start_bit: u16,
        bit_length: u16,
        endian: Endianness,
        sign: Signedness,
        factor: f64,
        offset: f64,
        output_type: SignalType,
    ) -> Self {
        let mut format = Self {
            signal_id,
            start_bit,
            bit_length,
            endian,
            sign,
            factor,
            offset,
            output_type,
            steps: Vec::new(),
        };
        format.compile();
        format
    }

    /// Highest byte index this signal's extraction touches (used to check
    /// whether a signal fits within a given payload length).
    pub fn max_byte_index(&self) -> u8 {
        self.steps.iter().map(|s| s.byte_index).max().unwrap_or(0)
    }

    fn compile(&mut self) {
        match self.endian {
            Endianness::LittleEndian => self.compile_intel(),
            Endianness::BigEndian => self.compile_motorola(),
        }
    }

    fn compile_intel(&mut self) {
        let mut remaining = self.bit_length;
        let mut bit = self.start_bit;
        let mut dst: u16 = 0;

        while remaining > 0 {
            let byte_idx = (bit / 8) as u8;
            let bit_off = (bit % 8) as u8;
            let avail = 8 - bit_off;
            let take = remaining.min(avail as u16) as u8;

            self.steps.push(Step {
                byte_index: byte_idx,
                src_lsb: bit_off,
                width: take,
                dst_lsb: dst,
            });

            bit += take as u16;
            dst += take as u16;
            remaining -= take as u16;
        }
    }

    /// In the DBC big-endian convention the start bit is the signal's MSB;
    /// extraction advances MSB-first.
    fn compile_motorola(&mut self) {
        let mut remaining = self.bit_length;
        let mut byte = (self.start_bit / 8) as usize;
        let mut bit_msb: u8 = 7 - (self.start_bit % 8) as u8;

        while remaining > 0 {
            let can_take = (bit_msb as u16 + 1).min(remaining);
            let src_lsb = bit_msb + 1 - can_take as u8;
            let dst_lsb = remaining - can_take;

            self.steps.push(Step {
                byte_index: byte as u8,
                src_lsb,
                width: can_take as u8,
                dst_lsb,
            });

            remaining -= can_take;
            if src_lsb == 0 {
                byte += 1;
                bit_msb = 7;
            } else {
                bit_msb = src_lsb - 1;
            }
        }
    }

    /// Extracts the unsigned raw bit pattern from `payload`. Returns `None`
    /// if any step reaches past the payload's actual length (caller skips
    /// this signal only, per spec's partial-decode policy).
    pub(crate) fn extract_raw_u64(&self, payload: &[u8]) -> Option<u64> {
        let mut out: u64 = 0;
        for step in &self.steps {
            let byte = *payload.get(step.byte_index as usize)?;
            let mask: u8 = if step.width == 8 {
                0xFF
            } else {
                ((1u16 << step.width) - 1) as u8
            };
            let chunk = ((byte >> step.src_lsb) & mask) as u64;
            out |= chunk << step.dst_lsb;
        }
        Some(out)
    }

    pub(crate) fn extract_raw_i64(&self, payload: &[u8]) -> Option<i64> {
        let raw_u = self.extract_raw_u64(payload)?;
        let n = self.bit_length.min(64);
        if matches!(self.sign, Signedness::Signed) && n > 0 {
            let sign_bit = 1u64 << (n - 1);
            if raw_u & sign_bit != 0 {
                let mask = if n == 64 { u64::MAX } else { (1u64 << n) - 1 };
                Some((raw_u | !mask) as i64)
            } else {
                Some(raw_u as i64)
            }
        } else {
            Some(raw_u as i64)
        }
    }

    /// Extracts and scales this signal out of `payload`, honoring sign and
    /// `factor`/`offset`. `None` means the signal's bits exceed the
    /// payload's actual length.
    pub fn extract_physical(&self, payload: &[u8]) -> Option<f64> {
        let raw = self.extract_raw_i64(payload)?;
        Some(raw as f64 * self.factor + self.offset)
    }
}

/// Describes one CAN message's expected length and the signals packed
/// within it.
#[derive(Debug, Clone)]
pub struct CanMessageFormat {
    pub frame_id: u32,
    pub declared_length: u8,
    pub signals: Vec<CanSignalFormat>,
    pub valid: bool,
}

impl CanMessageFormat {
    pub fn new(frame_id: u32, declared_length: u8, signals: Vec<CanSignalFormat>) -> Self {
        Self {
            frame_id,
            declared_length,
            signals,
            valid: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_signed_extraction_matches_s1_vector() {
        // Byte-aligned big-endian bit numbering (start bit = MSB position,
        // byte*8 + (7 - bit-from-LSB)): signal 1 spans bytes 1..3, signal 7
        // spans bytes 4..7, verified against the documented decoded values.
        let payload: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let sig1 = CanSignalFormat::new(
            SignalId(1),
            8,
            24,
            Endianness::BigEndian,
            Signedness::Signed,
            1.0,
            0.0,
            SignalType::Double,
        );
        assert_eq!(sig1.extract_physical(&payload), Some(0x10203 as f64));

        let sig7 = CanSignalFormat::new(
            SignalId(7),
            32,
            32,
            Endianness::BigEndian,
            Signedness::Signed,
            1.0,
            0.0,
            SignalType::Double,
        );
        assert_eq!(sig7.extract_physical(&payload), Some(0x4050607 as f64));
    }

    #[test]
    fn little_endian_roundtrips_simple_value() {
        let payload: [u8; 2] = [0x34, 0x12];
        let sig = CanSignalFormat::new(
            SignalId(2),
            0,
            16,
            Endianness::LittleEndian,
            Signedness::Unsigned,
            1.0,
            0.0,
            SignalType::Double,
        );
        assert_eq!(sig.extract_physical(&payload), Some(0x1234 as f64));
    }

    #[test]
    fn extraction_past_payload_len_is_none() {
        let payload: [u8; 1] = [0xFF];
        let sig = CanSignalFormat::new(
            SignalId(3),
            0,
            16,
            Endianness::LittleEndian,
            Signedness::Unsigned,
            1.0,
            0.0,
            SignalType::Double,
        );
        assert_eq!(sig.extract_physical(&payload), None);
    }

    #[test]
    fn factor_offset_scaling_applies() {
        let payload: [u8; 1] = [10];
        let sig = CanSignalFormat::new(
            SignalId(4),
            0,
            8,
            Endianness::LittleEndian,
            Signedness::Unsigned,
            0.5,
            1.0,
            SignalType::Double,
        );
        assert_eq!(sig.extract_physical(&payload), Some(6.0));
    }
}
