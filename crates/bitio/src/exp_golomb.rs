//! Exp-Golomb coded values, as used by H.264/H.265 parameter sets.
//!
//! See: <https://en.wikipedia.org/wiki/Exponential-Golomb_coding>

use std::io;

use crate::{BitReader, BitWriter};

/// Extension trait for reading Exp-Golomb encoded numbers.
pub trait BitReaderExpGolombExt {
    /// Reads an unsigned Exp-Golomb encoded number.
    fn read_exp_golomb(&mut self) -> io::Result<u64>;

    /// Reads a signed Exp-Golomb encoded number.
    fn read_signed_exp_golomb(&mut self) -> io::Result<i64> {
        let value = self.read_exp_golomb()?;
        if value % 2 == 0 {
            Ok(-((value / 2) as i64))
        } else {
            Ok((value / 2) as i64 + 1)
        }
    }
}

impl BitReaderExpGolombExt for BitReader<'_> {
    fn read_exp_golomb(&mut self) -> io::Result<u64> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 63 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "exp-golomb value too large",
                ));
            }
        }

        let mut result = 1u64;
        for _ in 0..leading_zeros {
            result = (result << 1) | self.read_bit()? as u64;
        }

        Ok(result - 1)
    }
}

/// Extension trait for writing Exp-Golomb encoded numbers.
pub trait BitWriterExpGolombExt {
    /// Writes an unsigned Exp-Golomb encoded number.
    fn write_exp_golomb(&mut self, value: u64);

    /// Writes a signed Exp-Golomb encoded number.
    fn write_signed_exp_golomb(&mut self, value: i64) {
        let mapped = if value <= 0 {
            -value as u64 * 2
        } else {
            value as u64 * 2 - 1
        };
        self.write_exp_golomb(mapped);
    }
}

impl BitWriterExpGolombExt for BitWriter {
    fn write_exp_golomb(&mut self, value: u64) {
        let coded = value + 1;
        let width = 64 - coded.leading_zeros();
        for _ in 0..width - 1 {
            self.write_bit(false);
        }
        self.write_bits(coded, width);
    }
}
