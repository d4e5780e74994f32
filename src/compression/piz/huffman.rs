//! 16-bit Huffman decompression.
//! Huffman compression and decompression routines originally written
//! by Christian Rouet for the PIZ image file format.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/main/src/lib/OpenEXR/ImfHuf.cpp

use crate::error::{Error, Result};

const ENCODE_BITS: usize = 16; // literal (value) bit length
const ENCODE_SIZE: usize = (1 << ENCODE_BITS) + 1; // +1 for the run-length pseudo-symbol
const DECODE_BITS: u32 = 14; // primary decode table index width, >= 8
const DECODE_SIZE: usize = 1 << DECODE_BITS;

/// The pseudo-symbol `hufBuildEncTable` appends above the real alphabet; when it is
/// decoded, the following 8 bits give a repeat count for the previously decoded value.
const RUN_LENGTH_SYMBOL: u32 = (ENCODE_SIZE - 1) as u32;

const SHORT_ZEROCODE_RUN: u8 = 59;
const LONG_ZEROCODE_RUN: u8 = 63;
const SHORTEST_LONG_RUN: u32 = 2 + LONG_ZEROCODE_RUN as u32 - SHORT_ZEROCODE_RUN as u32;
const MAX_CODE_LENGTH: usize = 58;

/// MSB-first bit reader, bounded to an exact bit count (`nBits` from the payload header).
struct BitReader<'b> {
    bytes: &'b [u8],
    position: u64,
    limit: u64,
}

impl<'b> BitReader<'b> {
    fn new(bytes: &'b [u8], limit: u64) -> Self {
        Self { bytes, position: 0, limit }
    }

    fn read_bits(&mut self, count: u32) -> Result<u64> {
        let mut value = 0_u64;

        for _ in 0..count {
            if self.position >= self.limit {
                return Err(Error::invalid("huffman bitstream exhausted"));
            }

            let byte_index = (self.position / 8) as usize;
            let bit_index = 7 - (self.position % 8);
            let byte = *self.bytes.get(byte_index).ok_or_else(|| Error::invalid("huffman bitstream truncated"))?;

            value = (value << 1) | ((byte >> bit_index) & 1) as u64;
            self.position += 1;
        }

        Ok(value)
    }

    fn has_bits(&self) -> bool { self.position < self.limit }
}

fn read_header_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes.get(offset..offset + 4).ok_or_else(|| Error::invalid("huffman header truncated"))?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Unpacks the 6-bit-per-symbol code length table covering `min_symbol..=max_symbol`,
/// honouring the two zero-run escapes that keep long runs of unused symbols cheap.
fn unpack_code_lengths(bits: &mut BitReader<'_>, min_symbol: u32, max_symbol: u32) -> Result<Vec<u8>> {
    let mut lengths = vec![0_u8; ENCODE_SIZE];
    let mut symbol = min_symbol;

    while symbol <= max_symbol {
        let packed = bits.read_bits(6)? as u8;

        if packed == LONG_ZEROCODE_RUN {
            let run = bits.read_bits(8)? as u32 + SHORTEST_LONG_RUN;
            if symbol as u64 + run as u64 > max_symbol as u64 + 1 {
                return Err(Error::invalid("huffman zero run overruns the symbol table"));
            }
            symbol += run;
        } else if packed >= SHORT_ZEROCODE_RUN {
            let run = (packed as u32 - SHORT_ZEROCODE_RUN as u32) + 2;
            if symbol as u64 + run as u64 > max_symbol as u64 + 1 {
                return Err(Error::invalid("huffman zero run overruns the symbol table"));
            }
            symbol += run;
        } else {
            lengths[symbol as usize] = packed;
            symbol += 1;
        }
    }

    Ok(lengths)
}

/// Ported from `hufCanonicalCodeTable`: assigns canonical codes by sweeping code
/// lengths from 58 down to 1, so the resulting bit patterns match the reference
/// encoder's bit for bit (canonical Huffman codes are not unique without this rule).
fn canonical_codes(lengths: &[u8]) -> Vec<u64> {
    let mut count = [0_i64; MAX_CODE_LENGTH + 1];
    for &length in lengths {
        count[length as usize] += 1;
    }

    let mut base = [0_i64; MAX_CODE_LENGTH + 1];
    let mut carry = 0_i64;

    for length in (1..=MAX_CODE_LENGTH).rev() {
        let next_carry = (carry + count[length]) >> 1;
        base[length] = carry;
        carry = next_carry;
    }

    let mut next = base;
    let mut codes = vec![0_u64; lengths.len()];

    for (symbol, &length) in lengths.iter().enumerate() {
        if length > 0 {
            codes[symbol] = next[length as usize] as u64;
            next[length as usize] += 1;
        }
    }

    codes
}

#[derive(Clone, Copy)]
struct PrimaryEntry { length: u8, symbol: u32 }

/// A 14-bit-indexed primary table plus overflow lists for codes longer than
/// `DECODE_BITS`, per the reference decoder's `HufDec` layout.
struct DecodeTable {
    primary: Vec<Option<PrimaryEntry>>,
    overflow: std::collections::HashMap<u64, Vec<(u8, u64, u32)>>,
}

fn build_decode_table(lengths: &[u8], codes: &[u64]) -> Result<DecodeTable> {
    let mut primary = vec![None; DECODE_SIZE];
    let mut overflow: std::collections::HashMap<u64, Vec<(u8, u64, u32)>> = std::collections::HashMap::new();

    for (symbol, (&length, &code)) in lengths.iter().zip(codes.iter()).enumerate() {
        if length == 0 {
            continue;
        }

        if (length as u32) <= DECODE_BITS {
            let shift = DECODE_BITS - length as u32;
            let base = (code << shift) as usize;

            for slot in base..base + (1usize << shift) {
                if primary[slot].is_some() {
                    return Err(Error::invalid("huffman decode table has a conflicting entry"));
                }
                primary[slot] = Some(PrimaryEntry { length, symbol: symbol as u32 });
            }
        } else {
            let prefix = code >> (length as u32 - DECODE_BITS);
            overflow.entry(prefix).or_default().push((length, code, symbol as u32));
        }
    }

    Ok(DecodeTable { primary, overflow })
}

impl DecodeTable {
    fn decode_one(&self, bits: &mut BitReader<'_>) -> Result<u32> {
        let prefix = bits.read_bits(DECODE_BITS)?;

        if let Some(entry) = self.primary[prefix as usize] {
            bits.position -= (DECODE_BITS - entry.length as u32) as u64;
            return Ok(entry.symbol);
        }

        if let Some(candidates) = self.overflow.get(&prefix) {
            for &(length, code, symbol) in candidates {
                let extra_bits = length as u32 - DECODE_BITS;
                let rewind = bits.position;
                let extra = bits.read_bits(extra_bits)?;

                if (prefix << extra_bits) | extra == code {
                    return Ok(symbol);
                }

                bits.position = rewind;
            }
        }

        Err(Error::invalid("huffman bitstream does not match any known code"))
    }
}

/// Decodes a Huffman-compressed stream to exactly `expected_value_count` u16 samples.
/// `input` starts at the 24-byte preface (`minSymbol, maxSymbol, pad, nBits, pad`).
pub fn decompress(input: &[u8], expected_value_count: usize) -> Result<Vec<u16>> {
    if input.len() < 24 {
        return Err(Error::invalid("huffman payload is too short for its preface"));
    }

    let min_symbol = read_header_u32(input, 0)?;
    let max_symbol = read_header_u32(input, 4)?;
    let bit_count = read_header_u32(input, 12)? as u64;
    let table = &input[24..];

    if max_symbol as usize >= ENCODE_SIZE || min_symbol > max_symbol {
        return Err(Error::invalid("huffman symbol range is invalid"));
    }

    if expected_value_count == 0 {
        return Ok(Vec::new());
    }

    let mut bits = BitReader::new(table, bit_count);
    let lengths = unpack_code_lengths(&mut bits, min_symbol, max_symbol)?;
    let codes = canonical_codes(&lengths);
    let decode_table = build_decode_table(&lengths, &codes)?;

    let mut output = Vec::with_capacity(expected_value_count);

    while output.len() < expected_value_count && bits.has_bits() {
        let symbol = decode_table.decode_one(&mut bits)?;

        if symbol == RUN_LENGTH_SYMBOL {
            let run = bits.read_bits(8)? as usize;
            let previous = *output.last().ok_or_else(|| Error::invalid("huffman run precedes any decoded value"))?;

            if output.len() + run > expected_value_count {
                return Err(Error::invalid("huffman run overruns the expected value count"));
            }

            output.resize(output.len() + run, previous);
        } else {
            output.push(symbol as u16);
        }
    }

    if output.len() != expected_value_count {
        return Err(Error::invalid("huffman stream produced fewer values than expected"));
    }

    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_short_preface() {
        assert!(decompress(&[0; 10], 4).is_err());
    }

    #[test]
    fn rejects_inverted_symbol_range() {
        let mut header = vec![0_u8; 24];
        header[0..4].copy_from_slice(&10_u32.to_le_bytes());
        header[4..8].copy_from_slice(&1_u32.to_le_bytes());
        assert!(decompress(&header, 4).is_err());
    }

    #[test]
    fn empty_expectation_short_circuits() {
        let header = vec![0_u8; 24];
        assert_eq!(decompress(&header, 0).unwrap(), Vec::<u16>::new());
    }
}
