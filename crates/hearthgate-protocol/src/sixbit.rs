//! The reversible six-bit transform shared by both protocol phases.
//!
//! Bytes are read as one big-endian bit stream and cut into 6-bit groups;
//! each group `g` is written as the printable byte `g + 0x3C`. The last
//! group is zero-padded on the right. Decoding reverses this and drops the
//! padding bits.
//!
//! ```text
//!  bytes:   0xFF                    → bits 11111111
//!  groups:  111111 | 11(0000)       → 0x3F, 0x30
//!  wire:    0x3F+0x3C, 0x30+0x3C    → "{l"
//! ```
//!
//! The alphabet (`0x3C..=0x7B`) contains neither `#` (0x23) nor `!`
//! (0x21), so encoded bodies can never collide with the frame markers,
//! and it contains no ASCII digits, which lets decoders recognise a
//! leading sequence digit.

use crate::DecodeError;

/// Offset added to every 6-bit group.
pub const SYMBOL_BASE: u8 = 0x3C;

/// Returns `true` if `b` is one of the 64 transform symbols.
pub fn is_symbol(b: u8) -> bool {
    (SYMBOL_BASE..SYMBOL_BASE + 64).contains(&b)
}

/// Number of symbols produced for `n` input bytes.
pub fn encoded_len(n: usize) -> usize {
    (n * 8).div_ceil(6)
}

/// Encodes `src` into transform symbols.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(src.len()));
    let mut acc: u16 = 0;
    let mut bits: u32 = 0;

    for &b in src {
        acc = (acc << 8) | u16::from(b);
        bits += 8;
        while bits >= 6 {
            bits -= 6;
            out.push(((acc >> bits) & 0x3F) as u8 + SYMBOL_BASE);
        }
        acc &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(((acc << (6 - bits)) & 0x3F) as u8 + SYMBOL_BASE);
    }

    out
}

/// Decodes transform symbols back into bytes.
///
/// # Errors
/// [`DecodeError::InvalidSymbol`] on the first byte outside the alphabet.
pub fn decode(src: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(src.len() * 3 / 4);
    let mut acc: u16 = 0;
    let mut bits: u32 = 0;

    for &c in src {
        if !is_symbol(c) {
            return Err(DecodeError::InvalidSymbol(c));
        }
        acc = (acc << 6) | u16::from(c - SYMBOL_BASE);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }

    Ok(out)
}
