// Synthetic KRvK tables. Each side to move stores one constant value for
// every position, which is enough to exercise the complete probing path.

#![allow(dead_code)]

use std::{fs, path::Path};

use shakmaty::{fen::Fen, CastlingMode, Chess};
use syzygy_probe::RawPosition;

const WDL_MAGIC: [u8; 4] = [0x71, 0xe8, 0x23, 0x5d];
const DTZ_MAGIC: [u8; 4] = [0xd7, 0x66, 0x0c, 0xa5];

/// Split layout, order byte, pieces K, R, k and padding.
const KRK_HEADER: [u8; 6] = [0x01, 0x00, 0x66, 0x44, 0xee, 0x00];

/// WDL codes as stored in tables.
pub const LOSS: u8 = 0;
pub const DRAW: u8 = 2;
pub const WIN: u8 = 4;

/// KRvK WDL table with a single value for each side to move.
pub fn krk_wdl(white: u8, black: u8) -> Vec<u8> {
    let mut bytes = WDL_MAGIC.to_vec();
    bytes.extend_from_slice(&KRK_HEADER);
    bytes.extend_from_slice(&[0x80, white, 0x80, black, 0x00, 0x00]);
    bytes
}

/// KRvK DTZ table with a single (zero) value. Stores white to move, unless
/// `flags` has the side to move bit.
pub fn krk_dtz(flags: u8) -> Vec<u8> {
    let mut bytes = DTZ_MAGIC.to_vec();
    bytes.extend_from_slice(&KRK_HEADER);
    bytes.extend_from_slice(&[0x80 | flags, 0x00, 0x00, 0x00, 0x00, 0x00]);
    bytes
}

/// Pairs data of a Huffman compressed side with a single block, where every
/// one of the 31332 positions decodes to `value`.
///
/// Symbol 0 is the leaf, symbol `k` pairs symbol `k - 1` with itself, so
/// that the only code (symbol 8) stands for a run of 256 values.
fn constant_pairs(value: u8) -> Vec<u8> {
    let mut bytes = vec![
        0x00, // flags
        5,    // block size 32
        15,   // span 32768
        0,    // padding
        1, 0, 0, 0, // blocks
        1,    // max symlen
        1,    // min symlen
        8, 0, // lowest symbol
        9, 0, // symbols
    ];
    bytes.extend_from_slice(&[value, 0xf0, 0xff]);
    for k in 1..9u8 {
        bytes.extend_from_slice(&[k - 1, ((k - 1) & 0xf) << 4, 0x00]);
    }
    bytes.push(0x00); // odd number of symbols
    bytes
}

/// KRvK WDL table with compressed values for both sides to move.
pub fn krk_wdl_compressed(white: u8, black: u8) -> Vec<u8> {
    let mut bytes = WDL_MAGIC.to_vec();
    bytes.extend_from_slice(&KRK_HEADER);
    bytes.extend(constant_pairs(white));
    bytes.extend(constant_pairs(black));
    assert_eq!(bytes.len(), 94);

    // Sparse index: block 0, centered on the middle of the span.
    for _ in 0..2 {
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x40]);
    }
    // Block lengths: 31332 values in the first block.
    for _ in 0..2 {
        bytes.extend_from_slice(&31331u16.to_le_bytes());
    }

    // Two 64 byte aligned blocks of zero bits.
    bytes.resize(272, 0x00);
    bytes
}

/// Pairs data of a Huffman compressed side with two blocks. Positions in
/// the first block decode to `first`, all others to `second`.
///
/// Symbols 0 and 1 are leaves. Symbol `k + 2` pairs symbol `k` with itself,
/// so that symbols 16 and 17 stand for 256 copies of either value, with
/// codes `0` and `1`.
fn split_pairs(first: u8, second: u8) -> Vec<u8> {
    let mut bytes = vec![
        0x00, // flags
        5,    // block size 32
        15,   // span 32768
        0,    // padding
        2, 0, 0, 0, // blocks
        1,    // max symlen
        1,    // min symlen
        16, 0, // lowest symbol
        18, 0, // symbols
    ];
    bytes.extend_from_slice(&[first, 0xf0, 0xff]);
    bytes.extend_from_slice(&[second, 0xf0, 0xff]);
    for k in 0..16u8 {
        bytes.extend_from_slice(&[k, k << 4, 0x00]);
    }
    bytes
}

/// KRvK WDL table where white to move has `first` for the indices below
/// `boundary` and `second` from there on. Black to move has `black`.
pub fn krk_wdl_split(boundary: u16, first: u8, second: u8, black: u8) -> Vec<u8> {
    let mut bytes = WDL_MAGIC.to_vec();
    bytes.extend_from_slice(&KRK_HEADER);
    bytes.extend(split_pairs(first, second));
    bytes.extend(constant_pairs(black));
    assert_eq!(bytes.len(), 120);

    for _ in 0..2 {
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x40]);
    }
    bytes.extend_from_slice(&(boundary - 1).to_le_bytes());
    bytes.extend_from_slice(&(31331 - boundary).to_le_bytes());
    bytes.extend_from_slice(&31331u16.to_le_bytes());

    // White to move: a block of zero bits, then a block of one bits.
    bytes.resize(224, 0x00);
    bytes.resize(256, 0xff);
    // Black to move, and padding to a valid table size.
    bytes.resize(336, 0x00);
    bytes
}

pub fn write_table(dir: &Path, name: &str, bytes: &[u8]) {
    fs::write(dir.join(name), bytes).expect("write table");
}

/// Directory with KRvK tables: white to move wins, black to move loses.
pub fn krk_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    write_table(dir.path(), "KRvK.rtbw", &krk_wdl(WIN, LOSS));
    write_table(dir.path(), "KRvK.rtbz", &krk_dtz(0));
    dir
}

pub fn chess(fen: &str) -> Chess {
    fen.parse::<Fen>()
        .expect("valid fen")
        .into_position(CastlingMode::Standard)
        .expect("legal position")
}

pub fn raw(fen: &str) -> RawPosition {
    RawPosition::from(&chess(fen))
}
