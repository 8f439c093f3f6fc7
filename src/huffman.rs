// This file is part of the syzygy-probe library.
// Copyright (C) 2017-2021 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Canonical Huffman codes over a pair-substitution symbol tree.
//!
//! Every symbol is either a leaf holding a table value or a pair of two
//! other symbols. A symbol therefore stands for a run of `symlen + 1`
//! consecutive values.

use std::io;

use byteorder::{ByteOrder as _, ReadBytesExt as _, BE, LE};

use crate::{errors::ProbeResult, types::DecisiveWdl};

/// Right child marking a leaf.
const LEAF: u16 = 0xfff;

/// Maximum depth of the symbol tree.
const MAX_DEPTH: u8 = 16;

/// Read a 3 byte tree node.
fn read_lr(node: &[u8]) -> (u16, u16) {
    let left = (u16::from(node[1] & 0xf) << 8) | u16::from(node[0]);
    let right = (u16::from(node[2]) << 4) | (u16::from(node[1]) >> 4);
    (left, right)
}

/// Decoder for the compressed blocks of a subtable.
#[derive(Debug, Clone)]
pub(crate) struct Huffman {
    /// Minimum length in bits of the Huffman symbols.
    min_symlen: u8,
    /// Lowest symbol for each length.
    lowest_sym: Vec<u16>,
    /// 64-bit padded lowest symbols for each length.
    base: Vec<u64>,
    /// Number of values represented by a given symbol, minus one.
    symlen: Vec<u8>,
    /// Three bytes per symbol.
    tree: Vec<u8>,
}

impl Huffman {
    /// Size in bytes of the lowest symbol table, followed by the 2 byte
    /// symbol count.
    pub fn lowest_sym_size(min_symlen: u8, max_symlen: u8) -> ProbeResult<usize> {
        ensure!(max_symlen <= 32 && min_symlen <= 32);
        ensure!(max_symlen >= min_symlen);
        Ok(usize::from(max_symlen - min_symlen + 1) * 2)
    }

    /// Builds the decoder from the lowest symbol table (little endian `u16`
    /// per code length) and the symbol tree.
    pub fn new(min_symlen: u8, lowest_sym: &[u8], tree: &[u8]) -> ProbeResult<Huffman> {
        let h = lowest_sym.len() / 2;
        ensure!(h >= 1 && lowest_sym.len() % 2 == 0);
        ensure!(tree.len() % 3 == 0);

        let lowest_sym: Vec<u16> = lowest_sym.chunks_exact(2).map(LE::read_u16).collect();

        let mut base = vec![0u64; h];
        for i in (0..h - 1).rev() {
            base[i] = u!(u!(base[i + 1].checked_add(u64::from(lowest_sym[i])))
                .checked_sub(u64::from(lowest_sym[i + 1])))
                / 2;

            ensure!(base[i] * 2 >= base[i + 1]);
        }

        for (i, base) in base.iter_mut().enumerate() {
            let shift = u!(64u32.checked_sub(u32::from(min_symlen) + i as u32));
            *base = u!(base.checked_shl(shift));
        }

        let symbols = tree.len() / 3;
        let mut symlen = vec![0; symbols];
        let mut visited = vec![false; symbols];
        for sym in 0..symbols {
            read_symlen(tree, &mut symlen, &mut visited, sym as u16, MAX_DEPTH)?;
        }

        Ok(Huffman {
            min_symlen,
            lowest_sym,
            base,
            symlen,
            tree: tree.to_vec(),
        })
    }

    fn symlen(&self, sym: u16) -> ProbeResult<i64> {
        Ok(i64::from(*u!(self.symlen.get(usize::from(sym)))))
    }

    fn node(&self, sym: u16) -> ProbeResult<&[u8]> {
        let start = usize::from(sym) * 3;
        Ok(u!(self.tree.get(start..start + 3)))
    }

    /// Finds the leaf symbol for the value at `lit_idx` within `block`.
    ///
    /// The block must be followed by at least 4 bytes of padding.
    pub fn decode(&self, block: &[u8], mut lit_idx: i64) -> ProbeResult<u16> {
        ensure!(lit_idx >= 0);

        let mut cursor = io::Cursor::new(block);
        let mut buf = cursor.read_u64::<BE>()?;
        let mut buf_size: u32 = 64;

        let min_symlen = u32::from(self.min_symlen);

        let mut sym = loop {
            let mut len = 0;

            while buf < *u!(self.base.get(len)) {
                len += 1;
            }

            let shift = u!(64u32.checked_sub(len as u32 + min_symlen));
            let offset = u!((buf - self.base[len]).checked_shr(shift));
            let sym = u!(u16::try_from(offset)
                .ok()
                .and_then(|offset| offset.checked_add(self.lowest_sym[len])));

            let run = self.symlen(sym)? + 1;
            if lit_idx < run {
                break sym;
            }
            lit_idx -= run;

            let bits = len as u32 + min_symlen;
            buf = u!(buf.checked_shl(bits));
            buf_size = u!(buf_size.checked_sub(bits));

            // Refill the buffer.
            if buf_size <= 32 {
                buf_size += 32;
                buf |= u64::from(cursor.read_u32::<BE>()?) << (64 - buf_size);
            }
        };

        // Descend to the leaf.
        while self.symlen(sym)? != 0 {
            let (left, right) = read_lr(self.node(sym)?);

            let left_run = self.symlen(left)? + 1;
            if lit_idx < left_run {
                sym = left;
            } else {
                lit_idx -= left_run;
                sym = right;
            }
        }

        Ok(sym)
    }

    /// Raw 8 bit value of a leaf, as stored in WDL tables.
    pub fn leaf_u8(&self, sym: u16) -> ProbeResult<u8> {
        Ok(self.node(sym)?[0])
    }

    /// Raw 12 bit value of a leaf, as stored in DTZ tables.
    pub fn leaf_u12(&self, sym: u16) -> ProbeResult<u16> {
        Ok(LE::read_u16(self.node(sym)?) & 0xfff)
    }
}

/// Build the symlen table.
fn read_symlen(
    tree: &[u8],
    symlen: &mut [u8],
    visited: &mut [bool],
    sym: u16,
    depth: u8,
) -> ProbeResult<()> {
    if *u!(visited.get(usize::from(sym))) {
        return Ok(());
    }

    let start = usize::from(sym) * 3;
    let (left, right) = read_lr(u!(tree.get(start..start + 3)));

    if right == LEAF {
        symlen[usize::from(sym)] = 0;
    } else {
        // Guard against stack overflow.
        let depth = u!(depth.checked_sub(1));

        read_symlen(tree, symlen, visited, left, depth)?;
        read_symlen(tree, symlen, visited, right, depth)?;

        symlen[usize::from(sym)] = u!(u!(
            symlen[usize::from(left)].checked_add(symlen[usize::from(right)])
        )
        .checked_add(1));
    }

    visited[usize::from(sym)] = true;
    Ok(())
}

/// Remaps raw DTZ values, with a separate map for each outcome.
#[derive(Debug, Clone)]
pub(crate) struct DtzMap {
    /// Entries are 16 bit rather than 8 bit.
    pub wide: bool,
    /// Offset of the first entry for each outcome, in entries.
    pub by_wdl: [u16; 4],
}

impl DtzMap {
    /// Parses the four count-prefixed maps starting at `start` within the
    /// shared map area. Returns the map and the end offset.
    pub fn parse(maps: &[u8], mut start: usize, wide: bool) -> ProbeResult<(DtzMap, usize)> {
        let mut by_wdl = [0; 4];
        for idx in &mut by_wdl {
            if wide {
                *idx = u!(u16::try_from((start + 2) / 2).ok());
                let count = LE::read_u16(u!(maps.get(start..start + 2)));
                start += usize::from(count) * 2 + 2;
            } else {
                *idx = u!(u16::try_from(start + 1).ok());
                start += usize::from(*u!(maps.get(start))) + 1;
            }
        }
        ensure!(start <= maps.len());
        Ok((DtzMap { wide, by_wdl }, start))
    }

    /// Looks up the remapped value of `res` for a decisive outcome.
    pub fn lookup(&self, maps: &[u8], wdl: DecisiveWdl, res: u16) -> ProbeResult<u16> {
        let wdl = match wdl {
            DecisiveWdl::Win => 0,
            DecisiveWdl::Loss => 1,
            DecisiveWdl::CursedWin => 2,
            DecisiveWdl::BlessedLoss => 3,
        };

        let entry = usize::from(self.by_wdl[wdl]) + usize::from(res);
        Ok(if self.wide {
            LE::read_u16(u!(maps.get(entry * 2..entry * 2 + 2)))
        } else {
            u16::from(*u!(maps.get(entry)))
        })
    }
}
