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

use std::{fmt, io, marker::PhantomData, path::Path};

use arrayvec::ArrayVec;
use bitflags::bitflags;
use byteorder::{ByteOrder as _, LE};
use shakmaty::{Chess, Color, Piece, Position, Role};

use crate::{
    encoding::{collect_squares, encode_index, lead_pawns, pawn_file, GroupData, Orientation},
    errors::{ProbeError, ProbeResult},
    filesystem::{Filesystem, RandomAccessFile, ReadHint},
    huffman::{DtzMap, Huffman},
    material::Material,
    types::{DecisiveWdl, MaybeRounded, Metric, Pieces, TableType, Wdl, MAX_PIECES, TBW, TBZ},
};

pub(crate) trait TableTag {
    const METRIC: Metric;
    const TYPE: TableType;
}

#[derive(Debug)]
pub(crate) enum WdlTag {}

impl TableTag for WdlTag {
    const METRIC: Metric = Metric::Wdl;
    const TYPE: TableType = TBW;
}

#[derive(Debug)]
pub(crate) enum DtzTag {}

impl TableTag for DtzTag {
    const METRIC: Metric = Metric::Dtz;
    const TYPE: TableType = TBZ;
}

bitflags! {
    /// Table layout flags.
    #[derive(Debug)]
    struct Layout: u8 {
        /// Two sided table for non-symmetrical material configuration.
        const SPLIT = 1;
        /// Table with pawns. Has subtables for each leading pawn file (a-d).
        const HAS_PAWNS = 2;
    }
}

bitflags! {
    /// Subtable format flags.
    #[derive(Debug, Copy, Clone)]
    struct Flag: u8 {
        /// DTZ table stores black to move.
        const STM = 1;
        /// Use `DtzMap`.
        const MAPPED = 2;
        /// DTZ table has winning positions on the edge of the 50-move rule and
        /// therefore stores exact plies rather than just full moves.
        const WIN_PLIES = 4;
        /// DTZ table has losing positions on the edge of the 50-move rule and
        /// therefore stores exact plies rather than just full moves.
        const LOSS_PLIES = 8;
        /// DTZ table contains very long endgames, so that values require 16
        /// bits rather than just 8.
        const WIDE_DTZ = 16;
        /// Table stores only a single value.
        const SINGLE_VALUE = 128;
    }
}

/// Maximum size in bytes of a compressed block.
const MAX_BLOCK_SIZE: usize = 1024;

/// Read the magic header bytes that identify a tablebase file.
fn read_magic_header(raf: &dyn RandomAccessFile) -> ProbeResult<[u8; 4]> {
    let mut buf = [0; 4];
    if let Err(error) = raf.read_exact_at(ReadHint::Header, 0, &mut buf) {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => Err(ProbeError::Magic { magic: buf }),
            _ => Err(ProbeError::Read { error }),
        }
    } else {
        Ok(buf)
    }
}

/// Header nibble to piece.
fn nibble_to_piece(p: u8) -> Option<Piece> {
    let color = Color::from_white(p & 8 == 0);
    Some(match p & !8 {
        1 => color.pawn(),
        2 => color.knight(),
        3 => color.bishop(),
        4 => color.rook(),
        5 => color.queen(),
        6 => color.king(),
        _ => return None,
    })
}

/// Parse a piece list.
fn parse_pieces(
    raf: &dyn RandomAccessFile,
    ptr: u64,
    count: usize,
    side: Color,
) -> ProbeResult<Pieces> {
    let mut buffer = [0; MAX_PIECES];
    let bytes = &mut buffer[..count];
    raf.read_exact_at(ReadHint::Header, ptr, bytes)?;

    let mut pieces = Pieces::new();
    for p in bytes {
        pieces.push(u!(nibble_to_piece(side.fold_wb(*p & 0xf, *p >> 4))));
    }

    Ok(pieces)
}

/// Compressed values of a subtable.
#[derive(Debug)]
struct Compressed {
    huffman: Huffman,

    /// Block size in bytes.
    block_size: u32,
    /// About every span values there is a sparse index entry.
    span: u32,
    /// Number of blocks in the table.
    blocks_num: u32,

    /// Offset of the sparse index.
    sparse_index: u64,
    /// Size of the sparse index.
    sparse_index_size: u32,

    /// Offset of the block length table.
    block_lengths: u64,
    /// Size of the block length table, padded to be bigger than `blocks_num`.
    block_length_size: u32,

    /// Start of compressed data.
    data: u64,
}

#[derive(Debug)]
enum Values {
    /// The subtable stores only a single value.
    Single(u8),
    Compressed(Box<Compressed>),
}

/// Description of encoding and compression.
#[derive(Debug)]
struct PairsData {
    /// Encoding flags.
    flags: Flag,
    /// Piece configuration encoding info.
    groups: GroupData,
    values: Values,
    /// DTZ mapping.
    dtz_map: Option<DtzMap>,
}

impl PairsData {
    fn parse<T: TableTag>(
        raf: &dyn RandomAccessFile,
        mut ptr: u64,
        groups: GroupData,
    ) -> ProbeResult<(PairsData, u64)> {
        let flags = Flag::from_bits_truncate(raf.read_u8_at(ReadHint::Header, ptr)?);

        if flags.contains(Flag::SINGLE_VALUE) {
            let single_value = match T::METRIC {
                Metric::Wdl => raf.read_u8_at(ReadHint::Header, ptr + 1)?,
                Metric::Dtz => 0,
            };

            return Ok((
                PairsData {
                    flags,
                    groups,
                    values: Values::Single(single_value),
                    dtz_map: None,
                },
                ptr + 2,
            ));
        }

        // Read header.
        let mut header = [0; 10];
        raf.read_exact_at(ReadHint::Header, ptr, &mut header)?;

        let tb_size = groups.table_size();
        let block_size = u!(1u32.checked_shl(u32::from(header[1])));
        ensure!(block_size <= MAX_BLOCK_SIZE as u32);
        let span = u!(1u32.checked_shl(u32::from(header[2])));
        let sparse_index_size = u!(u32::try_from(tb_size.div_ceil(u64::from(span))).ok());
        let padding = header[3];
        let blocks_num = LE::read_u32(&header[4..]);
        let block_length_size = u!(blocks_num.checked_add(u32::from(padding)));

        let max_symlen = header[8];
        let min_symlen = header[9];

        // Symbol tables.
        let mut lowest_sym = vec![0; Huffman::lowest_sym_size(min_symlen, max_symlen)?];
        raf.read_exact_at(ReadHint::Header, ptr + 10, &mut lowest_sym)?;
        ptr += 10 + lowest_sym.len() as u64;

        let sym = raf.read_u16_le_at(ReadHint::Header, ptr)?;
        ptr += 2;

        let mut tree = vec![0; usize::from(sym) * 3];
        raf.read_exact_at(ReadHint::Header, ptr, &mut tree)?;
        ptr += tree.len() as u64 + (u64::from(sym) & 1);

        let huffman = Huffman::new(min_symlen, &lowest_sym, &tree)?;

        Ok((
            PairsData {
                flags,
                groups,
                values: Values::Compressed(Box::new(Compressed {
                    huffman,
                    block_size,
                    span,
                    blocks_num,
                    sparse_index: 0, // to be initialized later
                    sparse_index_size,
                    block_lengths: 0, // to be initialized later
                    block_length_size,
                    data: 0, // to be initialized later
                })),
                dtz_map: None, // to be initialized later
            },
            ptr,
        ))
    }

    fn compressed_mut(&mut self) -> Option<&mut Compressed> {
        match self.values {
            Values::Single(_) => None,
            Values::Compressed(ref mut c) => Some(c),
        }
    }
}

/// Descripton of encoding and compression for both sides of a table.
#[derive(Debug)]
struct FileData {
    sides: ArrayVec<PairsData, 2>,
}

/// A Syzygy table.
pub(crate) struct Table<T: TableTag> {
    metric: PhantomData<T>,

    raf: Box<dyn RandomAccessFile>,

    /// Material in table orientation.
    material: Material,
    files: ArrayVec<FileData, 4>,
    /// Area holding the DTZ maps of all files.
    dtz_maps: Vec<u8>,
}

impl<T: TableTag> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("metric", &T::METRIC)
            .field("material", &self.material)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

pub(crate) type WdlTable = Table<WdlTag>;
pub(crate) type DtzTable = Table<DtzTag>;

impl<T: TableTag> Table<T> {
    /// Opens a table file.
    pub fn open(filesystem: &dyn Filesystem, path: &Path, material: &Material) -> ProbeResult<Table<T>> {
        Table::new(filesystem.open(path)?, material)
    }

    /// Parse the header, the headers of the subtables and prepare meta data
    /// required for decompression.
    pub fn new(raf: Box<dyn RandomAccessFile>, material: &Material) -> ProbeResult<Table<T>> {
        ensure!(material.count() <= MAX_PIECES);
        ensure!(material.is_standard());

        // Check magic.
        let magic = read_magic_header(raf.as_ref())?;
        if magic != T::TYPE.magic {
            return Err(ProbeError::Magic { magic });
        }

        // Read layout flags.
        let layout = Layout::from_bits_truncate(raf.read_u8_at(ReadHint::Header, 4)?);
        let has_pawns = layout.contains(Layout::HAS_PAWNS);
        let split = layout.contains(Layout::SPLIT);

        // Check consistency of layout and material key.
        ensure!(has_pawns == material.has_pawns());
        ensure!(split != material.is_symmetric());

        // Read group data.
        let pp = material.both_have_pawns();
        let num_files = if has_pawns { 4 } else { 1 };
        let num_sides = if T::METRIC == Metric::Wdl && !material.is_symmetric() {
            2
        } else {
            1
        };

        let mut ptr = 5;
        let mut groups: ArrayVec<ArrayVec<GroupData, 2>, 4> = ArrayVec::new();

        for file in 0..num_files {
            let order_byte = raf.read_u8_at(ReadHint::Header, ptr)?;
            let pp_byte = if pp {
                raf.read_u8_at(ReadHint::Header, ptr + 1)?
            } else {
                0xff
            };
            let order = [
                [order_byte & 0xf, pp_byte & 0xf],
                [order_byte >> 4, pp_byte >> 4],
            ];

            ptr += if pp { 2 } else { 1 };

            let mut sides = ArrayVec::new();
            for side in [Color::White, Color::Black].into_iter().take(num_sides) {
                let pieces = parse_pieces(raf.as_ref(), ptr, material.count(), side)?;
                let key = Material::from_iter(pieces.iter().copied());
                ensure!(key == *material || key.flipped() == *material);
                sides.push(GroupData::new(pieces, order[side.fold_wb(0, 1)], file)?);
            }

            ptr += material.count() as u64;
            groups.push(sides);
        }

        ptr += ptr & 1;

        // Ensure reference pawn goes first.
        ensure!((groups[0][0].pieces[0].role == Role::Pawn) == has_pawns);

        // Ensure material is consistent with first file.
        let table_material = Material::from_iter(groups[0][0].pieces.iter().copied());
        for side in groups.iter().flatten() {
            ensure!(Material::from_iter(side.pieces.iter().copied()) == table_material);
        }

        // Setup pairs.
        let mut files: ArrayVec<FileData, 4> = ArrayVec::new();
        for file in groups {
            let mut sides = ArrayVec::new();
            for side in file {
                let (pairs, next_ptr) = PairsData::parse::<T>(raf.as_ref(), ptr, side)?;
                ptr = next_ptr;
                sides.push(pairs);
            }
            files.push(FileData { sides });
        }

        // Setup DTZ maps.
        let mut dtz_maps = Vec::new();
        if T::METRIC == Metric::Dtz {
            let map_ptr = ptr;

            for file in &files {
                if file.sides[0].flags.contains(Flag::MAPPED) {
                    for _ in 0..4 {
                        ptr = if file.sides[0].flags.contains(Flag::WIDE_DTZ) {
                            ptr + u64::from(raf.read_u16_le_at(ReadHint::DtzMap, ptr)?) * 2 + 2
                        } else {
                            ptr + u64::from(raf.read_u8_at(ReadHint::DtzMap, ptr)?) + 1
                        };
                    }
                }
            }

            dtz_maps = vec![0; u!(usize::try_from(ptr - map_ptr).ok())];
            raf.read_exact_at(ReadHint::DtzMap, map_ptr, &mut dtz_maps)?;

            let mut offset = 0;
            for file in &mut files {
                let flags = file.sides[0].flags;
                if flags.contains(Flag::MAPPED) {
                    let (map, end) =
                        DtzMap::parse(&dtz_maps, offset, flags.contains(Flag::WIDE_DTZ))?;
                    file.sides[0].dtz_map = Some(map);
                    offset = end;
                }
            }

            ptr += ptr & 1;
        }

        // Setup sparse index.
        for side in files.iter_mut().flat_map(|f| f.sides.iter_mut()) {
            if let Some(c) = side.compressed_mut() {
                c.sparse_index = ptr;
                ptr = u!(ptr.checked_add(u64::from(c.sparse_index_size) * 6));
            }
        }

        for side in files.iter_mut().flat_map(|f| f.sides.iter_mut()) {
            if let Some(c) = side.compressed_mut() {
                c.block_lengths = ptr;
                ptr = u!(ptr.checked_add(u64::from(c.block_length_size) * 2));
            }
        }

        for side in files.iter_mut().flat_map(|f| f.sides.iter_mut()) {
            if let Some(c) = side.compressed_mut() {
                ptr = u!(ptr.checked_add(0x3f)) & !0x3f; // 64 byte alignment
                c.data = ptr;
                ptr = u!(ptr.checked_add(u64::from(c.blocks_num) * u64::from(c.block_size)));
            }
        }

        tracing::debug!(metric = %T::METRIC, material = %table_material, files = files.len(), "parsed table header");

        Ok(Table {
            metric: PhantomData,
            raf,
            material: table_material,
            files,
            dtz_maps,
        })
    }

    /// Retrieves the value stored for `idx` by decompressing Huffman coded
    /// symbols stored in the corresponding block of the table.
    fn decompress_pairs(&self, d: &PairsData, idx: u64) -> ProbeResult<u16> {
        let c = match d.values {
            Values::Single(value) => return Ok(u16::from(value)),
            Values::Compressed(ref c) => c,
        };

        // Use the sparse index to jump very close to the correct block.
        let main_idx = idx / u64::from(c.span);
        ensure!(main_idx < u64::from(c.sparse_index_size));

        let mut entry = [0; 6];
        self.raf
            .read_exact_at(ReadHint::SparseIndex, c.sparse_index + 6 * main_idx, &mut entry)?;
        let mut block = LE::read_u32(&entry[..4]);
        let offset = i64::from(LE::read_u16(&entry[4..]));

        let mut lit_idx = (idx % u64::from(c.span)) as i64 - i64::from(c.span) / 2;
        lit_idx += offset;

        let block_length = |block: u32| -> ProbeResult<i64> {
            ensure!(block < c.block_length_size);
            Ok(i64::from(
                self.raf
                    .read_u16_le_at(ReadHint::BlockLengths, c.block_lengths + u64::from(block) * 2)?,
            ) + 1)
        };

        // Now move forwards/backwards to find the correct block.
        while lit_idx < 0 {
            block = u!(block.checked_sub(1));
            lit_idx += block_length(block)?;
        }
        loop {
            let len = block_length(block)?;
            if lit_idx >= len {
                lit_idx -= len;
                block = u!(block.checked_add(1));
            } else {
                break;
            }
        }
        ensure!(block < c.blocks_num);

        // Read block (and 4 bytes to prevent out of bounds read) into memory.
        let mut block_buffer = [0; MAX_BLOCK_SIZE + 4];
        let block_buffer = &mut block_buffer[..(c.block_size as usize + 4)];
        self.raf.read_exact_at(
            ReadHint::Data,
            u!(c.data.checked_add(u64::from(block) * u64::from(c.block_size))),
            block_buffer,
        )?;

        let sym = c.huffman.decode(block_buffer, lit_idx)?;
        match T::METRIC {
            Metric::Wdl => Ok(u16::from(c.huffman.leaf_u8(sym)?)),
            Metric::Dtz => c.huffman.leaf_u12(sym),
        }
    }

    /// Given a position, determine the unique (modulo symmetries) index into
    /// the corresponding subtable. `None` if a DTZ table does not store the
    /// side to move.
    fn encode(&self, pos: &Chess) -> ProbeResult<Option<(&PairsData, u64)>> {
        let key = Material::from_board(pos.board());
        let material = &self.material;
        ensure!(key == *material || key == material.flipped());

        let orientation = Orientation::new(&key, material, pos.turn());

        // For pawns there are subtables for each file (a, b, c, d) the
        // leading pawn can be placed on.
        let (file, squares) = if material.has_pawns() {
            let reference_pawn = self.files[0].sides[0].groups.pieces[0];
            let squares = lead_pawns(pos.board(), reference_pawn.color, orientation);
            (pawn_file(*u!(squares.first())), squares)
        } else {
            (0, ArrayVec::new())
        };
        let file = u!(self.files.get(file));

        // WDL tables have subtables for each side to move.
        let side = &file.sides[if orientation.bside { file.sides.len() - 1 } else { 0 }];

        // DTZ tables store only one side to move. It is possible that we have
        // to check the other side (by doing a 1-ply search).
        if T::METRIC == Metric::Dtz
            && side.flags.contains(Flag::STM) != orientation.bside
            && (!material.is_symmetric() || material.has_pawns())
        {
            return Ok(None);
        }

        let lead_pawns_count = squares.len();
        let squares = collect_squares(pos.board(), &side.groups.pieces, orientation, squares)?;
        let idx = encode_index(squares, lead_pawns_count, &side.groups, material.both_have_pawns())?;
        ensure!(idx < side.groups.table_size());

        Ok(Some((side, idx)))
    }
}

impl Table<WdlTag> {
    pub fn probe_wdl(&self, pos: &Chess) -> ProbeResult<Wdl> {
        let (side, idx) = u!(self.encode(pos)?);
        let decompressed = self.decompress_pairs(side, idx)?;
        tracing::trace!(material = %self.material, idx, decompressed, "wdl table entry");
        Ok(u!(Wdl::from_code(u32::from(decompressed))))
    }
}

impl Table<DtzTag> {
    pub fn probe_dtz(&self, pos: &Chess, wdl: DecisiveWdl) -> ProbeResult<Option<MaybeRounded<u32>>> {
        let (side, idx) = match self.encode(pos)? {
            Some(found) => found,
            None => return Ok(None), // check other side
        };

        let res = self.decompress_pairs(side, idx)?;

        let res = u32::from(match side.dtz_map {
            None => res,
            Some(ref map) => map.lookup(&self.dtz_maps, wdl, res)?,
        });

        tracing::trace!(material = %self.material, idx, res, "dtz table entry");

        let stores_plies = match wdl {
            DecisiveWdl::Win => side.flags.contains(Flag::WIN_PLIES),
            DecisiveWdl::Loss => side.flags.contains(Flag::LOSS_PLIES),
            DecisiveWdl::CursedWin | DecisiveWdl::BlessedLoss => false,
        };

        Ok(Some(if stores_plies {
            MaybeRounded::Precise(res)
        } else {
            MaybeRounded::Rounded(2 * res)
        }))
    }
}
