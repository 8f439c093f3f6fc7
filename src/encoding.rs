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

//! Canonical keys: color orientation, board symmetries and the
//! combinatorial index of a piece placement within a subtable.
//!
//! Everything in here is a pure function of squares and table metadata.

use arrayvec::ArrayVec;
use shakmaty::{Bitboard, Board, Color, File, Rank, Square};

use crate::{
    errors::ProbeResult,
    material::Material,
    types::{Pieces, MAX_PIECES},
};

pub(crate) const fn binomial(mut n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    if k > n - k {
        return binomial(n, n - k);
    }
    let mut r = 1;
    let mut d = 1;
    while d <= k {
        r = r * n / d;
        n -= 1;
        d += 1;
    }
    r
}

/// Unused entry.
const Z0: u64 = u64::MAX;

/// Placements of three unique leading pieces, modulo symmetry.
pub(crate) const THREE_PIECE_PLACEMENTS: u64 = 31_332;

/// Placements of two non-adjacent kings, modulo symmetry.
pub(crate) const KING_PAIR_PLACEMENTS: u64 = 462;

const fn file_of(sq: usize) -> usize {
    sq & 7
}

const fn rank_of(sq: usize) -> usize {
    sq >> 3
}

/// Code of a square in the a1-d1-d4 triangle, after mapping it there.
/// Squares below the diagonal come first (b1 = 0 .. d3 = 5), then the
/// diagonal (a1 = 6 .. d4 = 9).
const fn triangle_code(sq: usize) -> u64 {
    let mut file = file_of(sq);
    let mut rank = rank_of(sq);
    if file > 3 {
        file = 7 - file;
    }
    if rank > 3 {
        rank = 7 - rank;
    }
    if rank > file {
        let tmp = rank;
        rank = file;
        file = tmp;
    }
    if rank == file {
        (6 + rank) as u64
    } else {
        (3 * rank - rank * (rank.saturating_sub(1)) / 2 + file - rank - 1) as u64
    }
}

/// Code of a square in the b1-h1-h7 triangle (0..=27), with the a1-h8
/// diagonal after it (28..=35). Squares above the diagonal share the code
/// of their reflection.
const fn lower_code(sq: usize) -> u64 {
    let mut file = file_of(sq);
    let mut rank = rank_of(sq);
    if rank == file {
        return (28 + rank) as u64;
    }
    if rank > file {
        let tmp = rank;
        rank = file;
        file = tmp;
    }
    (7 * rank - rank * (rank.saturating_sub(1)) / 2 + file - rank - 1) as u64
}

const fn build_triangle() -> [u64; 64] {
    let mut table = [0; 64];
    let mut sq = 0;
    while sq < 64 {
        table[sq] = triangle_code(sq);
        sq += 1;
    }
    table
}

const fn build_lower() -> [u64; 64] {
    let mut table = [0; 64];
    let mut sq = 0;
    while sq < 64 {
        table[sq] = lower_code(sq);
        sq += 1;
    }
    table
}

/// Maps squares into the a1-d1-d4 triangle.
pub(crate) const TRIANGLE: [u64; 64] = build_triangle();

/// Maps the b1-h1-h7 triangle to `0..=27`.
pub(crate) const LOWER: [u64; 64] = build_lower();

const fn kings_touch(a: usize, b: usize) -> bool {
    file_of(a).abs_diff(file_of(b)) <= 1 && rank_of(a).abs_diff(rank_of(b)) <= 1
}

const fn diagonal_offset(sq: usize) -> isize {
    rank_of(sq) as isize - file_of(sq) as isize
}

/// The square in the a1-d1-d4 triangle with the given code.
const fn triangle_square(code: usize) -> usize {
    let mut sq = 0;
    while sq < 64 {
        if file_of(sq) <= 3 && rank_of(sq) <= file_of(sq) && triangle_code(sq) == code as u64 {
            return sq;
        }
        sq += 1;
    }
    panic!("triangle code out of range");
}

/// Encoding of all 462 configurations of two non-adjacent kings, with the
/// first king in the a1-d1-d4 triangle. If the first king is on the
/// diagonal, the second is not above it. Configurations with both kings on
/// the diagonal get the last codes.
const fn build_kk_idx() -> [[u64; 64]; 10] {
    let mut table = [[Z0; 64]; 10];
    let mut both_on_diagonal = [(0, 0); 64];
    let mut deferred = 0;
    let mut code = 0;

    let mut idx = 0;
    while idx < 10 {
        let first = triangle_square(idx);
        let mut second = 0;
        while second < 64 {
            if !kings_touch(first, second) {
                let first_offset = diagonal_offset(first);
                let second_offset = diagonal_offset(second);
                if first_offset == 0 && second_offset == 0 {
                    both_on_diagonal[deferred] = (idx, second);
                    deferred += 1;
                } else if first_offset != 0 || second_offset < 0 {
                    table[idx][second] = code;
                    code += 1;
                }
            }
            second += 1;
        }
        idx += 1;
    }

    let mut i = 0;
    while i < deferred {
        let (idx, second) = both_on_diagonal[i];
        table[idx][second] = code;
        code += 1;
        i += 1;
    }

    table
}

/// Encoding of two kings. Indexed by the triangle code of the first king.
pub(crate) const KK_IDX: [[u64; 64]; 10] = build_kk_idx();

/// Tables for the leading pawn group.
pub(crate) struct PawnTables {
    /// Order of squares for the leading pawns, mirrored on the d/e axis.
    pub map_pawns: [u64; 64],
    /// Base index of the leading pawn, by number of leading pawns.
    pub lead_pawn_idx: [[u64; 64]; 6],
    /// Number of leading pawn configurations per file (a-d).
    pub lead_pawns_size: [[u64; 4]; 6],
}

impl PawnTables {
    const fn new() -> PawnTables {
        let mut map_pawns = [0; 64];
        let mut available_squares = 48;
        let mut file = 0;
        while file < 4 {
            let mut rank = 1;
            while rank < 7 {
                let sq = file + 8 * rank;
                available_squares -= 1;
                map_pawns[sq] = available_squares;
                available_squares -= 1;
                map_pawns[sq ^ 0x7] = available_squares;
                rank += 1;
            }
            file += 1;
        }

        let mut lead_pawn_idx = [[0; 64]; 6];
        let mut lead_pawns_size = [[0; 4]; 6];
        let mut lead_pawns = 1;
        while lead_pawns <= 5 {
            let mut file = 0;
            while file < 4 {
                let mut idx = 0;
                let mut rank = 1;
                while rank < 7 {
                    let sq = file + 8 * rank;
                    lead_pawn_idx[lead_pawns][sq] = idx;
                    idx += binomial(map_pawns[sq], lead_pawns as u64 - 1);
                    rank += 1;
                }
                lead_pawns_size[lead_pawns][file] = idx;
                file += 1;
            }
            lead_pawns += 1;
        }

        PawnTables {
            map_pawns,
            lead_pawn_idx,
            lead_pawns_size,
        }
    }
}

pub(crate) const PAWNS: PawnTables = PawnTables::new();

/// Group pieces that will be encoded together.
fn group_pieces(pieces: &Pieces) -> ArrayVec<usize, MAX_PIECES> {
    let mut result = ArrayVec::new();
    let material = Material::from_iter(pieces.iter().copied());

    // For pawnless positions: If there are at least 3 unique pieces then 3
    // unique pieces form the leading group. Otherwise the two kings do.
    let first_len = if material.has_pawns() {
        0
    } else if material.unique_pieces() >= 3 {
        3
    } else {
        2
    };

    if first_len > 0 {
        result.push(first_len);
    }

    // The remaining identical pieces are grouped together.
    let mut rest = pieces.iter().skip(first_len).peekable();
    while let Some(piece) = rest.next() {
        let mut len = 1;
        while rest.next_if(|p| *p == piece).is_some() {
            len += 1;
        }
        result.push(len);
    }

    result
}

/// Description of the encoding used for a piece configuration.
#[derive(Debug, Clone)]
pub(crate) struct GroupData {
    pub pieces: Pieces,
    pub lens: ArrayVec<usize, MAX_PIECES>,
    pub factors: ArrayVec<u64, { MAX_PIECES + 1 }>,
}

impl GroupData {
    pub fn new(pieces: Pieces, order: [u8; 2], file: usize) -> ProbeResult<GroupData> {
        ensure!(pieces.len() >= 2);

        let material = Material::from_iter(pieces.iter().copied());
        let lens = group_pieces(&pieces);
        let pp = material.both_have_pawns();
        ensure!(!pp || lens.len() >= 2);

        let mut factors = ArrayVec::from([0; MAX_PIECES + 1]);
        factors.truncate(lens.len() + 1);
        let mut free_squares = u!((64 - lens[0]).checked_sub(if pp { lens[1] } else { 0 }));
        let mut next = if pp { 2 } else { 1 };
        let mut idx: u64 = 1;
        let mut k = 0;

        while next < lens.len() || k == order[0] || (pp && k == order[1]) {
            let group_size = if k == order[0] {
                // Leading pawns or pieces.
                factors[0] = idx;
                if material.has_pawns() {
                    *u!(PAWNS.lead_pawns_size.get(lens[0]).and_then(|sizes| sizes.get(file)))
                } else if lens[0] == 3 {
                    THREE_PIECE_PLACEMENTS
                } else {
                    KING_PAIR_PLACEMENTS
                }
            } else if pp && k == order[1] {
                // Remaining pawns of the other side.
                factors[1] = idx;
                binomial(48 - lens[0] as u64, lens[1] as u64)
            } else {
                // Remaining pieces.
                let len = *u!(lens.get(next));
                *u!(factors.get_mut(next)) = idx;
                let size = binomial(free_squares as u64, len as u64);
                free_squares = u!(free_squares.checked_sub(len));
                next += 1;
                size
            };
            idx = u!(idx.checked_mul(group_size));
            k += 1;
        }

        factors[lens.len()] = idx;

        Ok(GroupData {
            pieces,
            lens,
            factors,
        })
    }

    /// Number of entries in the subtable.
    pub fn table_size(&self) -> u64 {
        self.factors[self.lens.len()]
    }
}

/// How a position is oriented relative to a table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Orientation {
    /// Swap colors and flip the board vertically.
    pub flip: bool,
    /// Use the black-to-move subtable.
    pub bside: bool,
}

impl Orientation {
    /// Tables store the stronger side as white. For symmetric material only
    /// white to move is stored.
    pub fn new(position: &Material, table: &Material, turn: Color) -> Orientation {
        let symmetric_btm = table.is_symmetric() && turn.is_black();
        let black_stronger = position != table;
        let flip = symmetric_btm || black_stronger;
        Orientation {
            flip,
            bside: turn.is_black() ^ flip,
        }
    }

    fn color(self, color: Color) -> Color {
        if self.flip {
            color.other()
        } else {
            color
        }
    }

    fn square(self, sq: Square) -> Square {
        if self.flip {
            sq.flip_vertical()
        } else {
            sq
        }
    }
}

/// Leading pawns of a pawnful table, in table orientation, with the pawn
/// that selects the subtable first.
pub(crate) fn lead_pawns(
    board: &Board,
    reference: Color,
    orientation: Orientation,
) -> ArrayVec<Square, MAX_PIECES> {
    let pawns = board.pawns() & board.by_color(orientation.color(reference));
    let mut squares: ArrayVec<Square, MAX_PIECES> = pawns
        .into_iter()
        .take(MAX_PIECES)
        .map(|sq| orientation.square(sq))
        .collect();

    // Ensure squares[0] is the maximum with regard to map_pawns.
    for i in 1..squares.len() {
        if PAWNS.map_pawns[usize::from(squares[0])] < PAWNS.map_pawns[usize::from(squares[i])] {
            squares.swap(0, i);
        }
    }

    squares
}

/// Subtable file (a-d) selected by the leading pawn.
pub(crate) fn pawn_file(lead: Square) -> usize {
    if lead.file() >= File::E {
        lead.flip_horizontal().file() as usize
    } else {
        lead.file() as usize
    }
}

/// Completes the square list with the remaining pieces in table order.
pub(crate) fn collect_squares(
    board: &Board,
    pieces: &Pieces,
    orientation: Orientation,
    mut squares: ArrayVec<Square, MAX_PIECES>,
) -> ProbeResult<ArrayVec<Square, MAX_PIECES>> {
    let mut used = Bitboard(0);
    for sq in &squares {
        used.add(orientation.square(*sq));
    }

    for piece in pieces.iter().skip(squares.len()) {
        let color = orientation.color(piece.color);
        let square = u!((board.by_piece(piece.role.of(color)) & !used).first());
        squares.push(orientation.square(square));
        used.add(square);
    }

    ensure!(squares.len() >= 2);
    Ok(squares)
}

fn on_diagonal(sq: Square) -> bool {
    sq.file() as usize == sq.rank() as usize
}

fn above_diagonal(sq: Square) -> bool {
    sq.rank() as usize > sq.file() as usize
}

fn index_of(sq: Square) -> u64 {
    usize::from(sq) as u64
}

fn transform(squares: &mut [Square], f: fn(Square) -> Square) {
    for sq in squares {
        *sq = f(*sq);
    }
}

/// Index of three unique leading pieces in the a1-d1-d4 triangle.
fn encode_three(squares: &[Square]) -> u64 {
    let adjust1 = u64::from(squares[1] > squares[0]);
    let adjust2 = u64::from(squares[2] > squares[0]) + u64::from(squares[2] > squares[1]);
    let rank = |sq: Square| sq.rank() as u64;

    if !on_diagonal(squares[0]) {
        TRIANGLE[usize::from(squares[0])] * 63 * 62
            + (index_of(squares[1]) - adjust1) * 62
            + (index_of(squares[2]) - adjust2)
    } else if !on_diagonal(squares[1]) {
        6 * 63 * 62
            + rank(squares[0]) * 28 * 62
            + LOWER[usize::from(squares[1])] * 62
            + index_of(squares[2])
            - adjust2
    } else if !on_diagonal(squares[2]) {
        6 * 63 * 62
            + 4 * 28 * 62
            + rank(squares[0]) * 7 * 28
            + (rank(squares[1]) - adjust1) * 28
            + LOWER[usize::from(squares[2])]
    } else {
        6 * 63 * 62
            + 4 * 28 * 62
            + 4 * 7 * 28
            + rank(squares[0]) * 7 * 6
            + (rank(squares[1]) - adjust1) * 6
            + (rank(squares[2]) - adjust2)
    }
}

/// Computes the index of a placement within its subtable.
///
/// `squares` lists the pieces in table order, already in table color
/// orientation, starting with `lead_pawns` leading pawns (if any). The board
/// symmetries are applied here.
pub(crate) fn encode_index(
    mut squares: ArrayVec<Square, MAX_PIECES>,
    lead_pawns: usize,
    groups: &GroupData,
    both_pawns: bool,
) -> ProbeResult<u64> {
    ensure!(squares.len() == groups.pieces.len());

    if squares[0].file() >= File::E {
        transform(&mut squares, Square::flip_horizontal);
    }

    let mut idx = if lead_pawns > 0 {
        let mut idx = *u!(PAWNS
            .lead_pawn_idx
            .get(lead_pawns)
            .map(|row| &row[usize::from(squares[0])]));

        squares[1..lead_pawns].sort_unstable_by_key(|sq| PAWNS.map_pawns[usize::from(*sq)]);

        for (i, &square) in squares.iter().enumerate().take(lead_pawns).skip(1) {
            idx += binomial(PAWNS.map_pawns[usize::from(square)], i as u64);
        }

        idx
    } else {
        if squares[0].rank() >= Rank::Fifth {
            transform(&mut squares, Square::flip_vertical);
        }

        // Mirror on the a1-h8 diagonal, so that the first leading piece off
        // the diagonal is below it.
        if let Some(sq) = squares[..groups.lens[0]].iter().find(|sq| !on_diagonal(**sq)) {
            if above_diagonal(*sq) {
                transform(&mut squares, Square::flip_diagonal);
            }
        }

        if groups.lens[0] == 3 {
            encode_three(&squares)
        } else {
            let idx = KK_IDX[TRIANGLE[usize::from(squares[0])] as usize][usize::from(squares[1])];
            ensure!(idx != Z0);
            idx
        }
    };

    idx = u!(idx.checked_mul(groups.factors[0]));

    // Encode remaining groups. If both sides have pawns, the first of them
    // are the pawns of the other side, which cannot be on the first rank.
    let mut remaining_pawns = both_pawns;
    let mut group_sq = groups.lens[0];
    for (next, &len) in groups.lens.iter().enumerate().skip(1) {
        let (prev_squares, group_squares) = squares.split_at_mut(group_sq);
        let group_squares = &mut group_squares[..len];
        group_squares.sort_unstable();

        let mut n = 0;
        for (i, &group_square) in group_squares.iter().enumerate() {
            let adjust = prev_squares
                .iter()
                .filter(|sq| group_square > **sq)
                .count() as u64;
            let free = u!(index_of(group_square)
                .checked_sub(adjust)
                .and_then(|v| v.checked_sub(if remaining_pawns { 8 } else { 0 })));
            n += binomial(free, i as u64 + 1);
        }

        remaining_pawns = false;
        idx = u!(n
            .checked_mul(groups.factors[next])
            .and_then(|v| v.checked_add(idx)));
        group_sq += len;
    }

    Ok(idx)
}
