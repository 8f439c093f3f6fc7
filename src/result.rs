// This file is part of the syzygy-probe library.
// Copyright (C) 2026 The syzygy-probe developers
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

//! Packed integer results, bit compatible with the Fathom probing interface.
//!
//! A root result is a `u32`:
//!
//! | Bits | Field |
//! | --- | --- |
//! | 0-3 | WDL code, see [`Wdl::code()`] |
//! | 4-9 | To square |
//! | 10-15 | From square |
//! | 16-18 | Promotion: none 0, queen 1, rook 2, bishop 3, knight 4 |
//! | 19 | En passant |
//! | 20-31 | DTZ magnitude |

use shakmaty::{Move, Role, Square};

use crate::{
    root::{RootMove, RootProbe},
    types::Wdl,
};

/// The probe failed.
pub const TB_RESULT_FAILED: u32 = 0xffff_ffff;
/// The side to move is checkmated.
pub const TB_RESULT_CHECKMATE: u32 = 4;
/// The side to move is stalemated.
pub const TB_RESULT_STALEMATE: u32 = 2;

const WDL_MASK: u32 = 0x0000_000f;
const TO_MASK: u32 = 0x0000_03f0;
const FROM_MASK: u32 = 0x0000_fc00;
const PROMOTES_MASK: u32 = 0x0007_0000;
const EP_MASK: u32 = 0x0008_0000;
const DTZ_MASK: u32 = 0xfff0_0000;

const TO_SHIFT: u32 = 4;
const FROM_SHIFT: u32 = 10;
const PROMOTES_SHIFT: u32 = 16;
const EP_SHIFT: u32 = 19;
const DTZ_SHIFT: u32 = 20;

const MAX_PACKED_DTZ: u32 = DTZ_MASK >> DTZ_SHIFT;

fn promotion_code(role: Option<Role>) -> u32 {
    match role {
        Some(Role::Queen) => 1,
        Some(Role::Rook) => 2,
        Some(Role::Bishop) => 3,
        Some(Role::Knight) => 4,
        _ => 0,
    }
}

fn promotion_role(code: u32) -> Option<Role> {
    match code {
        1 => Some(Role::Queen),
        2 => Some(Role::Rook),
        3 => Some(Role::Bishop),
        4 => Some(Role::Knight),
        _ => None,
    }
}

fn square(bits: u32) -> Square {
    Square::new(bits & 0x3f)
}

/// A decoded root result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootCode {
    Failed,
    Checkmate,
    Stalemate,
    Move {
        wdl: Wdl,
        from: Square,
        to: Square,
        promotion: Option<Role>,
        en_passant: bool,
        dtz: u32,
    },
}

/// Packs a ranked root move. DTZ magnitudes saturate at 4095.
pub fn encode_root_move(root_move: &RootMove) -> u32 {
    let m = &root_move.m;
    let wdl = root_move.wdl.map_or(Wdl::Draw.code(), Wdl::code);
    let from = m.from().map_or(0, u32::from);
    let to = u32::from(m.to());
    let dtz = root_move
        .dtz
        .map_or(0, |dtz| dtz.0.unsigned_abs().min(MAX_PACKED_DTZ));

    (wdl & WDL_MASK)
        | ((to << TO_SHIFT) & TO_MASK)
        | ((from << FROM_SHIFT) & FROM_MASK)
        | ((promotion_code(m.promotion()) << PROMOTES_SHIFT) & PROMOTES_MASK)
        | ((u32::from(m.is_en_passant()) << EP_SHIFT) & EP_MASK)
        | ((dtz << DTZ_SHIFT) & DTZ_MASK)
}

/// Packs the result of [`Tablebase::best_move()`](crate::Tablebase::best_move).
pub fn encode_root(probe: &RootProbe) -> u32 {
    match probe {
        RootProbe::Checkmate => TB_RESULT_CHECKMATE,
        RootProbe::Stalemate => TB_RESULT_STALEMATE,
        RootProbe::Move(root_move) => encode_root_move(root_move),
    }
}

/// Unpacks a root result. Returns `None` if the WDL field holds no valid
/// code.
pub fn decode_root(code: u32) -> Option<RootCode> {
    if code == TB_RESULT_FAILED {
        return Some(RootCode::Failed);
    }

    let wdl = Wdl::from_code(code & WDL_MASK)?;
    let from = (code & FROM_MASK) >> FROM_SHIFT;
    let to = (code & TO_MASK) >> TO_SHIFT;

    if from == 0 && to == 0 {
        return match wdl {
            Wdl::Win => Some(RootCode::Checkmate),
            Wdl::Draw => Some(RootCode::Stalemate),
            _ => None,
        };
    }

    Some(RootCode::Move {
        wdl,
        from: square(from),
        to: square(to),
        promotion: promotion_role((code & PROMOTES_MASK) >> PROMOTES_SHIFT),
        en_passant: code & EP_MASK != 0,
        dtz: (code & DTZ_MASK) >> DTZ_SHIFT,
    })
}

/// Packs a move into 16 bits: to square in bits 0-5, from square in bits
/// 6-11 and the promotion in bits 12-14.
pub fn encode_move(m: &Move) -> u16 {
    let from = m.from().map_or(0, u32::from);
    let to = u32::from(m.to());
    let packed = to | (from << 6) | (promotion_code(m.promotion()) << 12);
    (packed & 0x7fff) as u16
}

/// Unpacks a move encoded with [`encode_move()`] into from square, to square
/// and promotion.
pub fn decode_move(code: u16) -> (Square, Square, Option<Role>) {
    let code = u32::from(code);
    (
        square(code >> 6),
        square(code),
        promotion_role((code >> 12) & 0x7),
    )
}

#[cfg(test)]
mod tests {
    use shakmaty::Move;

    use super::*;
    use crate::types::Dtz;

    fn root_move(m: Move, wdl: Wdl, dtz: i32) -> RootMove {
        RootMove {
            m,
            wdl: Some(wdl),
            dtz: Some(Dtz(dtz)),
            rank: 0,
            score: 0,
            repeats: false,
        }
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(encode_root(&RootProbe::Checkmate), 4);
        assert_eq!(encode_root(&RootProbe::Stalemate), 2);
        assert_eq!(decode_root(TB_RESULT_CHECKMATE), Some(RootCode::Checkmate));
        assert_eq!(decode_root(TB_RESULT_STALEMATE), Some(RootCode::Stalemate));
        assert_eq!(decode_root(TB_RESULT_FAILED), Some(RootCode::Failed));
        assert_eq!(decode_root(7), None);
    }

    #[test]
    fn test_root_bit_layout() {
        let m = Move::Normal {
            role: Role::Pawn,
            from: Square::G7,
            capture: Some(Role::Rook),
            to: Square::H8,
            promotion: Some(Role::Knight),
        };
        let code = encode_root_move(&root_move(m, Wdl::Loss, -17));
        assert_eq!(code & 0xf, 0);
        assert_eq!((code >> 4) & 0x3f, 63);
        assert_eq!((code >> 10) & 0x3f, 54);
        assert_eq!((code >> 16) & 0x7, 4);
        assert_eq!(code & (1 << 19), 0);
        assert_eq!(code >> 20, 17);

        assert_eq!(
            decode_root(code),
            Some(RootCode::Move {
                wdl: Wdl::Loss,
                from: Square::G7,
                to: Square::H8,
                promotion: Some(Role::Knight),
                en_passant: false,
                dtz: 17,
            })
        );
    }

    #[test]
    fn test_en_passant_and_saturation() {
        let m = Move::EnPassant {
            from: Square::E5,
            to: Square::D6,
        };
        let code = encode_root_move(&root_move(m, Wdl::CursedWin, 100_000));
        assert_eq!(code & 0xf, 3);
        assert_ne!(code & (1 << 19), 0);
        assert_eq!(code >> 20, 0xfff);
    }

    #[test]
    fn test_move16() {
        let m = Move::Normal {
            role: Role::Pawn,
            from: Square::B2,
            capture: None,
            to: Square::B1,
            promotion: Some(Role::Queen),
        };
        let code = encode_move(&m);
        assert_eq!(code, 1 | (9 << 6) | (1 << 12));
        assert_eq!(decode_move(code), (Square::B2, Square::B1, Some(Role::Queen)));
    }
}
