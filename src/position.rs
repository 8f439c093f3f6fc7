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

//! Raw positions as passed across the probing interface.

use shakmaty::{
    Bitboard, Board, CastlingMode, Chess, Color, EnPassantMode, FromSetup as _, Piece, Position,
    Role, Setup, Square,
};

use crate::errors::InvalidPosition;

/// White may castle kingside.
pub const CASTLE_WHITE_KINGSIDE: u32 = 1;
/// White may castle queenside.
pub const CASTLE_WHITE_QUEENSIDE: u32 = 2;
/// Black may castle kingside.
pub const CASTLE_BLACK_KINGSIDE: u32 = 4;
/// Black may castle queenside.
pub const CASTLE_BLACK_QUEENSIDE: u32 = 8;

const BACKRANKS: u64 = 0xff00_0000_0000_00ff;

const CASTLING_ROOKS: [(u32, Square); 4] = [
    (CASTLE_WHITE_KINGSIDE, Square::H1),
    (CASTLE_WHITE_QUEENSIDE, Square::A1),
    (CASTLE_BLACK_KINGSIDE, Square::H8),
    (CASTLE_BLACK_QUEENSIDE, Square::A8),
];

/// A position given as bitboards and counters.
///
/// Piece bitboards are combined with color bitboards, i.e. the white king is
/// `white & kings`. Square indexes run from a1 = 0 to h8 = 63.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct RawPosition {
    pub white: u64,
    pub black: u64,
    pub kings: u64,
    pub queens: u64,
    pub rooks: u64,
    pub bishops: u64,
    pub knights: u64,
    pub pawns: u64,
    /// Half-moves since the last capture or pawn move.
    pub rule50: u32,
    /// Castling rights, see the `CASTLE_*` constants.
    pub castling: u32,
    /// En passant target square, or 0 if there is none.
    pub ep: u32,
    /// `true` if white is to move.
    pub turn: bool,
}

impl RawPosition {
    fn by_role(&self) -> [(Role, u64); 6] {
        [
            (Role::Pawn, self.pawns),
            (Role::Knight, self.knights),
            (Role::Bishop, self.bishops),
            (Role::Rook, self.rooks),
            (Role::Queen, self.queens),
            (Role::King, self.kings),
        ]
    }

    fn occupied(&self) -> u64 {
        self.by_role().iter().fold(0, |acc, (_, bb)| acc | bb)
    }

    pub fn turn(&self) -> Color {
        Color::from_white(self.turn)
    }

    /// Number of pieces on the board, including kings.
    pub fn piece_count(&self) -> usize {
        self.occupied().count_ones() as usize
    }

    pub fn has_castling_rights(&self) -> bool {
        self.castling & 0xf != 0
    }

    /// Checks the structural invariants: disjoint bitboards, one king per
    /// side, no pawns on the backranks and a plausible en passant square.
    pub fn validate(&self) -> Result<(), InvalidPosition> {
        let mut seen = 0;
        for (_, bb) in self.by_role() {
            if seen & bb != 0 {
                return Err(InvalidPosition::OverlappingRoles);
            }
            seen |= bb;
        }

        if self.white & self.black != 0 {
            return Err(InvalidPosition::OverlappingColors);
        }
        if self.white | self.black != seen {
            return Err(InvalidPosition::UnassignedSquares);
        }

        if (self.kings & self.white).count_ones() != 1
            || (self.kings & self.black).count_ones() != 1
        {
            return Err(InvalidPosition::KingCount);
        }

        if self.pawns & BACKRANKS != 0 {
            return Err(InvalidPosition::PawnsOnBackrank);
        }

        self.ep_square().map(|_| ())
    }

    /// The en passant target square, checked to be on the rank behind a
    /// pawn that just made a double step.
    pub fn ep_square(&self) -> Result<Option<Square>, InvalidPosition> {
        if self.ep == 0 {
            return Ok(None);
        }
        if self.ep >= 64 {
            return Err(InvalidPosition::EnPassantSquare);
        }
        let expected_rank = if self.turn { 5 } else { 2 };
        if self.ep / 8 != expected_rank {
            return Err(InvalidPosition::EnPassantSquare);
        }
        Ok(Some(Square::new(self.ep)))
    }

    fn board(&self) -> Board {
        let mut board = Board::empty();
        for (role, bb) in self.by_role() {
            for (color, side) in [(Color::White, self.white), (Color::Black, self.black)] {
                for sq in Bitboard(bb & side) {
                    board.set_piece_at(sq, Piece { color, role });
                }
            }
        }
        board
    }

    fn castling_rights(&self) -> Bitboard {
        let mut rights = Bitboard(0);
        for (flag, rook) in CASTLING_ROOKS {
            if self.castling & flag != 0 {
                rights.add(rook);
            }
        }
        rights
    }

    /// Validates and converts to a playable position.
    ///
    /// # Errors
    ///
    /// Returns the reason if the bitboards are malformed, or if the
    /// position is illegal, for example because the side not to move is in
    /// check.
    pub fn to_chess(&self) -> Result<Chess, InvalidPosition> {
        self.validate()?;

        let setup = Setup {
            board: self.board(),
            turn: self.turn(),
            castling_rights: self.castling_rights(),
            ep_square: self.ep_square()?,
            halfmoves: self.rule50,
            ..Setup::empty()
        };

        Chess::from_setup(setup, CastlingMode::Standard).map_err(|error| {
            tracing::trace!(%error, "rejected raw position");
            InvalidPosition::Illegal
        })
    }

    /// The same position with colors swapped: the board is flipped
    /// vertically, the other side is to move, and castling rights and the
    /// en passant square follow.
    #[must_use]
    pub fn mirrored(&self) -> RawPosition {
        RawPosition {
            white: self.black.swap_bytes(),
            black: self.white.swap_bytes(),
            kings: self.kings.swap_bytes(),
            queens: self.queens.swap_bytes(),
            rooks: self.rooks.swap_bytes(),
            bishops: self.bishops.swap_bytes(),
            knights: self.knights.swap_bytes(),
            pawns: self.pawns.swap_bytes(),
            rule50: self.rule50,
            castling: ((self.castling & 0x3) << 2) | ((self.castling >> 2) & 0x3),
            ep: if self.ep == 0 { 0 } else { self.ep ^ 56 },
            turn: !self.turn,
        }
    }

    /// Same piece placement, side to move, castling rights and en passant
    /// square. The half-move clock is not compared.
    pub fn is_repetition_of(&self, other: &RawPosition) -> bool {
        RawPosition {
            rule50: 0,
            ..*self
        } == RawPosition {
            rule50: 0,
            ..*other
        }
    }
}

impl From<&Chess> for RawPosition {
    fn from(pos: &Chess) -> RawPosition {
        let board = pos.board();
        let rights = pos.castles().castling_rights();
        RawPosition {
            white: board.by_color(Color::White).0,
            black: board.by_color(Color::Black).0,
            kings: board.kings().0,
            queens: board.queens().0,
            rooks: board.rooks().0,
            bishops: board.bishops().0,
            knights: board.knights().0,
            pawns: board.pawns().0,
            rule50: pos.halfmoves(),
            castling: CASTLING_ROOKS
                .iter()
                .filter(|(_, rook)| rights.contains(*rook))
                .fold(0, |acc, (flag, _)| acc | flag),
            ep: pos
                .ep_square(EnPassantMode::Legal)
                .map_or(0, u32::from),
            turn: pos.turn().is_white(),
        }
    }
}

#[cfg(test)]
mod tests {
    use shakmaty::fen::Fen;

    use super::*;

    fn raw(fen: &str) -> RawPosition {
        let pos: Chess = fen
            .parse::<Fen>()
            .expect("valid fen")
            .into_position(CastlingMode::Standard)
            .expect("legal position");
        RawPosition::from(&pos)
    }

    #[test]
    fn test_round_trip_chess() {
        let original = raw("8/8/8/8/8/2k5/8/KR6 w - - 7 40");
        assert_eq!(original.piece_count(), 3);
        assert_eq!(original.rule50, 7);
        let pos = original.to_chess().expect("valid");
        assert_eq!(RawPosition::from(&pos), original);
    }

    #[test]
    fn test_castling_mask() {
        let pos = raw("r3k3/8/8/8/8/8/8/4K2R w Kq - 0 1");
        assert_eq!(pos.castling, CASTLE_WHITE_KINGSIDE | CASTLE_BLACK_QUEENSIDE);
        assert!(pos.has_castling_rights());
        assert_eq!(
            pos.mirrored().castling,
            CASTLE_BLACK_KINGSIDE | CASTLE_WHITE_QUEENSIDE
        );
    }

    #[test]
    fn test_missing_king() {
        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.kings &= !pos.black;
        pos.black &= pos.kings | pos.rooks;
        assert_eq!(pos.validate(), Err(InvalidPosition::KingCount));
    }

    #[test]
    fn test_overlaps() {
        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.queens = pos.rooks;
        assert_eq!(pos.validate(), Err(InvalidPosition::OverlappingRoles));

        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.black |= pos.rooks;
        assert_eq!(pos.validate(), Err(InvalidPosition::OverlappingColors));

        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.white |= 1 << 40;
        assert_eq!(pos.validate(), Err(InvalidPosition::UnassignedSquares));
    }

    #[test]
    fn test_pawns_on_backrank() {
        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.rooks = 0;
        pos.pawns = 1 << 1;
        assert_eq!(pos.validate(), Err(InvalidPosition::PawnsOnBackrank));
    }

    #[test]
    fn test_ep_square() {
        let pos = raw("8/8/8/2k5/3Pp3/8/8/4K3 b - d3 0 1");
        assert_eq!(pos.ep_square(), Ok(Some(Square::D3)));

        let bogus = RawPosition {
            ep: 27,
            ..pos
        };
        assert_eq!(bogus.validate(), Err(InvalidPosition::EnPassantSquare));
    }

    #[test]
    fn test_illegal() {
        // Side not to move is in check.
        let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
        pos.rooks = 1 << 2;
        pos.white = (pos.kings & pos.white) | pos.rooks;
        assert_eq!(pos.to_chess().err(), Some(InvalidPosition::Illegal));
    }

    #[test]
    fn test_mirrored() {
        let pos = raw("8/8/8/2k5/3Pp3/8/8/4K3 b - d3 3 1");
        let mirrored = pos.mirrored();
        assert_eq!(mirrored, raw("4k3/8/8/3pP3/2K5/8/8/8 w - d6 3 1"));
        assert_eq!(mirrored.mirrored(), pos);
        assert!(!mirrored.is_repetition_of(&pos));
        assert!(pos.is_repetition_of(&RawPosition { rule50: 50, ..pos }));
    }
}
