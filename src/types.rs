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

use std::{fmt, ops::Neg};

use arrayvec::ArrayVec;
use shakmaty::Piece;

/// Maximum number of pieces supported by Syzygy tables for standard chess.
pub const MAX_PIECES: usize = 7;

/// List of up to `MAX_PIECES` pieces.
pub(crate) type Pieces = ArrayVec<Piece, MAX_PIECES>;

/// Magic header bytes and file extension of a table format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct TableType {
    pub ext: &'static str,
    pub magic: [u8; 4],
}

pub(crate) const TBW: TableType = TableType {
    ext: "rtbw",
    magic: [0x71, 0xe8, 0x23, 0x5d],
};

pub(crate) const TBZ: TableType = TableType {
    ext: "rtbz",
    magic: [0xd7, 0x66, 0x0c, 0xa5],
};

/// WDL<sub>50</sub>. Possible outcomes from the point of view of the side to
/// move, taking the 50-move rule into account.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(i8)]
pub enum Wdl {
    /// Unconditional loss.
    Loss = -2,
    /// Loss that can be saved by the 50-move rule.
    BlessedLoss = -1,
    /// Unconditional draw.
    Draw = 0,
    /// Win that can be frustrated by the 50-move rule.
    CursedWin = 1,
    /// Unconditional win.
    Win = 2,
}

impl Wdl {
    /// Classifies a DTZ value, after stretching it by `halfmoves` already
    /// played since the last zeroing move.
    pub fn from_dtz_after_halfmoves(dtz: Dtz, halfmoves: u32) -> Wdl {
        Wdl::from(dtz.stretch(halfmoves))
    }

    /// Converts to a [`DecisiveWdl`], if the value is not a draw.
    pub fn decisive(self) -> Option<DecisiveWdl> {
        Some(match self {
            Wdl::Loss => DecisiveWdl::Loss,
            Wdl::BlessedLoss => DecisiveWdl::BlessedLoss,
            Wdl::Draw => return None,
            Wdl::CursedWin => DecisiveWdl::CursedWin,
            Wdl::Win => DecisiveWdl::Win,
        })
    }

    /// Folds cursed wins and blessed losses into plain wins and losses,
    /// i.e. the outcome if the 50-move rule is not in effect.
    pub fn unwrap_rule50(self) -> Wdl {
        match self {
            Wdl::Loss | Wdl::BlessedLoss => Wdl::Loss,
            Wdl::Draw => Wdl::Draw,
            Wdl::CursedWin | Wdl::Win => Wdl::Win,
        }
    }

    pub fn signum(self) -> i32 {
        i32::from(i8::from(self)).signum()
    }

    /// Numeric code as used by the Fathom interface: `Loss = 0` up to
    /// `Win = 4`.
    pub fn code(self) -> u32 {
        (i32::from(i8::from(self)) + 2) as u32
    }

    /// Inverse of [`Wdl::code()`].
    pub fn from_code(code: u32) -> Option<Wdl> {
        Some(match code {
            0 => Wdl::Loss,
            1 => Wdl::BlessedLoss,
            2 => Wdl::Draw,
            3 => Wdl::CursedWin,
            4 => Wdl::Win,
            _ => return None,
        })
    }
}

impl From<Dtz> for Wdl {
    fn from(dtz: Dtz) -> Wdl {
        match dtz.0 {
            n if n < -100 => Wdl::BlessedLoss,
            n if n < 0 => Wdl::Loss,
            0 => Wdl::Draw,
            n if n <= 100 => Wdl::Win,
            _ => Wdl::CursedWin,
        }
    }
}

impl From<DecisiveWdl> for Wdl {
    fn from(wdl: DecisiveWdl) -> Wdl {
        match wdl {
            DecisiveWdl::Loss => Wdl::Loss,
            DecisiveWdl::BlessedLoss => Wdl::BlessedLoss,
            DecisiveWdl::CursedWin => Wdl::CursedWin,
            DecisiveWdl::Win => Wdl::Win,
        }
    }
}

impl Neg for Wdl {
    type Output = Wdl;

    fn neg(self) -> Wdl {
        match self {
            Wdl::Loss => Wdl::Win,
            Wdl::BlessedLoss => Wdl::CursedWin,
            Wdl::Draw => Wdl::Draw,
            Wdl::CursedWin => Wdl::BlessedLoss,
            Wdl::Win => Wdl::Loss,
        }
    }
}

impl From<Wdl> for i8 {
    #[inline]
    fn from(wdl: Wdl) -> i8 {
        wdl as i8
    }
}

/// A [`Wdl`] that is not a draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(i8)]
pub enum DecisiveWdl {
    Loss = -2,
    BlessedLoss = -1,
    CursedWin = 1,
    Win = 2,
}

impl DecisiveWdl {
    pub fn signum(self) -> i32 {
        i32::from(self as i8).signum()
    }
}

impl Neg for DecisiveWdl {
    type Output = DecisiveWdl;

    fn neg(self) -> DecisiveWdl {
        match self {
            DecisiveWdl::Loss => DecisiveWdl::Win,
            DecisiveWdl::BlessedLoss => DecisiveWdl::CursedWin,
            DecisiveWdl::CursedWin => DecisiveWdl::BlessedLoss,
            DecisiveWdl::Win => DecisiveWdl::Loss,
        }
    }
}

/// DTZ<sub>50</sub>′′ with rounding. Based on the distance to zeroing of the
/// half-move clock.
///
/// Zeroing the half-move clock while keeping the game theoretical result in
/// hand guarantees making progress.
///
/// | DTZ | WDL | |
/// | --- | --- | --- |
/// | `-100 <= n <= -1` | Loss | Unconditional loss (assuming the 50-move counter is zero). Zeroing move can be forced in `-n` plies. |
/// | `n < -100` | BlessedLoss | Loss, but draw under the 50-move rule. A zeroing move can be forced in `-n` plies or `-n - 100` plies (if a later phase is responsible for the blessing). |
/// | 0 | Draw | |
/// | `100 < n` | CursedWin | Win, but draw under the 50-move rule. A zeroing move can be forced in `n` or `n - 100` plies (if a later phase is responsible for the curse). |
/// | `1 <= n <= 100` | Win | Unconditional win (assuming the 50-move counter is zero). Zeroing move can be forced in `n` plies. |
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Dtz(pub i32);

impl Dtz {
    /// Converts `wdl` to a `Dtz`, given that the best move is zeroing.
    ///
    /// | WDL | DTZ |
    /// | --- | --- |
    /// | Loss | -1 |
    /// | BlessedLoss | -101 |
    /// | CursedWin | 101 |
    /// | Win | 1 |
    pub fn before_zeroing<T: Into<Wdl>>(wdl: T) -> Dtz {
        match wdl.into() {
            Wdl::Loss => Dtz(-1),
            Wdl::BlessedLoss => Dtz(-101),
            Wdl::Draw => Dtz(0),
            Wdl::CursedWin => Dtz(101),
            Wdl::Win => Dtz(1),
        }
    }

    /// Increases the absolute non-zero value by `plies`.
    pub fn add_plies(self, plies: i32) -> Dtz {
        Dtz(self.0.signum().saturating_mul(plies).saturating_add(self.0))
    }

    /// Stretches the absolute non-zero value by the half-move clock. Clocks
    /// beyond `i32::MAX` saturate.
    pub fn stretch(self, halfmoves: u32) -> Dtz {
        self.add_plies(i32::try_from(halfmoves).unwrap_or(i32::MAX))
    }

    /// Removes the 100 ply offset of cursed wins and blessed losses, i.e.
    /// the distance when the 50-move rule is not in effect.
    pub fn unwrap_rule50(self) -> Dtz {
        if self.0.abs() > 100 {
            Dtz(self.0 - self.0.signum() * 100)
        } else {
            self
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn signum(self) -> i32 {
        self.0.signum()
    }
}

impl Neg for Dtz {
    type Output = Dtz;

    #[inline]
    fn neg(self) -> Dtz {
        Dtz(-self.0)
    }
}

impl From<Dtz> for i32 {
    #[inline]
    fn from(dtz: Dtz) -> i32 {
        dtz.0
    }
}

impl fmt::Display for Dtz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Syzygy tables are available for different metrics.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Metric {
    /// WDL<sub>50</sub>. See [`Wdl`].
    Wdl,
    /// DTZ<sub>50</sub>′′ with rounding. See [`Dtz`].
    Dtz,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Wdl => "wdl",
            Metric::Dtz => "dtz",
        })
    }
}

/// Potentially rounded. DTZ tables that do not need exact plies store full
/// moves instead.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MaybeRounded<T> {
    /// Rounded value, possibly off by one ply.
    Rounded(T),
    /// Exact value.
    Precise(T),
}

impl<T> MaybeRounded<T> {
    pub fn map<U, F>(self, f: F) -> MaybeRounded<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            MaybeRounded::Rounded(v) => MaybeRounded::Rounded(f(v)),
            MaybeRounded::Precise(v) => MaybeRounded::Precise(f(v)),
        }
    }

    pub fn ignore_rounding(self) -> T {
        match self {
            MaybeRounded::Rounded(v) | MaybeRounded::Precise(v) => v,
        }
    }

    pub fn is_precise(&self) -> bool {
        matches!(self, MaybeRounded::Precise(_))
    }
}

impl<T: Neg> Neg for MaybeRounded<T> {
    type Output = MaybeRounded<T::Output>;

    #[inline]
    fn neg(self) -> MaybeRounded<T::Output> {
        self.map(|v| -v)
    }
}
