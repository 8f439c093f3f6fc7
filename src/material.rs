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

use std::{cmp::Ordering, fmt, str::FromStr};

use shakmaty::{Board, Color, Piece, Role};

fn role_index(role: Role) -> usize {
    role as usize - 1
}

/// Piece counts of one side.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct MaterialSide {
    by_role: [u8; 6],
}

impl MaterialSide {
    fn from_str_part(s: &str) -> Result<MaterialSide, ParseMaterialError> {
        let mut side = MaterialSide::default();
        for ch in s.chars() {
            let role = Role::from_char(ch).ok_or(ParseMaterialError)?;
            let count = &mut side.by_role[role_index(role)];
            *count = count.checked_add(1).ok_or(ParseMaterialError)?;
        }
        Ok(side)
    }

    pub fn get(&self, role: Role) -> u8 {
        self.by_role[role_index(role)]
    }

    pub fn count(&self) -> usize {
        self.by_role.iter().copied().map(usize::from).sum()
    }

    pub fn has_pawns(&self) -> bool {
        self.get(Role::Pawn) > 0
    }

    fn unique_roles(&self) -> usize {
        self.by_role.iter().filter(|c| **c == 1).count()
    }
}

impl Ord for MaterialSide {
    fn cmp(&self, other: &MaterialSide) -> Ordering {
        self.count().cmp(&other.count()).then_with(|| {
            Role::ALL
                .iter()
                .rev()
                .map(|role| self.get(*role).cmp(&other.get(*role)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

impl PartialOrd for MaterialSide {
    fn partial_cmp(&self, other: &MaterialSide) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MaterialSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in Role::ALL.iter().rev() {
            for _ in 0..self.get(*role) {
                write!(f, "{}", role.upper_char())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MaterialSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() > 0 {
            <Self as fmt::Display>::fmt(self, f)
        } else {
            f.write_str("-")
        }
    }
}

/// Error when parsing a material key like `KRvK`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseMaterialError;

impl fmt::Display for ParseMaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid material key")
    }
}

impl std::error::Error for ParseMaterialError {}

/// A material key: the count of each piece type per side.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Material {
    pub white: MaterialSide,
    pub black: MaterialSide,
}

impl Material {
    /// Get the material configuration for a [`Board`].
    pub fn from_board(board: &Board) -> Material {
        let mut material = Material::default();
        for role in Role::ALL {
            material.white.by_role[role_index(role)] =
                board.by_piece(role.of(Color::White)).count() as u8;
            material.black.by_role[role_index(role)] =
                board.by_piece(role.of(Color::Black)).count() as u8;
        }
        material
    }

    pub fn by_color(&self, color: Color) -> &MaterialSide {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// Total number of pieces.
    pub fn count(&self) -> usize {
        self.white.count() + self.black.count()
    }

    pub(crate) fn is_symmetric(&self) -> bool {
        self.white == self.black
    }

    pub fn has_pawns(&self) -> bool {
        self.white.has_pawns() || self.black.has_pawns()
    }

    /// Both sides have pawns.
    pub(crate) fn both_have_pawns(&self) -> bool {
        self.white.has_pawns() && self.black.has_pawns()
    }

    /// Number of piece types that occur exactly once on one side.
    pub(crate) fn unique_pieces(&self) -> usize {
        self.white.unique_roles() + self.black.unique_roles()
    }

    /// Swap sides.
    pub fn flipped(&self) -> Material {
        Material {
            white: self.black.clone(),
            black: self.white.clone(),
        }
    }

    /// Stronger side first, as used in table file names.
    pub fn normalized(&self) -> Material {
        if self.white < self.black {
            self.flipped()
        } else {
            self.clone()
        }
    }

    /// Exactly one king per side, as required by every table.
    pub(crate) fn is_standard(&self) -> bool {
        self.white.get(Role::King) == 1 && self.black.get(Role::King) == 1
    }
}

impl FromIterator<Piece> for Material {
    fn from_iter<T: IntoIterator<Item = Piece>>(iter: T) -> Material {
        let mut material = Material::default();
        for piece in iter {
            let side = match piece.color {
                Color::White => &mut material.white,
                Color::Black => &mut material.black,
            };
            side.by_role[role_index(piece.role)] += 1;
        }
        material
    }
}

impl FromStr for Material {
    type Err = ParseMaterialError;

    fn from_str(s: &str) -> Result<Material, ParseMaterialError> {
        if s.len() > 64 + 1 {
            return Err(ParseMaterialError);
        }

        let (white, black) = s.split_once('v').ok_or(ParseMaterialError)?;
        Ok(Material {
            white: MaterialSide::from_str_part(white)?,
            black: MaterialSide::from_str_part(black)?,
        })
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.white, self.black)
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}v{:?}", self.white, self.black)
    }
}
