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

use std::{backtrace::Backtrace, error::Error, fmt, io, path::PathBuf};

use crate::{material::Material, types::Metric};

pub type SyzygyResult<T> = Result<T, SyzygyError>;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Coarse classification of a [`SyzygyError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The tablebase could not be initialized: bad path, no usable files,
    /// or the prober is already initialized.
    InitFailure,
    /// Probe before a successful init or after free.
    NotInitialized,
    /// The position is not covered by the loaded tables.
    PositionOutOfCoverage,
    /// The raw position is malformed.
    InvalidPosition,
    /// A table failed an integrity check while opening or decoding.
    CorruptTable,
}

/// Why a raw position was rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InvalidPosition {
    /// Two piece-type bitboards share a square.
    OverlappingRoles,
    /// The white and black bitboards share a square.
    OverlappingColors,
    /// The color bitboards do not cover exactly the occupied squares.
    UnassignedSquares,
    /// A side does not have exactly one king.
    KingCount,
    /// Pawns on the first or eighth rank.
    PawnsOnBackrank,
    /// The en passant square is off the board or on the wrong rank.
    EnPassantSquare,
    /// Rejected by the rules, for example the side not to move is in check.
    Illegal,
}

impl fmt::Display for InvalidPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidPosition::OverlappingRoles => "piece bitboards overlap",
            InvalidPosition::OverlappingColors => "color bitboards overlap",
            InvalidPosition::UnassignedSquares => "color bitboards do not match occupied squares",
            InvalidPosition::KingCount => "expected exactly one king per side",
            InvalidPosition::PawnsOnBackrank => "pawns on backrank",
            InvalidPosition::EnPassantSquare => "invalid en passant square",
            InvalidPosition::Illegal => "illegal position",
        })
    }
}

/// Error when initializing or probing a tablebase.
#[derive(Debug)]
pub enum SyzygyError {
    /// The prober is already initialized. Call
    /// [`Prober::free()`](crate::Prober::free) first.
    AlreadyInitialized,
    /// None of the given directories could be read.
    InitFailed {
        #[allow(missing_docs)]
        path: PathBuf,
        #[allow(missing_docs)]
        error: io::Error,
    },
    /// The given directories do not contain any usable table.
    NoTables {
        #[allow(missing_docs)]
        path: PathBuf,
    },
    /// Probe before init or after free.
    NotInitialized,
    /// Position has castling rights, but Syzygy tables do not contain
    /// positions with castling rights.
    Castling,
    /// Position has too many pieces, i.e., more pieces than any registered
    /// table or the configured probe limit.
    TooManyPieces,
    /// Missing table.
    MissingTable {
        #[allow(missing_docs)]
        metric: Metric,
        #[allow(missing_docs)]
        material: Material,
    },
    /// The raw position failed validation.
    InvalidPosition {
        #[allow(missing_docs)]
        reason: InvalidPosition,
    },
    /// Probe failed.
    ProbeFailed {
        #[allow(missing_docs)]
        metric: Metric,
        #[allow(missing_docs)]
        material: Material,
        #[allow(missing_docs)]
        error: Box<ProbeError>,
    },
    /// Table was excluded after an earlier integrity failure.
    CorruptTable {
        #[allow(missing_docs)]
        metric: Metric,
        #[allow(missing_docs)]
        material: Material,
    },
}

impl SyzygyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyzygyError::AlreadyInitialized
            | SyzygyError::InitFailed { .. }
            | SyzygyError::NoTables { .. } => ErrorKind::InitFailure,
            SyzygyError::NotInitialized => ErrorKind::NotInitialized,
            SyzygyError::Castling
            | SyzygyError::TooManyPieces
            | SyzygyError::MissingTable { .. } => ErrorKind::PositionOutOfCoverage,
            SyzygyError::InvalidPosition { .. } => ErrorKind::InvalidPosition,
            SyzygyError::ProbeFailed { .. } | SyzygyError::CorruptTable { .. } => {
                ErrorKind::CorruptTable
            }
        }
    }
}

impl fmt::Display for SyzygyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyzygyError::AlreadyInitialized => f.write_str("tablebase already initialized"),
            SyzygyError::InitFailed { path, error } => {
                write!(f, "failed to read tablebase directory {}: {error}", path.display())
            }
            SyzygyError::NoTables { path } => {
                write!(f, "no syzygy tables found in {}", path.display())
            }
            SyzygyError::NotInitialized => f.write_str("tablebase not initialized"),
            SyzygyError::Castling => write!(
                f,
                "syzygy tables do not contain position with castling rights"
            ),
            SyzygyError::TooManyPieces => write!(f, "too many pieces"),
            SyzygyError::MissingTable { metric, material } => {
                write!(f, "required {metric} table not found: {material}")
            }
            SyzygyError::InvalidPosition { reason } => write!(f, "invalid position: {reason}"),
            SyzygyError::ProbeFailed {
                metric,
                material,
                error,
            } => write!(f, "failed to probe {metric} table {material}: {error}"),
            SyzygyError::CorruptTable { metric, material } => {
                write!(f, "{metric} table {material} is excluded after corruption")
            }
        }
    }
}

impl Error for SyzygyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyzygyError::InitFailed { error, .. } => Some(error),
            SyzygyError::ProbeFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<InvalidPosition> for SyzygyError {
    fn from(reason: InvalidPosition) -> SyzygyError {
        SyzygyError::InvalidPosition { reason }
    }
}

/// Error when probing a table.
#[derive(Debug)]
pub enum ProbeError {
    /// I/O error.
    Read {
        #[allow(missing_docs)]
        error: io::Error,
    },
    /// Table file has unexpected magic header bytes.
    Magic {
        #[allow(missing_docs)]
        magic: [u8; 4],
    },
    /// Corrupted table.
    CorruptedTable {
        #[allow(missing_docs)]
        backtrace: Backtrace,
    },
}

impl ProbeError {
    /// Integrity failures are permanent. Plain read errors may be transient.
    pub(crate) fn is_integrity_failure(&self) -> bool {
        !matches!(self, ProbeError::Read { .. })
    }

    /// Adds the table that failed.
    pub(crate) fn ctx(self, metric: Metric, material: &Material) -> SyzygyError {
        SyzygyError::ProbeFailed {
            metric,
            material: material.clone(),
            error: Box::new(self),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Read { error } => write!(f, "i/o error reading table file: {error}"),
            ProbeError::Magic { magic } => write!(f, "invalid magic header bytes: {magic:x?}"),
            ProbeError::CorruptedTable { backtrace } => write!(f, "corrupted table: {backtrace}"),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::Read { error } => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(error: io::Error) -> ProbeError {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => ProbeError::CorruptedTable {
                backtrace: Backtrace::capture(),
            },
            _ => ProbeError::Read { error },
        }
    }
}

/// Return a `CorruptedTable` error.
macro_rules! throw {
    () => {
        return Err(crate::errors::ProbeError::CorruptedTable {
            backtrace: ::std::backtrace::Backtrace::capture(),
        })
    };
}

/// Unwrap an `Option` or return a `CorruptedTable` error.
macro_rules! u {
    ($e:expr) => {
        match $e {
            Some(ok) => ok,
            None => throw!(),
        }
    };
}

/// Ensure that a condition holds. Otherwise return a `CorruptedTable` error.
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            throw!();
        }
    };
}
