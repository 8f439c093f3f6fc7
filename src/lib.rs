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

//! Probe Syzygy endgame tablebases.
//!
//! [Syzygy tables](https://syzygy-tables.info/#syzygy) allow optimal play
//! under the 50-move rule. Tables are available for positions with up to 7
//! pieces.
//!
//! # Example
//!
//! ```no_run
//! use syzygy_probe::{MaybeRounded, Prober, RawPosition, Wdl};
//!
//! let mut prober = Prober::new();
//! prober.init("tables/chess")?;
//!
//! // White: Ka1, Rb1. Black: kc3. White to move.
//! let pos = RawPosition {
//!     white: 0x03,
//!     black: 0x04_0000,
//!     kings: 0x04_0001,
//!     rooks: 0x02,
//!     turn: true,
//!     ..RawPosition::default()
//! };
//!
//! assert_eq!(prober.probe_wdl(&pos)?, Wdl::Win);
//!
//! let dtz = prober.probe_dtz(&pos, true)?;
//! assert!(matches!(dtz, MaybeRounded::Precise(_) | MaybeRounded::Rounded(_)));
//!
//! for root_move in prober.probe_root_dtz(&pos, false, true)? {
//!     println!("{:?}: rank {}", root_move.m, root_move.rank);
//! }
//! # Ok::<_, syzygy_probe::SyzygyError>(())
//! ```
//!
//! Callers that already have a [`shakmaty::Chess`] can use [`Tablebase`]
//! directly.
//!
//! # Feature flags
//!
//! * `mmap`: Provides [`MmapFilesystem`] to read tables through memory
//!   mapped files.

#![doc(html_root_url = "https://docs.rs/syzygy-probe/0.1.0")]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_debug_implementations)]
#![cfg_attr(docs_rs, feature(doc_auto_cfg))]

#[macro_use]
mod errors;
mod encoding;
mod huffman;
mod material;
mod position;
mod prober;
mod root;
mod table;
mod tablebase;
mod types;

pub mod filesystem;
pub mod result;

pub use crate::{
    errors::{ErrorKind, InvalidPosition, ProbeError, ProbeResult, SyzygyError, SyzygyResult},
    material::{Material, MaterialSide, ParseMaterialError},
    position::{
        RawPosition, CASTLE_BLACK_KINGSIDE, CASTLE_BLACK_QUEENSIDE, CASTLE_WHITE_KINGSIDE,
        CASTLE_WHITE_QUEENSIDE,
    },
    prober::Prober,
    root::{
        LineEnd, PrincipalVariation, RootMove, RootMoves, RootProbe, MAX_DTZ, TB_MAX_MATE_PLY,
        TB_VALUE_MATE, TB_WIN_SCORE,
    },
    tablebase::Tablebase,
    types::{DecisiveWdl, Dtz, MaybeRounded, Metric, Wdl, MAX_PIECES},
};
#[cfg(feature = "mmap")]
pub use crate::filesystem::MmapFilesystem;
pub use crate::filesystem::{Filesystem, OsFilesystem, RandomAccessFile, ReadHint};
