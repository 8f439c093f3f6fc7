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

use std::{
    backtrace::Backtrace,
    cmp::max,
    fmt, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use shakmaty::{Chess, Position, Role};

use crate::{
    errors::{ProbeError, SyzygyError, SyzygyResult},
    filesystem::{Filesystem, OsFilesystem},
    material::Material,
    table::{DtzTable, DtzTag, Table, TableTag, WdlTable, WdlTag},
    types::{DecisiveWdl, Dtz, MaybeRounded, Metric, Wdl, MAX_PIECES},
};

/// Additional probe information from a brief alpha-beta search.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ProbeState {
    /// Normal probe.
    Normal,
    /// Best move is zeroing.
    ZeroingBestMove,
}

/// A lazily opened table.
struct Slot<T: TableTag> {
    path: PathBuf,
    table: OnceCell<Table<T>>,
    /// Set after an integrity failure. The table is not used again.
    poisoned: AtomicBool,
}

impl<T: TableTag> Slot<T> {
    fn new(path: PathBuf) -> Slot<T> {
        Slot {
            path,
            table: OnceCell::new(),
            poisoned: AtomicBool::new(false),
        }
    }

    fn get(&self, filesystem: &dyn Filesystem, material: &Material) -> SyzygyResult<&Table<T>> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(SyzygyError::CorruptTable {
                metric: T::METRIC,
                material: material.clone(),
            });
        }

        self.table
            .get_or_try_init(|| {
                tracing::debug!(metric = %T::METRIC, %material, path = ?self.path, "opening table");
                Table::open(filesystem, &self.path, material)
            })
            .map_err(|error| self.fail(error, material))
    }

    /// Poisons the table on integrity failures and adds context.
    fn fail(&self, error: ProbeError, material: &Material) -> SyzygyError {
        if error.is_integrity_failure() && !self.poisoned.swap(true, Ordering::AcqRel) {
            tracing::warn!(metric = %T::METRIC, %material, path = ?self.path, %error, "excluding corrupted table");
        }
        error.ctx(T::METRIC, material)
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }
}

impl<T: TableTag> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("path", &self.path)
            .field("open", &self.table.get().is_some())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

/// A collection of tables.
pub struct Tablebase {
    filesystem: Arc<dyn Filesystem>,
    wdl: FxHashMap<Material, Slot<WdlTag>>,
    dtz: FxHashMap<Material, Slot<DtzTag>>,
    max_pieces: usize,
}

impl fmt::Debug for Tablebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tablebase")
            .field("wdl", &self.wdl)
            .field("dtz", &self.dtz)
            .field("max_pieces", &self.max_pieces)
            .finish_non_exhaustive()
    }
}

impl Default for Tablebase {
    fn default() -> Tablebase {
        Tablebase::new()
    }
}

impl Tablebase {
    /// Create an empty collection of tables.
    pub fn new() -> Tablebase {
        Tablebase::with_filesystem(Arc::new(OsFilesystem))
    }

    /// Create an empty collection of tables that will be read through a
    /// custom filesystem.
    pub fn with_filesystem(filesystem: Arc<dyn Filesystem>) -> Tablebase {
        Tablebase {
            filesystem,
            wdl: FxHashMap::default(),
            dtz: FxHashMap::default(),
            max_pieces: 0,
        }
    }

    /// Add all relevant tables from a directory.
    ///
    /// Tables are selected by filename, e.g. `KQvKP.rtbz`. The files are not
    /// actually opened. This happens lazily when probing. Files whose size
    /// cannot belong to a valid table are skipped.
    ///
    /// Returns the number of added tables.
    ///
    /// # Errors
    ///
    /// Returns an error result when:
    ///
    /// * The `path` does not exist.
    /// * `path` is not a directory.
    /// * The process lacks permissions to list the directory.
    pub fn add_directory<P: AsRef<Path>>(&mut self, path: P) -> io::Result<usize> {
        let mut num = 0;

        for path in self.filesystem.read_dir(path.as_ref())? {
            if self.add_file(&path) {
                num += 1;
            }
        }

        Ok(num)
    }

    fn add_file(&mut self, path: &Path) -> bool {
        let (stem, ext) = match (path.file_stem().and_then(|s| s.to_str()), path.extension()) {
            (Some(stem), Some(ext)) => (stem, ext),
            _ => return false,
        };

        let is_wdl = ext == WdlTag::TYPE.ext;
        if !is_wdl && ext != DtzTag::TYPE.ext {
            return false;
        }

        let material: Material = match stem.parse() {
            Ok(material) => material,
            Err(_) => return false,
        };

        if material.count() > MAX_PIECES || !material.is_standard() {
            tracing::debug!(?path, "skipping unsupported material");
            return false;
        }

        match self.filesystem.regular_file_size(path) {
            Ok(size) if size % 64 == 16 => (),
            Ok(size) => {
                tracing::debug!(?path, size, "skipping file with invalid size");
                return false;
            }
            Err(error) => {
                tracing::debug!(?path, %error, "skipping file");
                return false;
            }
        }

        self.max_pieces = max(self.max_pieces, material.count());

        let key = material.normalized();
        if is_wdl {
            self.wdl.insert(key, Slot::new(path.to_owned()));
        } else {
            self.dtz.insert(key, Slot::new(path.to_owned()));
        }
        true
    }

    /// Number of registered WDL and DTZ tables.
    pub fn num_tables(&self) -> usize {
        self.wdl.len() + self.dtz.len()
    }

    /// Maximum number of pieces of any registered table, or 0.
    pub fn max_pieces(&self) -> usize {
        self.max_pieces
    }

    /// Probe tables for the [`Wdl`] value of a position, taking the
    /// half-move clock into account.
    ///
    /// If the clock is not zero and the position is decisive, this also
    /// probes DTZ tables to find out if the result can be reached before the
    /// 50-move rule applies.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_wdl(&self, pos: &Chess) -> SyzygyResult<Wdl> {
        let entry = self.probe(pos)?;
        let halfmoves = pos.halfmoves();
        if halfmoves == 0 || entry.wdl == Wdl::Draw {
            return Ok(entry.wdl);
        }
        let dtz = entry.dtz()?;
        Ok(Wdl::from_dtz_after_halfmoves(dtz.ignore_rounding(), halfmoves))
    }

    /// Probe tables for the [`Wdl`] value of a position, assuming `pos`
    /// has been reached directly after a capture or pawn move.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_wdl_after_zeroing(&self, pos: &Chess) -> SyzygyResult<Wdl> {
        self.probe(pos).map(|entry| entry.wdl)
    }

    /// Probe tables for the [`Dtz`] value of a position.
    ///
    /// Min-maxing the DTZ of the available moves guarantees achieving the
    /// optimal outcome under the 50-move rule.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`] for possible error conditions.
    pub fn probe_dtz(&self, pos: &Chess) -> SyzygyResult<MaybeRounded<Dtz>> {
        self.probe(pos)?.dtz()
    }

    fn probe<'a>(&'a self, pos: &'a Chess) -> SyzygyResult<WdlEntry<'a>> {
        if pos.board().occupied().count() > max(self.max_pieces, 2) {
            return Err(SyzygyError::TooManyPieces);
        }
        if pos.castles().any() {
            return Err(SyzygyError::Castling);
        }

        // Determine the WDL value of this position. This is also a
        // prerequisite for probing DTZ tables. There are two complications:
        //
        // (1) Resolving en passant captures.
        //
        // (2) When a position has a capture that achieves a particular result
        //     (e.g. there is a winning capture), then the position itself
        //     should have at least that value (e.g. it is winning). In this
        //     case the table can store an arbitrary lower value, whichever is
        //     best for compression.
        //
        //     If the best move is zeroing, then we need remember this to avoid
        //     probing the DTZ tables.

        // Resolve captures: Find the best non-ep capture and the best
        // en passant capture.
        let mut best_capture = Wdl::Loss;
        let mut best_ep = Wdl::Loss;

        let legals = pos.legal_moves();

        for m in legals.iter().filter(|m| m.is_capture()) {
            let mut after = pos.clone();
            after.play_unchecked(m);
            let v = -self.probe_ab_no_ep(&after, Wdl::Loss, -best_capture)?;

            if v == Wdl::Win {
                return Ok(WdlEntry {
                    tablebase: self,
                    pos,
                    wdl: v,
                    state: ProbeState::ZeroingBestMove,
                });
            }

            if m.is_en_passant() {
                best_ep = max(best_ep, v);
            } else {
                best_capture = max(best_capture, v);
            }
        }

        // Probe table.
        let v = self.probe_wdl_table(pos)?;

        // Now max(v, best_capture) is the WDL value of the position without
        // ep rights. Detect the case were an ep move is stricly better
        // (including blessed losing positions).
        if best_ep > max(v, best_capture) {
            return Ok(WdlEntry {
                tablebase: self,
                pos,
                wdl: best_ep,
                state: ProbeState::ZeroingBestMove,
            });
        }

        best_capture = max(best_capture, best_ep);

        // Now max(v, best_capture) is the WDL value of the position, unless
        // the position without ep rights is stalemate (and there are ep
        // moves).
        if best_capture >= v {
            return Ok(WdlEntry {
                tablebase: self,
                pos,
                wdl: best_capture,
                state: if best_capture > Wdl::Draw {
                    ProbeState::ZeroingBestMove
                } else {
                    ProbeState::Normal
                },
            });
        }

        // If the position would be stalemate without ep captures, then we are
        // forced to play the best en passant move.
        if v == Wdl::Draw && !legals.is_empty() && legals.iter().all(|m| m.is_en_passant()) {
            return Ok(WdlEntry {
                tablebase: self,
                pos,
                wdl: best_ep,
                state: ProbeState::ZeroingBestMove,
            });
        }

        Ok(WdlEntry {
            tablebase: self,
            pos,
            wdl: v,
            state: ProbeState::Normal,
        })
    }

    fn probe_ab_no_ep(&self, pos: &Chess, mut alpha: Wdl, beta: Wdl) -> SyzygyResult<Wdl> {
        // Search non-ep captures.
        for m in pos.capture_moves() {
            if m.is_en_passant() {
                continue;
            }

            let mut after = pos.clone();
            after.play_unchecked(&m);
            let v = -self.probe_ab_no_ep(&after, -beta, -alpha)?;

            if v > alpha {
                if v >= beta {
                    return Ok(v);
                }
                alpha = v;
            }
        }

        let v = self.probe_wdl_table(pos)?;
        Ok(max(alpha, v))
    }

    fn probe_wdl_table(&self, pos: &Chess) -> SyzygyResult<Wdl> {
        // Test for KvK.
        if pos.board().kings() == pos.board().occupied() {
            return Ok(Wdl::Draw);
        }

        let key = Material::from_board(pos.board()).normalized();
        let slot = self.wdl.get(&key).ok_or_else(|| SyzygyError::MissingTable {
            metric: Metric::Wdl,
            material: key.clone(),
        })?;

        let table: &WdlTable = slot.get(self.filesystem.as_ref(), &key)?;
        table.probe_wdl(pos).map_err(|error| slot.fail(error, &key))
    }

    fn probe_dtz_table(
        &self,
        pos: &Chess,
        wdl: DecisiveWdl,
    ) -> SyzygyResult<Option<MaybeRounded<u32>>> {
        let key = Material::from_board(pos.board()).normalized();
        let slot = self.dtz.get(&key).ok_or_else(|| SyzygyError::MissingTable {
            metric: Metric::Dtz,
            material: key.clone(),
        })?;

        let table: &DtzTable = slot.get(self.filesystem.as_ref(), &key)?;
        table.probe_dtz(pos, wdl).map_err(|error| slot.fail(error, &key))
    }
}

/// WDL value of a position, with enough information to continue with DTZ.
#[derive(Debug)]
struct WdlEntry<'a> {
    tablebase: &'a Tablebase,
    pos: &'a Chess,
    wdl: Wdl,
    state: ProbeState,
}

impl WdlEntry<'_> {
    fn dtz(&self) -> SyzygyResult<MaybeRounded<Dtz>> {
        let wdl = match self.wdl.decisive() {
            Some(wdl) => wdl,
            None => return Ok(MaybeRounded::Precise(Dtz(0))),
        };

        if self.state == ProbeState::ZeroingBestMove {
            return Ok(MaybeRounded::Precise(Dtz::before_zeroing(wdl)));
        }

        if wdl.signum() > 0 {
            // Winning pawn moves are zeroing.
            for m in self.pos.legal_moves() {
                if m.role() != Role::Pawn || m.is_capture() {
                    continue;
                }

                let mut after = self.pos.clone();
                after.play_unchecked(&m);
                let v = -self.tablebase.probe_wdl_after_zeroing(&after)?;

                if v == Wdl::from(wdl) {
                    return Ok(MaybeRounded::Precise(Dtz::before_zeroing(wdl)));
                }
            }
        }

        if let Some(plies) = self.tablebase.probe_dtz_table(self.pos, wdl)? {
            return Ok(plies.map(|plies| {
                Dtz::before_zeroing(wdl).add_plies(i32::try_from(plies).unwrap_or(i32::MAX))
            }));
        }

        // The table stores only the other side to move. Do a 1-ply search.
        // Losing positions start from the zeroing moves, which are not
        // searched.
        let mut best = if wdl.signum() < 0 {
            Some(MaybeRounded::Precise(Dtz::before_zeroing(wdl)))
        } else {
            None
        };

        for m in self.pos.legal_moves() {
            if m.is_zeroing() {
                continue;
            }

            let mut after = self.pos.clone();
            after.play_unchecked(&m);
            let v = -self.tablebase.probe_dtz(&after)?;

            if v.ignore_rounding() == Dtz(1) && after.is_checkmate() {
                best = Some(MaybeRounded::Precise(Dtz(1)));
            } else if v.ignore_rounding().signum() == wdl.signum() {
                let v = v.map(|v| v.add_plies(1));
                best = match best {
                    Some(best) if best.ignore_rounding() <= v.ignore_rounding() => Some(best),
                    _ => Some(v),
                };
            }
        }

        best.ok_or_else(|| {
            ProbeError::CorruptedTable {
                backtrace: Backtrace::capture(),
            }
            .ctx(Metric::Dtz, &Material::from_board(self.pos.board()).normalized())
        })
    }
}
