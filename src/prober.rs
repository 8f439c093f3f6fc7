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

use std::{
    env,
    ffi::OsStr,
    fmt, io,
    path::PathBuf,
    sync::Arc,
};

use shakmaty::Chess;

use crate::{
    errors::{SyzygyError, SyzygyResult},
    filesystem::{Filesystem, OsFilesystem},
    position::RawPosition,
    root::{PrincipalVariation, RootMoves, RootProbe},
    tablebase::Tablebase,
    types::{Dtz, MaybeRounded, Wdl, MAX_PIECES},
};

#[derive(Debug)]
enum State {
    Uninitialized,
    Ready(Tablebase),
}

/// Owned handle to a set of tables, with an explicit lifecycle.
///
/// A new prober is uninitialized. [`Prober::init()`] registers the tables
/// of one or more directories and makes the prober ready.
/// [`Prober::free()`] releases them again. Probing an uninitialized prober
/// fails with [`SyzygyError::NotInitialized`].
///
/// Lifecycle changes need `&mut self`, while probes only need `&self`, so a
/// ready prober can be shared between threads.
///
/// # Example
///
/// ```no_run
/// use syzygy_probe::{Prober, RawPosition, Wdl};
///
/// let mut prober = Prober::new();
/// prober.init("tables/chess")?;
///
/// let pos = RawPosition {
///     white: 0x0000_0000_0000_0003, // Ka1, Rb1
///     black: 0x0000_0000_0004_0000, // kc3
///     kings: 0x0000_0000_0004_0001,
///     rooks: 0x0000_0000_0000_0002,
///     turn: true,
///     ..RawPosition::default()
/// };
///
/// assert_eq!(prober.probe_wdl(&pos)?, Wdl::Win);
/// # Ok::<_, syzygy_probe::SyzygyError>(())
/// ```
pub struct Prober {
    filesystem: Arc<dyn Filesystem>,
    state: State,
    probe_limit: usize,
}

impl fmt::Debug for Prober {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prober")
            .field("state", &self.state)
            .field("probe_limit", &self.probe_limit)
            .finish_non_exhaustive()
    }
}

impl Default for Prober {
    fn default() -> Prober {
        Prober::new()
    }
}

impl Prober {
    /// Creates an uninitialized prober that reads tables from the operating
    /// system's filesystem.
    pub fn new() -> Prober {
        Prober::with_filesystem(Arc::new(OsFilesystem))
    }

    /// Creates an uninitialized prober that reads tables through a custom
    /// filesystem.
    pub fn with_filesystem(filesystem: Arc<dyn Filesystem>) -> Prober {
        Prober {
            filesystem,
            state: State::Uninitialized,
            probe_limit: MAX_PIECES,
        }
    }

    /// Registers all tables found in `path`, which may list several
    /// directories separated like the `PATH` environment variable.
    ///
    /// Returns the number of registered tables.
    ///
    /// # Errors
    ///
    /// * [`SyzygyError::AlreadyInitialized`] if the prober is ready.
    /// * [`SyzygyError::InitFailed`] if none of the directories could be
    ///   read.
    /// * [`SyzygyError::NoTables`] if no usable table was found.
    ///
    /// The prober stays uninitialized on error.
    pub fn init<P: AsRef<OsStr>>(&mut self, path: P) -> SyzygyResult<usize> {
        if self.is_ready() {
            return Err(SyzygyError::AlreadyInitialized);
        }

        let path = path.as_ref();
        let mut tables = Tablebase::with_filesystem(Arc::clone(&self.filesystem));
        let mut readable = false;
        let mut last_error = None;

        for dir in env::split_paths(path) {
            if dir.as_os_str().is_empty() {
                continue;
            }

            match tables.add_directory(&dir) {
                Ok(num) => {
                    tracing::debug!(?dir, num, "scanned directory");
                    readable = true;
                }
                Err(error) => {
                    tracing::debug!(?dir, %error, "cannot read directory");
                    last_error = Some((dir, error));
                }
            }
        }

        if !readable {
            let (path, error) = last_error.unwrap_or_else(|| {
                (
                    PathBuf::from(path),
                    io::Error::new(io::ErrorKind::NotFound, "no directory given"),
                )
            });
            return Err(SyzygyError::InitFailed { path, error });
        }

        let num = tables.num_tables();
        if num == 0 {
            return Err(SyzygyError::NoTables {
                path: PathBuf::from(path),
            });
        }

        tracing::info!(
            tables = num,
            max_pieces = tables.max_pieces(),
            "initialized tablebase"
        );

        self.state = State::Ready(tables);
        Ok(num)
    }

    /// Releases all tables. Freeing an uninitialized prober does nothing.
    pub fn free(&mut self) {
        if let State::Ready(tables) = std::mem::replace(&mut self.state, State::Uninitialized) {
            tracing::info!(tables = tables.num_tables(), "freed tablebase");
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Maximum number of pieces of the registered tables, capped by the
    /// probe limit. 0 if not ready.
    pub fn largest_table_size(&self) -> usize {
        match self.state {
            State::Ready(ref tables) => tables.max_pieces().min(self.probe_limit),
            State::Uninitialized => 0,
        }
    }

    /// Treats positions with more than `limit` pieces as not covered.
    pub fn set_probe_limit(&mut self, limit: usize) {
        self.probe_limit = limit;
    }

    /// The underlying tables, if ready.
    pub fn tablebase(&self) -> Option<&Tablebase> {
        match self.state {
            State::Ready(ref tables) => Some(tables),
            State::Uninitialized => None,
        }
    }

    fn prepare(&self, pos: &RawPosition) -> SyzygyResult<(&Tablebase, Chess)> {
        let tables = self.tablebase().ok_or(SyzygyError::NotInitialized)?;
        let chess = pos.to_chess()?;
        if pos.piece_count() > self.probe_limit {
            return Err(SyzygyError::TooManyPieces);
        }
        Ok((tables, chess))
    }

    /// Probes the WDL value of `pos`, taking its half-move clock into
    /// account.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`].
    pub fn probe_wdl(&self, pos: &RawPosition) -> SyzygyResult<Wdl> {
        let (tables, chess) = self.prepare(pos)?;
        tables.probe_wdl(&chess)
    }

    /// Like [`Prober::probe_wdl()`], but returns the numeric code from
    /// `Loss = 0` to `Win = 4`.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`].
    pub fn probe_wdl_code(&self, pos: &RawPosition) -> SyzygyResult<u32> {
        self.probe_wdl(pos).map(Wdl::code)
    }

    /// Probes the DTZ value of `pos`.
    ///
    /// Without `use_rule50`, cursed wins and blessed losses are reported as
    /// plain wins and losses.
    ///
    /// # Errors
    ///
    /// See [`SyzygyError`].
    pub fn probe_dtz(&self, pos: &RawPosition, use_rule50: bool) -> SyzygyResult<MaybeRounded<Dtz>> {
        let (tables, chess) = self.prepare(pos)?;
        let dtz = tables.probe_dtz(&chess)?;
        Ok(if use_rule50 {
            dtz
        } else {
            dtz.map(Dtz::unwrap_rule50)
        })
    }

    /// Ranks the legal moves of `pos` by WDL.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::rank_root_moves_wdl()`].
    pub fn probe_root_wdl(&self, pos: &RawPosition, use_rule50: bool) -> SyzygyResult<RootMoves> {
        let (tables, chess) = self.prepare(pos)?;
        tables.rank_root_moves_wdl(&chess, use_rule50)
    }

    /// Ranks the legal moves of `pos` by DTZ.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::rank_root_moves_dtz()`].
    pub fn probe_root_dtz(
        &self,
        pos: &RawPosition,
        has_repeated: bool,
        use_rule50: bool,
    ) -> SyzygyResult<RootMoves> {
        let (tables, chess) = self.prepare(pos)?;
        tables.rank_root_moves_dtz(&chess, has_repeated, use_rule50)
    }

    /// Ranks the legal moves of `pos` by DTZ, deriving repetitions from the
    /// positions of the game before `pos`, oldest first.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::rank_root_moves_dtz_with_history()`]. Fails with
    /// [`SyzygyError::InvalidPosition`] if a history position is invalid.
    pub fn probe_root_dtz_with_history(
        &self,
        pos: &RawPosition,
        history: &[RawPosition],
        use_rule50: bool,
    ) -> SyzygyResult<RootMoves> {
        let (tables, chess) = self.prepare(pos)?;
        let history = history
            .iter()
            .map(RawPosition::to_chess)
            .collect::<Result<Vec<_>, _>>()?;
        tables.rank_root_moves_dtz_with_history(&chess, &history, use_rule50)
    }

    /// Finds the best move of `pos`.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::best_move()`].
    pub fn best_move(&self, pos: &RawPosition) -> SyzygyResult<RootProbe> {
        let (tables, chess) = self.prepare(pos)?;
        tables.best_move(&chess)
    }

    /// Follows best moves from `pos` for at most `max_plies` plies.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::principal_variation()`].
    pub fn principal_variation(
        &self,
        pos: &RawPosition,
        max_plies: usize,
    ) -> SyzygyResult<PrincipalVariation> {
        let (tables, chess) = self.prepare(pos)?;
        tables.principal_variation(&chess, max_plies)
    }
}
