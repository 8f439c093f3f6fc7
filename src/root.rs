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

//! Ranking of root moves.
//!
//! Ranks and scores follow the conventions of engines that use Syzygy
//! tables at the root: certain wins share the highest rank, wins that may
//! run into the 50-move rule are ordered by distance, and losses are ranked
//! equally unless a 50-move draw is in sight.

use std::cmp::Reverse;

use arrayvec::ArrayVec;
use shakmaty::{Chess, Move, Position};

use crate::{
    errors::{ErrorKind, SyzygyError, SyzygyResult},
    material::Material,
    position::RawPosition,
    tablebase::Tablebase,
    types::{Dtz, Metric, Wdl},
};

/// Rank of a certain win. Ranks are within `-MAX_DTZ..=MAX_DTZ`.
pub const MAX_DTZ: i32 = 1 << 18;

/// Score of a mate in 0.
pub const TB_VALUE_MATE: i32 = 32000;

/// Longest mate distance that can be expressed in scores.
pub const TB_MAX_MATE_PLY: i32 = 255;

/// Score of a certain tablebase win. Below any real mate score.
pub const TB_WIN_SCORE: i32 = TB_VALUE_MATE - TB_MAX_MATE_PLY - 1;

const PAWN_VALUE: i32 = 100;

/// Rank for a move whose successor is not covered by the tables.
const UNKNOWN_RANK: i32 = i32::MIN;

const WDL_TO_RANK: [i32; 5] = [-MAX_DTZ, -MAX_DTZ + 101, 0, MAX_DTZ - 101, MAX_DTZ];

const WDL_TO_SCORE: [i32; 5] = [-TB_WIN_SCORE, -2, 0, 2, TB_WIN_SCORE];

/// A legal move of the root position, annotated with tablebase
/// information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMove {
    pub m: Move,
    /// Value after the move, from the point of view of the side to move at
    /// the root. `None` if the successor is not covered.
    pub wdl: Option<Wdl>,
    /// Distance to zeroing, counted from the root. `None` if not probed or
    /// not covered.
    pub dtz: Option<Dtz>,
    /// Preference, higher is better.
    pub rank: i32,
    /// Engine score in centipawns.
    pub score: i32,
    /// The successor already occurred in the game history.
    pub repeats: bool,
}

impl RootMove {
    fn unknown(m: Move) -> RootMove {
        RootMove {
            m,
            wdl: None,
            dtz: None,
            rank: UNKNOWN_RANK,
            score: 0,
            repeats: false,
        }
    }

    /// The move has a tablebase result.
    pub fn is_known(&self) -> bool {
        self.wdl.is_some()
    }
}

/// Root moves, best first.
pub type RootMoves = ArrayVec<RootMove, 256>;

/// Result of probing the best root move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootProbe {
    /// The side to move is checkmated.
    Checkmate,
    /// The side to move is stalemated.
    Stalemate,
    /// Best move with its annotations.
    Move(RootMove),
}

/// Why a principal variation ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LineEnd {
    /// The side to move is checkmated.
    Checkmate,
    /// The side to move is stalemated.
    Stalemate,
    /// The last move holds the draw.
    Draw,
    /// The position after the last move is not covered.
    OutOfCoverage,
    /// The requested number of plies was reached.
    MaxPlies,
}

/// A line of best moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalVariation {
    pub moves: Vec<Move>,
    pub end: LineEnd,
}

impl PrincipalVariation {
    /// Moves until the side to move at the root delivers mate, if the line
    /// ends in mate.
    pub fn mate_in(&self) -> Option<usize> {
        (self.end == LineEnd::Checkmate && self.moves.len() % 2 == 1)
            .then(|| (self.moves.len() + 1) / 2)
    }
}

/// Turns a position outside the tables into a sentinel. Other errors are
/// passed on.
fn covered<T>(result: SyzygyResult<T>) -> SyzygyResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.kind() == ErrorKind::PositionOutOfCoverage => {
            tracing::trace!(%error, "successor not covered");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

fn wdl_index(wdl: Wdl) -> usize {
    wdl.code() as usize
}

/// Converts a rank to an engine score. Ranks at or beyond `bound` are
/// certain results.
pub(crate) fn rank_to_score(rank: i32, bound: i32) -> i32 {
    if rank >= bound {
        TB_WIN_SCORE
    } else if rank > 0 {
        (rank - (MAX_DTZ - 200)).max(3) * PAWN_VALUE / 200
    } else if rank == 0 {
        0
    } else if rank > -bound {
        (rank + (MAX_DTZ - 200)).min(-3) * PAWN_VALUE / 200
    } else {
        -TB_WIN_SCORE
    }
}

/// Rank of a move with distance `dtz` from the root, where `cnt50` plies
/// have been played since the last zeroing move.
pub(crate) fn dtz_rank(dtz: i32, cnt50: i32, has_repeated: bool) -> i32 {
    if dtz > 0 {
        if dtz + cnt50 <= 99 && !has_repeated {
            MAX_DTZ
        } else {
            MAX_DTZ - (dtz + cnt50)
        }
    } else if dtz < 0 {
        if -dtz * 2 + cnt50 < 100 {
            -MAX_DTZ
        } else {
            -MAX_DTZ + (-dtz + cnt50)
        }
    } else {
        0
    }
}

fn same_position(a: &Chess, b: &Chess) -> bool {
    RawPosition::from(a).is_repetition_of(&RawPosition::from(b))
}

/// Positions since the last zeroing move, ending with `root`.
fn reversible_line<'a>(history: &'a [Chess], root: &'a Chess) -> Vec<&'a Chess> {
    let plies = usize::try_from(root.halfmoves()).unwrap_or(usize::MAX);
    let start = history.len().saturating_sub(plies);
    history[start..].iter().chain(Some(root)).collect()
}

/// Any position since the last zeroing move occurred before.
fn has_repeated(line: &[&Chess]) -> bool {
    line.iter()
        .enumerate()
        .any(|(i, pos)| line[..i].iter().any(|prev| same_position(pos, prev)))
}

fn sort(moves: &mut RootMoves) {
    // Stable, so that equally ranked moves stay in move generation order.
    moves.sort_by(|a, b| b.rank.cmp(&a.rank));
}

impl Tablebase {
    fn root_material(pos: &Chess) -> Material {
        Material::from_board(pos.board()).normalized()
    }

    /// Value of a successor from the point of view of the side that just
    /// moved.
    fn root_child_wdl(&self, after: &Chess, use_rule50: bool) -> SyzygyResult<Wdl> {
        if !use_rule50 {
            return self.probe_wdl_after_zeroing(after).map(|wdl| -wdl);
        }

        match self.probe_wdl(after) {
            Err(SyzygyError::MissingTable {
                metric: Metric::Dtz,
                ..
            }) => self.probe_wdl_after_zeroing(after),
            result => result,
        }
        .map(|wdl| -wdl)
    }

    /// Ranks all legal moves of `pos` using WDL tables only.
    ///
    /// With `use_rule50` the half-move clock of each successor is taken into
    /// account, otherwise cursed wins and blessed losses count as wins and
    /// losses.
    ///
    /// # Errors
    ///
    /// Fails if `pos` itself is not covered, or if a table is corrupted.
    /// Successors outside the tables are kept with a `None` result.
    pub fn rank_root_moves_wdl(&self, pos: &Chess, use_rule50: bool) -> SyzygyResult<RootMoves> {
        self.probe_wdl_after_zeroing(pos)?;

        let mut moves = RootMoves::new();

        for m in pos.legal_moves() {
            let mut after = pos.clone();
            after.play_unchecked(&m);

            let root_move = match covered(self.root_child_wdl(&after, use_rule50))? {
                Some(wdl) => {
                    let wdl = if use_rule50 { wdl } else { wdl.unwrap_rule50() };
                    RootMove {
                        m,
                        wdl: Some(wdl),
                        dtz: None,
                        rank: WDL_TO_RANK[wdl_index(wdl)],
                        score: WDL_TO_SCORE[wdl_index(wdl)],
                        repeats: false,
                    }
                }
                None => RootMove::unknown(m),
            };

            moves.push(root_move);
        }

        sort(&mut moves);
        tracing::trace!(material = %Tablebase::root_material(pos), moves = moves.len(), "ranked root moves by wdl");
        Ok(moves)
    }

    /// Distance to zeroing after playing `m`, counted from the root.
    fn root_child_dtz(&self, m: &Move, after: &Chess) -> SyzygyResult<i32> {
        let dtz = if m.is_zeroing() {
            // In case of a zeroing move, dtz is one of -101/-1/0/1/101.
            Dtz::before_zeroing(-self.probe_wdl_after_zeroing(after)?).0
        } else {
            // Otherwise, take dtz for the new position and correct by 1 ply.
            let dtz = -i32::from(self.probe_dtz(after)?.ignore_rounding());
            dtz + dtz.signum()
        };

        // Make sure that a mating move is assigned a dtz value of 1.
        Ok(if dtz == 2 && after.is_checkmate() { 1 } else { dtz })
    }

    /// Ranks all legal moves of `pos` using DTZ tables.
    ///
    /// `has_repeated` indicates that a position since the last zeroing move
    /// already occurred, so that winning moves are ordered by distance to
    /// force progress.
    ///
    /// # Errors
    ///
    /// Fails if `pos` itself is not covered, or if a table is corrupted.
    /// Successors outside the tables are kept with a `None` result.
    pub fn rank_root_moves_dtz(
        &self,
        pos: &Chess,
        has_repeated: bool,
        use_rule50: bool,
    ) -> SyzygyResult<RootMoves> {
        self.probe_wdl_after_zeroing(pos)?;

        let cnt50 = i32::try_from(pos.halfmoves()).unwrap_or(i32::MAX).min(MAX_DTZ);
        let bound = if use_rule50 { MAX_DTZ - 100 } else { 1 };

        let mut moves = RootMoves::new();

        for m in pos.legal_moves() {
            let mut after = pos.clone();
            after.play_unchecked(&m);

            let root_move = match covered(self.root_child_dtz(&m, &after))? {
                Some(dtz) => {
                    let rank = dtz_rank(dtz, cnt50, has_repeated);
                    let dtz = Dtz(dtz);
                    RootMove {
                        m,
                        wdl: Some(if use_rule50 {
                            Wdl::from_dtz_after_halfmoves(dtz, pos.halfmoves())
                        } else {
                            Wdl::from(dtz).unwrap_rule50()
                        }),
                        dtz: Some(if use_rule50 { dtz } else { dtz.unwrap_rule50() }),
                        rank,
                        score: rank_to_score(rank, bound),
                        repeats: false,
                    }
                }
                None => RootMove::unknown(m),
            };

            moves.push(root_move);
        }

        sort(&mut moves);
        tracing::trace!(material = %Tablebase::root_material(pos), moves = moves.len(), has_repeated, "ranked root moves by dtz");
        Ok(moves)
    }

    /// Ranks all legal moves of `pos` using DTZ tables, taking repetitions
    /// in the game `history` into account.
    ///
    /// `history` holds the positions before `pos`, oldest first. If the
    /// root is won and a position since the last zeroing move repeated,
    /// winning moves that return to an earlier position are ranked below
    /// all other winning moves, but above draws.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::rank_root_moves_dtz()`].
    pub fn rank_root_moves_dtz_with_history(
        &self,
        pos: &Chess,
        history: &[Chess],
        use_rule50: bool,
    ) -> SyzygyResult<RootMoves> {
        let line = reversible_line(history, pos);
        let repeated = has_repeated(&line);
        let root_won = self.probe_wdl_after_zeroing(pos)? > Wdl::Draw;

        let mut moves = self.rank_root_moves_dtz(pos, repeated, use_rule50)?;

        for root_move in &mut moves {
            let mut after = pos.clone();
            after.play_unchecked(&root_move.m);
            root_move.repeats = !root_move.m.is_zeroing()
                && line.iter().any(|prev| same_position(&after, prev));

            if root_won && repeated && root_move.repeats && root_move.rank > 0 {
                root_move.rank = 1;
            }
        }

        sort(&mut moves);
        Ok(moves)
    }

    /// Finds the best move at the root, preferring the fastest progress
    /// under the 50-move rule.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::rank_root_moves_dtz()`]. Additionally fails with
    /// [`SyzygyError::MissingTable`] if no legal move has a result.
    pub fn best_move(&self, pos: &Chess) -> SyzygyResult<RootProbe> {
        if pos.is_checkmate() {
            return Ok(RootProbe::Checkmate);
        }
        if pos.is_stalemate() {
            return Ok(RootProbe::Stalemate);
        }

        let moves = self.rank_root_moves_dtz(pos, false, true)?;
        moves
            .into_iter()
            .filter(RootMove::is_known)
            .min_by_key(|m| (Reverse(m.rank), m.dtz))
            .map(RootProbe::Move)
            .ok_or_else(|| SyzygyError::MissingTable {
                metric: Metric::Dtz,
                material: Tablebase::root_material(pos),
            })
    }

    /// Follows best moves from `pos` for at most `max_plies` plies.
    ///
    /// The line ends at a checkmate or stalemate, after a drawing move, or
    /// when a position is no longer covered by the tables.
    ///
    /// # Errors
    ///
    /// See [`Tablebase::best_move()`] for the root. Later positions only
    /// fail if a table is corrupted.
    pub fn principal_variation(
        &self,
        pos: &Chess,
        max_plies: usize,
    ) -> SyzygyResult<PrincipalVariation> {
        let mut pos = pos.clone();
        let mut moves = Vec::new();

        let end = loop {
            if moves.len() >= max_plies {
                break LineEnd::MaxPlies;
            }

            let probe = if moves.is_empty() {
                self.best_move(&pos)?
            } else {
                match covered(self.best_move(&pos))? {
                    Some(probe) => probe,
                    None => break LineEnd::OutOfCoverage,
                }
            };

            let best = match probe {
                RootProbe::Checkmate => break LineEnd::Checkmate,
                RootProbe::Stalemate => break LineEnd::Stalemate,
                RootProbe::Move(best) => best,
            };

            pos.play_unchecked(&best.m);
            moves.push(best.m);

            if best.wdl == Some(Wdl::Draw) {
                break LineEnd::Draw;
            }
        };

        tracing::trace!(plies = moves.len(), ?end, "followed principal variation");
        Ok(PrincipalVariation { moves, end })
    }
}
