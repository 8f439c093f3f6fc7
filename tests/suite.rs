mod common;

use std::{env, thread};

use common::{
    chess, krk_dir, krk_dtz, krk_wdl, krk_wdl_compressed, krk_wdl_split, raw, write_table, DRAW,
    LOSS, WIN,
};
use shakmaty::{fen::Fen, Position, Square};
use syzygy_probe::{
    result::{decode_root, encode_root, RootCode},
    Dtz, ErrorKind, LineEnd, MaybeRounded, Metric, Prober, RawPosition, RootProbe, SyzygyError,
    Tablebase, Wdl, CASTLE_WHITE_QUEENSIDE, MAX_DTZ, TB_WIN_SCORE,
};

fn ready(dir: &tempfile::TempDir) -> Prober {
    let mut prober = Prober::new();
    prober.init(dir.path()).expect("init");
    prober
}

#[test]
fn test_csv() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let mut reader = csv::Reader::from_path("tests/krk.csv").expect("reader");

    for line in reader.records() {
        let record = line.expect("record");

        let fen: Fen = record
            .get(0)
            .expect("fen field")
            .parse()
            .expect("valid fen");

        let expected_wdl: i8 = record
            .get(1)
            .expect("wdl field")
            .parse()
            .expect("valid wdl");

        let expected_dtz: i32 = record
            .get(2)
            .expect("dtz field")
            .parse()
            .expect("valid dtz");

        let pos = raw(&fen.to_string());

        println!("{fen} | wdl: {expected_wdl} | dtz: {expected_dtz}");

        let wdl = prober.probe_wdl(&pos).expect("probe wdl");
        assert_eq!(i8::from(wdl), expected_wdl);

        let dtz = prober.probe_dtz(&pos, true).expect("probe dtz");
        assert_eq!(i32::from(dtz.ignore_rounding()), expected_dtz);
    }
}

#[test]
fn test_rule50() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
    for (rule50, expected) in [
        (0, Wdl::Win),
        (99, Wdl::Win),
        (100, Wdl::CursedWin),
        (u32::MAX, Wdl::CursedWin),
    ] {
        pos.rule50 = rule50;
        assert_eq!(prober.probe_wdl(&pos).unwrap(), expected, "rule50 = {rule50}");
    }

    // Black needs 2 plies to reach the zeroing capture.
    let mut pos = raw("8/8/8/8/8/2k5/8/KR6 b - - 0 1");
    pos.rule50 = 98;
    assert_eq!(prober.probe_wdl(&pos).unwrap(), Wdl::Loss);
    pos.rule50 = 99;
    assert_eq!(prober.probe_wdl(&pos).unwrap(), Wdl::BlessedLoss);

    // The clock does not matter after zeroing.
    let chess = chess("8/8/8/8/8/2k5/8/KR6 b - - 99 80");
    let tables = prober.tablebase().unwrap();
    assert_eq!(tables.probe_wdl_after_zeroing(&chess).unwrap(), Wdl::Loss);
}

#[test]
fn test_dtz_rounding() {
    let dir = krk_dir();
    let prober = ready(&dir);

    assert_eq!(
        prober
            .probe_dtz(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"), true)
            .unwrap(),
        MaybeRounded::Rounded(Dtz(1))
    );
    assert_eq!(
        prober
            .probe_dtz(&raw("8/8/8/8/8/2k5/8/KR6 b - - 0 1"), false)
            .unwrap(),
        MaybeRounded::Rounded(Dtz(-2))
    );

    // The zeroing capture is exact.
    let wdl_only = tempfile::tempdir().unwrap();
    write_table(wdl_only.path(), "KRvK.rtbw", &krk_wdl(WIN, LOSS));
    let prober = ready(&wdl_only);
    assert_eq!(
        prober
            .probe_dtz(&raw("8/8/8/8/8/1k6/2R5/K7 b - - 0 1"), true)
            .unwrap(),
        MaybeRounded::Precise(Dtz(0))
    );
    assert!(matches!(
        prober.probe_dtz(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"), true),
        Err(SyzygyError::MissingTable {
            metric: Metric::Dtz,
            ..
        })
    ));
}

#[test]
fn test_dtz_other_side() {
    // DTZ table that stores black to move only.
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "KRvK.rtbw", &krk_wdl(WIN, LOSS));
    write_table(dir.path(), "KRvK.rtbz", &krk_dtz(1));
    let prober = ready(&dir);

    assert_eq!(
        prober
            .probe_dtz(&raw("8/8/8/8/8/2k5/8/KR6 b - - 0 1"), true)
            .unwrap(),
        MaybeRounded::Rounded(Dtz(-1))
    );

    // White to move is resolved by a 1-ply search.
    assert_eq!(
        prober
            .probe_dtz(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"), true)
            .unwrap(),
        MaybeRounded::Rounded(Dtz(2))
    );

    // Unless there is a mate.
    assert_eq!(
        prober
            .probe_dtz(&raw("k7/8/1K6/8/8/8/8/7R w - - 0 1"), true)
            .unwrap(),
        MaybeRounded::Precise(Dtz(1))
    );
}

#[test]
fn test_compressed() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "KRvK.rtbw", &krk_wdl_compressed(WIN, LOSS));
    let prober = ready(&dir);

    for fen in [
        "8/8/8/8/8/2k5/8/KR6 w - - 0 1",
        "8/8/8/3k4/8/8/6R1/7K w - - 0 1",
        "7k/8/8/8/8/8/1R6/K7 w - - 0 1",
        "4k3/8/8/8/8/8/8/R3K3 w - - 0 1",
        "R7/8/8/8/8/8/1k6/3K4 w - - 0 1",
        "K7/8/8/8/8/8/7k/R7 w - - 0 1",
    ] {
        let pos = raw(fen);
        assert_eq!(prober.probe_wdl(&pos).unwrap(), Wdl::Win, "{fen}");
        assert_eq!(prober.probe_wdl(&pos.mirrored()).unwrap(), Wdl::Win, "{fen}");
    }

    assert_eq!(
        prober
            .probe_wdl(&raw("8/8/8/8/8/2k5/8/KR6 b - - 0 1"))
            .unwrap(),
        Wdl::Loss
    );
}

#[test]
fn test_compressed_block_boundary() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), "KRvK.rtbw", &krk_wdl_split(1089, WIN, DRAW, LOSS));
    let prober = ready(&dir);

    for (fen, expected) in [
        // Index 1087.
        ("8/8/8/3k4/8/2R5/8/1K6 w - - 0 1", Wdl::Win),
        // Index 1088, the last value of the first block, in two symmetries.
        ("8/8/8/4k3/8/2R5/8/1K6 w - - 0 1", Wdl::Win),
        ("6K1/8/5R2/8/3k4/8/8/8 w - - 0 1", Wdl::Win),
        ("8/8/8/3k4/8/5R2/8/6K1 w - - 0 1", Wdl::Win),
        // Index 1089, the first value of the second block.
        ("8/8/8/5k2/8/2R5/8/1K6 w - - 0 1", Wdl::Draw),
        ("8/8/8/2k5/8/5R2/8/6K1 w - - 0 1", Wdl::Draw),
        // Index 23444.
        ("8/8/8/8/8/8/2k5/KR6 w - - 0 1", Wdl::Draw),
        ("8/8/8/4k3/8/2R5/8/1K6 b - - 0 1", Wdl::Loss),
    ] {
        let pos = raw(fen);
        assert_eq!(prober.probe_wdl(&pos).unwrap(), expected, "{fen}");
        assert_eq!(prober.probe_wdl(&pos.mirrored()).unwrap(), expected, "{fen}");
    }
}

#[test]
fn test_mirror() {
    let dir = krk_dir();
    let prober = ready(&dir);

    for fen in [
        "8/8/8/8/8/2k5/8/KR6 w - - 0 1",
        "8/8/8/8/8/2k5/8/KR6 b - - 0 1",
        "8/8/8/8/8/1k6/2R5/K7 b - - 0 1",
    ] {
        let pos = raw(fen);
        assert_eq!(
            prober.probe_wdl(&pos).unwrap(),
            prober.probe_wdl(&pos.mirrored()).unwrap(),
            "{fen}"
        );
        assert_eq!(
            prober.probe_dtz(&pos, true).unwrap(),
            prober.probe_dtz(&pos.mirrored(), true).unwrap(),
            "{fen}"
        );
    }
}

#[test]
fn test_root_wdl() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let moves = prober
        .probe_root_wdl(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"), true)
        .unwrap();
    assert_eq!(moves.len(), 14);
    assert!(moves.windows(2).all(|w| w[0].rank >= w[1].rank));

    // Rb3 and Rb4 hang the rook.
    let (wins, draws) = moves.split_at(12);
    assert!(wins
        .iter()
        .all(|m| m.wdl == Some(Wdl::Win) && m.rank == MAX_DTZ && m.score == TB_WIN_SCORE));
    assert!(draws
        .iter()
        .all(|m| m.wdl == Some(Wdl::Draw) && m.rank == 0 && m.score == 0));
    let mut hanging: Vec<Square> = draws.iter().map(|m| m.m.to()).collect();
    hanging.sort();
    assert_eq!(hanging, [Square::B3, Square::B4]);
}

#[test]
fn test_root_wdl_matches_successors() {
    let dir = krk_dir();
    let prober = ready(&dir);

    for fen in [
        "8/8/8/8/8/2k5/8/KR6 w - - 0 1",
        "8/8/8/8/8/2k5/8/KR6 w - - 97 80",
        "8/8/8/8/8/1k6/2R5/K7 b - - 0 1",
        "8/8/8/3k4/8/2R5/8/1K6 b - - 12 30",
    ] {
        let pos = chess(fen);
        let moves = prober
            .probe_root_wdl(&RawPosition::from(&pos), true)
            .unwrap();
        assert_eq!(moves.len(), pos.legal_moves().len(), "{fen}");

        for root_move in &moves {
            let mut after = pos.clone();
            after.play_unchecked(&root_move.m);
            let wdl = prober.probe_wdl(&RawPosition::from(&after)).unwrap();
            assert_eq!(root_move.wdl, Some(-wdl), "{fen} {:?}", root_move.m);
        }
    }
}

#[test]
fn test_root_dtz() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
    let moves = prober.probe_root_dtz(&pos, false, true).unwrap();
    assert_eq!(moves.len(), 14);
    assert_eq!(moves[0].dtz, Some(Dtz(3)));
    assert_eq!(moves[0].rank, MAX_DTZ);
    assert_eq!(moves[13].dtz, Some(Dtz(0)));
    assert_eq!(moves[13].rank, 0);

    // A repetition orders wins by distance.
    let moves = prober.probe_root_dtz(&pos, true, true).unwrap();
    assert_eq!(moves[0].rank, MAX_DTZ - 3);

    // Close to the 50-move rule.
    pos.rule50 = 97;
    let moves = prober.probe_root_dtz(&pos, false, true).unwrap();
    assert_eq!(moves[0].rank, MAX_DTZ - 100);
    assert_eq!(moves[0].wdl, Some(Wdl::Win));
    assert_eq!(moves[0].score, TB_WIN_SCORE);

    pos.rule50 = 98;
    let moves = prober.probe_root_dtz(&pos, false, true).unwrap();
    assert_eq!(moves[0].rank, MAX_DTZ - 101);
    assert_eq!(moves[0].wdl, Some(Wdl::CursedWin));
    assert!(moves[0].score > 0 && moves[0].score < TB_WIN_SCORE);

    // Without the 50-move rule every win is certain.
    let moves = prober.probe_root_dtz(&pos, false, false).unwrap();
    assert_eq!(moves[0].wdl, Some(Wdl::Win));
    assert_eq!(moves[0].score, TB_WIN_SCORE);
}

#[test]
fn test_root_mate() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let moves = prober
        .probe_root_dtz(&raw("k7/8/1K6/8/8/8/8/7R w - - 0 1"), true, true)
        .unwrap();
    assert_eq!(moves[0].m.to(), Square::H8);
    assert_eq!(moves[0].dtz, Some(Dtz(1)));
    assert_eq!(moves[0].rank, MAX_DTZ - 1);
}

#[test]
fn test_root_history() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let history = [
        raw("8/8/8/8/8/2k5/8/KR6 w - - 4 10"),
        raw("8/8/8/8/8/2k5/8/K6R b - - 5 10"),
        raw("8/8/8/8/2k5/8/8/K6R w - - 6 11"),
        raw("8/8/8/8/2k5/8/8/KR6 b - - 7 11"),
    ];
    let pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 8 12");

    let moves = prober
        .probe_root_dtz_with_history(&pos, &history, true)
        .unwrap();
    assert_eq!(moves.len(), 14);

    // Rh1 repeats. It is still better than a draw.
    assert!(moves[..11].iter().all(|m| !m.repeats && m.rank == MAX_DTZ - 11));
    assert_eq!(moves[11].m.to(), Square::H1);
    assert!(moves[11].repeats);
    assert_eq!(moves[11].rank, 1);
    assert!(moves[12..].iter().all(|m| m.rank == 0));

    // Without a repetition so far, nothing is demoted.
    let moves = prober
        .probe_root_dtz_with_history(&pos, &history[1..3], true)
        .unwrap();
    assert!(moves[..12].iter().all(|m| m.rank == MAX_DTZ));
}

#[test]
fn test_best_move() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let best = prober
        .best_move(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"))
        .unwrap();
    let code = encode_root(&best);
    match decode_root(code) {
        Some(RootCode::Move { wdl, dtz, .. }) => {
            assert_eq!(wdl, Wdl::Win);
            assert_eq!(dtz, 3);
        }
        other => panic!("unexpected {other:?}"),
    }

    // All wins share the top rank. The mate zeroes fastest.
    match prober
        .best_move(&raw("k7/8/1K6/8/8/8/8/7R w - - 0 1"))
        .unwrap()
    {
        RootProbe::Move(best) => {
            assert_eq!(best.m.to(), Square::H8);
            assert_eq!(best.dtz, Some(Dtz(1)));
            assert_eq!(best.rank, MAX_DTZ);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(
        prober
            .best_move(&raw("k6R/8/1K6/8/8/8/8/8 b - - 0 1"))
            .unwrap(),
        RootProbe::Checkmate
    );
    assert_eq!(
        prober
            .best_move(&raw("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1"))
            .unwrap(),
        RootProbe::Stalemate
    );
}

#[test]
fn test_principal_variation() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let pv = prober
        .principal_variation(&raw("k7/8/1K6/8/8/8/8/7R w - - 0 1"), 10)
        .unwrap();
    assert_eq!(pv.moves.len(), 1);
    assert_eq!(pv.moves[0].to(), Square::H8);
    assert_eq!(pv.end, LineEnd::Checkmate);
    assert_eq!(pv.mate_in(), Some(1));

    // Winning moves are followed, never the ones that hang the rook.
    let root = chess("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
    let pv = prober
        .principal_variation(&RawPosition::from(&root), 6)
        .unwrap();
    let mut pos = root;
    for m in &pv.moves {
        assert!(pos.is_legal(m), "{m:?}");
        pos.play_unchecked(m);
        assert_eq!(pos.board().rooks().count(), 1);
    }
    match pv.end {
        LineEnd::MaxPlies => assert_eq!(pv.moves.len(), 6),
        LineEnd::Checkmate => assert!(pos.is_checkmate()),
        end => panic!("unexpected end {end:?}"),
    }

    // Taking the rook holds the draw.
    let pv = prober
        .principal_variation(&raw("8/8/8/8/8/1k6/2R5/K7 b - - 0 1"), 10)
        .unwrap();
    assert_eq!(pv.moves.len(), 1);
    assert_eq!(pv.moves[0].to(), Square::C2);
    assert_eq!(pv.end, LineEnd::Draw);
    assert_eq!(pv.mate_in(), None);

    let pv = prober
        .principal_variation(&raw("k6R/8/1K6/8/8/8/8/8 b - - 0 1"), 10)
        .unwrap();
    assert!(pv.moves.is_empty());
    assert_eq!(pv.end, LineEnd::Checkmate);
    assert_eq!(pv.mate_in(), None);

    let pv = prober
        .principal_variation(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"), 0)
        .unwrap();
    assert!(pv.moves.is_empty());
    assert_eq!(pv.end, LineEnd::MaxPlies);
}

#[test]
fn test_lifecycle() {
    let dir = krk_dir();
    let pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");

    let mut prober = Prober::new();
    assert_eq!(
        prober.probe_wdl(&pos).unwrap_err().kind(),
        ErrorKind::NotInitialized
    );

    assert_eq!(prober.init(dir.path()).unwrap(), 2);
    assert!(prober.is_ready());
    assert_eq!(prober.largest_table_size(), 3);
    assert_eq!(prober.probe_wdl_code(&pos).unwrap(), 4);

    // No reopen while ready.
    assert!(matches!(
        prober.init(dir.path()),
        Err(SyzygyError::AlreadyInitialized)
    ));
    assert!(prober.is_ready());

    prober.free();
    assert!(!prober.is_ready());
    assert_eq!(prober.largest_table_size(), 0);
    assert_eq!(
        prober.probe_dtz(&pos, true).unwrap_err().kind(),
        ErrorKind::NotInitialized
    );
    prober.free();

    // Reinitialize with a probe limit.
    assert_eq!(prober.init(dir.path()).unwrap(), 2);
    prober.set_probe_limit(2);
    assert_eq!(prober.largest_table_size(), 2);
    assert!(matches!(
        prober.probe_wdl(&pos),
        Err(SyzygyError::TooManyPieces)
    ));
}

#[test]
fn test_init_path_list() {
    let first = krk_dir();
    let second = tempfile::tempdir().unwrap();
    write_table(second.path(), "KQvK.rtbw", &krk_wdl(WIN, LOSS));
    write_table(second.path(), "KQvK.txt", &krk_wdl(WIN, LOSS));

    let path = env::join_paths([
        first.path().to_owned(),
        first.path().join("missing"),
        second.path().to_owned(),
    ])
    .unwrap();

    let mut prober = Prober::new();
    assert_eq!(prober.init(&path).unwrap(), 3);
}

#[test]
fn test_out_of_coverage() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let castling = raw("8/8/8/8/8/2k5/8/R3K3 w Q - 0 1");
    assert_eq!(castling.castling, CASTLE_WHITE_QUEENSIDE);
    assert!(matches!(
        prober.probe_wdl(&castling),
        Err(SyzygyError::Castling)
    ));

    let err = prober
        .probe_wdl(&raw("8/8/8/3k4/8/8/8/Q3K3 w - - 0 1"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PositionOutOfCoverage);

    let err = prober
        .probe_wdl(&raw("8/8/8/3k4/8/8/8/QR2K3 w - - 0 1"))
        .unwrap_err();
    assert!(matches!(err, SyzygyError::TooManyPieces));

    // The root must be covered, even if all successors are.
    let err = prober
        .probe_root_wdl(&raw("8/8/8/3k4/8/8/8/Q3K3 w - - 0 1"), true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PositionOutOfCoverage);
}

#[test]
fn test_invalid_position() {
    let dir = krk_dir();
    let prober = ready(&dir);

    let mut pos = raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
    pos.kings |= 1 << 63;
    pos.white |= 1 << 63;
    assert_eq!(
        prober.probe_wdl(&pos).unwrap_err().kind(),
        ErrorKind::InvalidPosition
    );

    let overlapping = RawPosition {
        queens: pos.rooks,
        ..raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1")
    };
    assert!(matches!(
        prober.probe_wdl(&overlapping),
        Err(SyzygyError::InvalidPosition { .. })
    ));
}

#[test]
fn test_corrupt_table() {
    let dir = krk_dir();
    write_table(dir.path(), "KQvK.rtbw", &[0; 16]);
    let prober = ready(&dir);

    let pos = raw("8/8/8/3k4/8/8/8/Q3K3 w - - 0 1");
    let err = prober.probe_wdl(&pos).unwrap_err();
    assert!(matches!(err, SyzygyError::ProbeFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::CorruptTable);

    // Excluded from now on.
    assert!(matches!(
        prober.probe_wdl(&pos),
        Err(SyzygyError::CorruptTable {
            metric: Metric::Wdl,
            ..
        })
    ));

    // Other tables are still usable.
    assert_eq!(
        prober
            .probe_wdl(&raw("8/8/8/8/8/2k5/8/KR6 w - - 0 1"))
            .unwrap(),
        Wdl::Win
    );
}

#[test]
fn test_concurrent_probes() {
    let dir = krk_dir();
    let prober = ready(&dir);
    let pos = raw("8/8/8/8/8/2k5/8/KR6 b - - 0 1");

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(prober.probe_wdl(&pos).unwrap(), Wdl::Loss);
                    assert_eq!(
                        prober.probe_dtz(&pos, true).unwrap().ignore_rounding(),
                        Dtz(-2)
                    );
                }
            });
        }
    });
}

#[test]
fn test_tablebase_directly() {
    let dir = krk_dir();
    let mut tables = Tablebase::new();
    assert_eq!(tables.add_directory(dir.path()).unwrap(), 2);

    let pos = chess("8/8/8/8/8/2k5/8/KR6 w - - 0 1");
    assert_eq!(tables.probe_wdl(&pos).unwrap(), Wdl::Win);
    assert_eq!(tables.probe_dtz(&pos).unwrap().ignore_rounding(), Dtz(1));
}
