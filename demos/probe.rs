use std::{env, error::Error, path::PathBuf};

use clap::Parser;
use shakmaty::{fen::Fen, san::San, CastlingMode, Chess, Position};
use syzygy_probe::{
    result::{encode_root, TB_RESULT_FAILED},
    LineEnd, MaybeRounded, Prober, RawPosition, RootProbe,
};

#[derive(Debug, Parser)]
#[command(about = "Probe Syzygy tables for a position")]
struct Opt {
    /// Tablebase directories.
    #[arg(long = "path", required = true)]
    path: Vec<PathBuf>,
    /// Ignore the 50-move rule.
    #[arg(long)]
    no_rule50: bool,
    /// Maximum number of pieces to probe.
    #[arg(long)]
    probe_limit: Option<usize>,
    /// Maximum length of the printed principal variation.
    #[arg(long, default_value_t = 200)]
    max_plies: usize,
    /// The position to probe.
    fen: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();

    let mut prober = Prober::new();
    let tables = prober.init(env::join_paths(&opt.path)?)?;
    if let Some(limit) = opt.probe_limit {
        prober.set_probe_limit(limit);
    }
    println!(
        "{tables} tables, up to {} pieces",
        prober.largest_table_size()
    );

    let pos: Chess = opt
        .fen
        .parse::<Fen>()?
        .into_position(CastlingMode::Standard)?;
    let raw = RawPosition::from(&pos);
    let use_rule50 = !opt.no_rule50;

    println!("WDL: {:?}", prober.probe_wdl(&raw)?);
    match prober.probe_dtz(&raw, use_rule50)? {
        MaybeRounded::Precise(dtz) => println!("DTZ: {dtz}"),
        MaybeRounded::Rounded(dtz) => println!("DTZ: {dtz} or {}", dtz.add_plies(1)),
    }

    let best = prober.best_move(&raw);
    let code = best.as_ref().map_or(TB_RESULT_FAILED, encode_root);
    match best {
        Ok(RootProbe::Checkmate) => println!("Best: checkmated ({code:#010x})"),
        Ok(RootProbe::Stalemate) => println!("Best: stalemate ({code:#010x})"),
        Ok(RootProbe::Move(root_move)) => println!(
            "Best: {} ({code:#010x})",
            San::from_move(&pos, &root_move.m)
        ),
        Err(err) => println!("Best: {err}"),
    }

    let pv = prober.principal_variation(&raw, opt.max_plies)?;
    let mut line = Vec::with_capacity(pv.moves.len());
    let mut after = pos.clone();
    for m in &pv.moves {
        line.push(San::from_move(&after, m).to_string());
        after.play_unchecked(m);
    }
    match (pv.mate_in(), pv.end) {
        (Some(n), _) => println!("PV (mate {n}): {}", line.join(" ")),
        (None, LineEnd::Draw) => println!("PV (draw): {}", line.join(" ")),
        (None, end) => println!("PV ({end:?}): {}", line.join(" ")),
    }

    println!();
    for root_move in prober.probe_root_dtz(&raw, false, use_rule50)? {
        let wdl = root_move
            .wdl
            .map_or_else(|| "-".to_owned(), |wdl| format!("{wdl:?}"));
        let dtz = root_move
            .dtz
            .map_or_else(|| "-".to_owned(), |dtz| dtz.to_string());
        println!(
            "{:<8} {:<12} {:>6} {:>8} {:>7}",
            San::from_move(&pos, &root_move.m).to_string(),
            wdl,
            dtz,
            root_move.rank,
            root_move.score
        );
    }

    Ok(())
}
