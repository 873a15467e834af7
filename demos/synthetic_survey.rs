//! Simulates a survey with known competences and answer key, then checks
//! how much of it the consensus model recovers.
//!
//! Run with `cargo run --example synthetic_survey`.

use cultural_consensus::{analyze, AnalysisConfig, ResponseMatrix, SamplerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() {
    let mut rng = StdRng::seed_from_u64(2024);
    let informants = 15;
    let items = 25;

    let key: Vec<u8> = (0..items).map(|_| u8::from(rng.gen_bool(0.5))).collect();
    let competence: Vec<f64> = (0..informants).map(|_| rng.gen_range(0.5..1.0)).collect();

    let rows: Vec<Vec<u8>> = competence
        .iter()
        .map(|&d| {
            key.iter()
                .map(|&z| {
                    let p_one = if z == 1 { d } else { 1.0 - d };
                    u8::from(rng.gen_bool(p_one))
                })
                .collect()
        })
        .collect();

    let data = match ResponseMatrix::from_rows(&rows) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    let config = AnalysisConfig {
        sampler: SamplerConfig {
            draws: 1000,
            tune: 500,
            ..SamplerConfig::default()
        },
        ..AnalysisConfig::default()
    };
    let analysis = match analyze(&data, &config) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    println!("informant  true D  posterior mean");
    for (i, (truth, row)) in competence
        .iter()
        .zip(&analysis.summary.competence)
        .enumerate()
    {
        println!("{i:>9}  {truth:>6.3}  {:>14.3}", row.mean);
    }

    let model_hits = key
        .iter()
        .zip(&analysis.consensus)
        .filter(|(a, b)| a == b)
        .count();
    let vote_hits = key
        .iter()
        .zip(&analysis.majority_vote)
        .filter(|(a, b)| a == b)
        .count();
    println!("answer key recovered by the model: {model_hits}/{items}");
    println!("answer key recovered by majority vote: {vote_hits}/{items}");
    println!("run health: {:?}", analysis.health());
}
