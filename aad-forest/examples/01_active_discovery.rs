//! Active Anomaly Discovery Example
//!
//! Shows how analyst feedback sharpens an unsupervised detector:
//! - An isolation forest ranks instances without any labels
//! - The analyst labels one instance per round
//! - The detector reweights tree regions so confirmed anomalies rise
//!
//! ## Scenario: Building Sensor Readings
//!
//! Readings of (temperature, humidity) mostly sit in a comfortable band.
//! Two kinds of anomalies are mixed in:
//! - Hot and dry readings (HVAC failure), which the forest finds on its own
//! - Readings just outside the band (door left open), which it ranks lower
//!
//! The run compares anomalies found per query against walking down the
//! unweighted ranking.

use aad_core::{AadConfig, Label, ScoreType};
use aad_forest::{AadForest, ForestConfig, IsolationForest};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Simulated readings with ground-truth labels
struct SensorSimulator {
    rng: StdRng,
}

impl SensorSimulator {
    fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    fn normal(&mut self) -> [f64; 2] {
        [22.0 + self.rng.gen_range(-1.5..1.5), 45.0 + self.rng.gen_range(-5.0..5.0)]
    }

    fn hvac_failure(&mut self) -> [f64; 2] {
        [31.0 + self.rng.gen_range(-1.0..1.0), 20.0 + self.rng.gen_range(-3.0..3.0)]
    }

    fn door_open(&mut self) -> [f64; 2] {
        [18.5 + self.rng.gen_range(-0.5..0.5), 58.0 + self.rng.gen_range(-2.0..2.0)]
    }

    fn generate(&mut self, n_normal: usize, n_hvac: usize, n_door: usize) -> (Array2<f64>, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..n_normal {
            rows.push(self.normal());
            labels.push(Label::Nominal);
        }
        for _ in 0..n_hvac {
            rows.push(self.hvac_failure());
            labels.push(Label::Anomaly);
        }
        for _ in 0..n_door {
            rows.push(self.door_open());
            labels.push(Label::Anomaly);
        }
        let n = rows.len();
        let x = Array2::from_shape_vec((n, 2), rows.into_iter().flatten().collect()).expect("rows have two columns");
        (x, labels)
    }
}

fn main() {
    println!("=== Active Anomaly Discovery Example ===\n");

    let mut simulator = SensorSimulator::new(2024);
    let (x, labels) = simulator.generate(500, 8, 12);
    let n_anomalies = labels.iter().filter(|l| l.is_anomaly()).count();
    println!("Generated {} readings, {} anomalous\n", x.nrows(), n_anomalies);

    let mut forest = IsolationForest::new(ForestConfig {
        n_estimators: 100,
        max_samples: 256,
        max_depth: None,
        seed: 42,
    });
    forest.fit(x.view()).expect("forest fits");

    let mut config = AadConfig::default();
    config.detector.score_type = ScoreType::LeafInvSample;
    config.feedback.budget = 30;
    config.dataset = "building".into();

    let mut detector = AadForest::new(forest, config);
    detector.fit().expect("regions extracted");
    println!("Extracted {} regions\n", detector.n_regions());

    let features = detector
        .transform_to_region_features(x.view())
        .expect("transform succeeds");

    match detector.run_aad(x.clone(), labels, features, None) {
        Ok(Some(summary)) => {
            println!("{:>6} {:>10} {:>10}", "query", "with AAD", "baseline");
            for (i, (seen, base)) in summary.num_seen.iter().zip(&summary.num_seen_baseline).enumerate() {
                if (i + 1) % 5 == 0 {
                    println!("{:>6} {:>10} {:>10}", i + 1, seen, base);
                }
            }
        }
        Ok(None) => println!("Budget is zero, nothing to do"),
        Err(e) => println!("Feedback session failed: {}", e),
    }
}
