//! Deterministic synthetic fixtures shared by unit and integration tests.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::domain::{Dataset, Label};

/// Number of features produced by [`synthetic_dataset`].
pub const SYNTHETIC_FEATURES: usize = 4;

/// Approximately standard-normal noise (sum of 12 uniforms, centred).
fn noise(rng: &mut Xoshiro256PlusPlus) -> f64 {
    (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0
}

/// `n` rows, `round(n * positive_fraction)` of them positive.
///
/// Positive rows are shifted by +3 on the first two features, so a linear
/// model separates the classes almost perfectly. The last two features are
/// pure noise.
pub fn synthetic_dataset(n: usize, positive_fraction: f64, seed: u64) -> Dataset {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let n_pos = ((n as f64) * positive_fraction).round() as usize;

    let mut labels: Vec<Label> = (0..n)
        .map(|i| if i < n_pos { Label::Positive } else { Label::Negative })
        .collect();
    // Fisher-Yates with the same stream keeps the fixture reproducible.
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        labels.swap(i, j);
    }

    let rows = labels
        .iter()
        .map(|label| {
            let shift = if label.is_positive() { 3.0 } else { 0.0 };
            vec![
                10.0 + shift + noise(&mut rng),
                20.0 + 2.0 * shift + 2.0 * noise(&mut rng),
                noise(&mut rng),
                5.0 + noise(&mut rng),
            ]
        })
        .collect();

    let names = ["radius_mean", "texture_mean", "smoothness_mean", "symmetry_mean"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Dataset::from_rows(names, rows, labels).expect("synthetic rows are rectangular")
}

/// Render a dataset as CSV in the source layout (`id`, `diagnosis`, features).
///
/// Fields are quoted where needed, so any header survives a round trip
/// through [`parse_csv`](crate::data::parse_csv).
pub fn to_csv(ds: &Dataset) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["id".to_string(), "diagnosis".to_string()];
    header.extend(ds.feature_names().iter().cloned());
    writer.write_record(&header).expect("write csv header");

    for (idx, (row, label)) in ds.rows().enumerate() {
        let code = if label.is_positive() { "M" } else { "B" };
        let mut record = vec![(idx + 1).to_string(), code.to_string()];
        record.extend(row.iter().map(f64::to_string));
        writer.write_record(&record).expect("write csv row");
    }

    let bytes = writer
        .into_inner()
        .unwrap_or_else(|e| panic!("flush csv: {}", e.error()));
    String::from_utf8(bytes).expect("csv output is utf-8")
}
