use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{Result, XappError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle split: `ceil(fraction * n)` rows go to test, the rest to train.
pub fn train_test_split_indices(n_samples: usize, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(XappError::Config(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let n_test = (test_fraction * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        let needed = (1.0 / test_fraction.min(1.0 - test_fraction)).ceil() as usize;
        return Err(XappError::NotEnoughSamples {
            needed: needed.max(2),
            got: n_samples,
        });
    }

    let mut perm: Vec<usize> = (0..n_samples).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = perm.split_off(n_test);

    Ok(SplitIndices { train, test: perm })
}
