//! Cross-validation sweep over saved checkpoints to find the best epoch.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// Mean and standard deviation of the CCC across folds for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochScore {
    pub epoch: usize,
    pub mean: f64,
    pub std: f64,
}

/// Epochs `min, min + step, ...` below `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSweep {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

impl Default for EpochSweep {
    fn default() -> Self {
        Self {
            min: 200,
            max: 2000,
            step: 200,
        }
    }
}

impl EpochSweep {
    pub fn epochs(&self) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.min..self.max).step_by(self.step).collect()
    }

    /// Evaluate every epoch with `eval` (returning mean and std CCC) and
    /// pick the best.
    pub fn run<F>(&self, mut eval: F) -> Result<SweepReport>
    where
        F: FnMut(usize) -> Result<(f64, f64)>,
    {
        if self.step == 0 {
            bail!("sweep step must be at least 1");
        }
        let mut scores = Vec::new();
        for epoch in self.epochs() {
            let (mean, std) = eval(epoch).with_context(|| format!("evaluating epoch {epoch}"))?;
            info!("epoch {epoch}: CCC {mean:.4} ± {std:.4}");
            scores.push(EpochScore { epoch, mean, std });
        }
        Ok(SweepReport::from_scores(scores))
    }
}

/// Per-epoch results and the best epoch among them.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub means: BTreeMap<usize, f64>,
    pub stds: BTreeMap<usize, f64>,
    /// First epoch with the highest mean CCC above zero.
    pub best: Option<EpochScore>,
}

impl SweepReport {
    pub fn from_scores(scores: impl IntoIterator<Item = EpochScore>) -> Self {
        let mut means = BTreeMap::new();
        let mut stds = BTreeMap::new();
        let mut best: Option<EpochScore> = None;
        for score in scores {
            means.insert(score.epoch, score.mean);
            stds.insert(score.epoch, score.std);
            let best_mean = best.map_or(0.0, |b| b.mean);
            if score.mean > best_mean {
                best = Some(score);
            }
        }
        Self { means, stds, best }
    }

    /// Read `epoch,mean,std` rows (with header) written by the
    /// cross-validation run.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let scores = reader
            .deserialize::<EpochScore>()
            .enumerate()
            .map(|(row, record)| record.with_context(|| format!("{}: row {row}", path.display())))
            .collect::<Result<Vec<EpochScore>>>()?;
        Ok(Self::from_scores(scores))
    }
}
