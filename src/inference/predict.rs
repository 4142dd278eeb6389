use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::manifest::UtteranceManifest;
use super::reconstruct::{fit_to_length, PredictionAccumulator, PredictionMode};
use super::scorer::ChunkScorer;
use super::window::ChunkWindower;
use crate::data::loader::load_table;

fn default_chunk_size() -> usize {
    10
}

fn default_chunk_step() -> i64 {
    -1
}

/// One prediction run over a directory of utterance manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictConfig {
    /// `<video>.json` utterance manifests.
    pub manifest_dir: PathBuf,
    /// `<video>.csv` per-frame ground truth; only its length is used.
    pub annotation_dir: PathBuf,
    /// Root under which the run's prediction folder is created.
    pub output_root: PathBuf,
    /// Model name, e.g. `model_1542296294_999`.
    pub model_name: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Zero or below: non-overlapping chunks.
    #[serde(default = "default_chunk_step")]
    pub chunk_step: i64,
    #[serde(default)]
    pub mode: PredictionMode,
}

/// What a prediction run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictSummary {
    pub output_dir: PathBuf,
    pub videos: Vec<String>,
}

/// Strip the leading `model_` style prefix: `model_1542296294_999` →
/// `1542296294_999`. Names without an underscore are kept as is.
pub fn model_id(model_name: &str) -> &str {
    model_name
        .split_once('_')
        .map_or(model_name, |(_, id)| id)
}

/// `<root>/<model_id>_utter_chunk_attention`
pub fn prediction_dir(root: &Path, model_name: &str) -> PathBuf {
    root.join(format!("{}_utter_chunk_attention", model_id(model_name)))
}

/// Score every chunk of one video and rebuild its per-frame sequence.
pub fn predict_video<S: ChunkScorer + ?Sized>(
    windower: &ChunkWindower,
    scorer: &mut S,
    manifest: &UtteranceManifest,
    mode: PredictionMode,
) -> Result<Vec<f32>> {
    let sequence = manifest.embedded()?;
    let mut accumulator = PredictionAccumulator::new();
    let mut n_chunks = 0;
    for chunk in windower.windows(&sequence) {
        let scores = scorer
            .score(chunk.data.view())
            .with_context(|| format!("scoring chunk {}", chunk.position))?;
        accumulator.record(&chunk, &scores)?;
        n_chunks += 1;
    }
    debug!(
        "{n_chunks} chunks covered {} of {} utterances",
        accumulator.covered(),
        manifest.utterances.len()
    );
    Ok(accumulator.reconstruct(&manifest.spans(), mode))
}

/// Write one predicted value per frame under a `valence` header.
pub fn write_predictions(path: &Path, sequence: &[f32]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["valence"]).context("writing CSV header")?;
    for value in sequence {
        writer
            .write_record([value.to_string()])
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// Predict every manifest in `config.manifest_dir`, fit each sequence to
/// its ground-truth frame count and write it as CSV.
pub fn run<S: ChunkScorer + ?Sized>(
    config: &PredictConfig,
    scorer: &mut S,
) -> Result<PredictSummary> {
    let windower = ChunkWindower::from_signed_step(config.chunk_size, config.chunk_step)?;
    let output_dir = prediction_dir(&config.output_root, &config.model_name);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let manifests = manifest_files(&config.manifest_dir)?;

    info!(
        "predicting {} videos, results are saved to {}",
        manifests.len(),
        output_dir.display()
    );

    let mut videos = Vec::with_capacity(manifests.len());
    for path in manifests {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("bad manifest name {}", path.display()))?
            .to_string();
        let manifest = UtteranceManifest::from_json_file(&path)?;
        let predicted = predict_video(&windower, scorer, &manifest, config.mode)
            .with_context(|| format!("predicting {stem}"))?;

        let gt_path = config.annotation_dir.join(format!("{stem}.csv"));
        let gt_len = load_table(&gt_path)?.nrows();
        if predicted.len() != gt_len {
            debug!("{stem}: fitting {} predicted frames to {gt_len}", predicted.len());
        }
        let predicted = fit_to_length(predicted, gt_len);

        write_predictions(&output_dir.join(format!("{stem}.csv")), &predicted)?;
        info!("{stem}\t#utterances: {}", manifest.utterances.len());
        videos.push(stem);
    }

    Ok(PredictSummary { output_dir, videos })
}

/// `.json` files in `dir`, sorted by path.
fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("listing {}", dir.display()))?
            .path();
        if path.extension().is_some_and(|ext| ext == "json") {
            manifests.push(path);
        }
    }
    manifests.sort();
    Ok(manifests)
}
