use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use ndarray::{Array2, Array3};
use ndarray_npy::write_npy;
use parquet::arrow::ArrowWriter;

use omg_valence::data::loader::write_csv_table;
use omg_valence::inference::manifest::{Utterance, UtteranceManifest};
use omg_valence::inference::scorer::LinearScorer;

const FPS: usize = 25;
const AUDIO_DIM: usize = 8;
const TEXT_DIM: usize = 6;
const VISUAL_DIM: usize = 5;

#[derive(Parser, Debug)]
#[command(
    name = "generate_sample",
    about = "Write a small synthetic dataset in the expected folder layout"
)]
struct Args {
    /// Output folder
    #[arg(default_value = "sample_data")]
    out: PathBuf,

    /// Number of subjects
    #[arg(long, default_value_t = 2)]
    subjects: usize,

    /// Stories per subject
    #[arg(long, default_value_t = 3)]
    stories: usize,

    /// Write audio features as .parquet instead of .csv
    #[arg(long)]
    parquet: bool,

    /// PRNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next_f64() * (hi - lo) as f64) as usize
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Slowly drifting valence in [-1, 1], one value per frame.
fn valence_track(frames: usize, rng: &mut SimpleRng) -> Vec<f32> {
    let mut value = 0.0f64;
    (0..frames)
        .map(|_| {
            value = (value + rng.gauss(0.0, 0.02)).clamp(-1.0, 1.0);
            value as f32
        })
        .collect()
}

/// Features loosely tied to the per-chunk valence so the data is not pure noise.
fn features(valence: &[f32], chunks: usize, dim: usize, rng: &mut SimpleRng) -> Array2<f32> {
    Array2::from_shape_fn((chunks, dim), |(t, d)| {
        let frame = (t * FPS).min(valence.len().saturating_sub(1));
        let level = valence.get(frame).copied().unwrap_or(0.0) as f64;
        let signal = level * (d as f64 + 1.0) / dim as f64;
        (signal + rng.gauss(0.0, 0.1)) as f32
    })
}

fn utterances(valence: &[f32], rng: &mut SimpleRng) -> UtteranceManifest {
    let mut utterances = Vec::new();
    let mut start = 0;
    while start < valence.len() {
        let end = (start + rng.range(20, 80)).min(valence.len()) - 1;
        let embedding = if rng.next_f64() < 0.1 {
            None
        } else {
            Some(
                (0..TEXT_DIM)
                    .map(|d| (valence[start] as f64 * (d % 2) as f64 + rng.gauss(0.0, 0.05)) as f32)
                    .collect(),
            )
        };
        utterances.push(Utterance {
            index: utterances.len(),
            start_frame: start,
            end_frame: end,
            embedding,
        });
        start = end + 1;
    }
    UtteranceManifest { utterances }
}

fn write_parquet_table(path: &Path, table: &Array2<f32>) -> Result<()> {
    let fields: Vec<Field> = (0..table.ncols())
        .map(|d| Field::new(format!("f{d}"), DataType::Float32, false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let columns: Vec<ArrayRef> = table
        .columns()
        .into_iter()
        .map(|col| Arc::new(Float32Array::from(col.to_vec())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let dirs = [
        "CombinedAudio",
        "CombinedText",
        "CombinedVisual",
        "Annotations",
        "Utterances",
    ]
    .map(|name| args.out.join(name));
    for dir in &dirs {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let [audio_dir, text_dir, visual_dir, valence_dir, utterance_dir] = dirs;

    let mut videos = 0;
    for subject in 1..=args.subjects {
        for story in 1..=args.stories {
            let stem = format!("Subject_{subject}_Story_{story}");
            let chunks = rng.range(40, 90);
            // annotations rarely end exactly on a chunk boundary
            let frames = chunks * FPS - rng.range(0, FPS);
            let valence = valence_track(frames, &mut rng);

            let audio = features(&valence, chunks, AUDIO_DIM, &mut rng);
            if args.parquet {
                write_parquet_table(&audio_dir.join(format!("{stem}.parquet")), &audio)?;
            } else {
                let header: Vec<String> = (0..AUDIO_DIM).map(|d| format!("f{d}")).collect();
                write_csv_table(&audio_dir.join(format!("{stem}.csv")), &header, &audio)?;
            }

            let text = features(&valence, chunks, TEXT_DIM, &mut rng);
            write_npy(text_dir.join(format!("{stem}.npy")), &text)
                .with_context(|| format!("writing {stem} text features"))?;

            let visual = features(&valence, chunks, VISUAL_DIM, &mut rng);
            let visual: Array3<f32> = visual.insert_axis(ndarray::Axis(1));
            write_npy(visual_dir.join(format!("{stem}.npy")), &visual)
                .with_context(|| format!("writing {stem} visual features"))?;

            let track = Array2::from_shape_vec((frames, 1), valence.clone())
                .context("shaping valence track")?;
            let header = ["valence".to_string()];
            write_csv_table(&valence_dir.join(format!("{stem}.csv")), &header, &track)?;

            utterances(&valence, &mut rng)
                .write_json_file(&utterance_dir.join(format!("{stem}.json")))?;
            videos += 1;
        }
    }

    let scorer = LinearScorer {
        weights: (0..TEXT_DIM).map(|d| if d % 2 == 1 { 1.0 / 3.0 } else { 0.0 }).collect(),
        bias: 0.0,
    };
    let scorer_path = args.out.join("scorer.json");
    std::fs::write(&scorer_path, serde_json::to_string_pretty(&scorer)?)
        .with_context(|| format!("writing {}", scorer_path.display()))?;

    println!("Wrote {videos} videos to {}", args.out.display());
    Ok(())
}
