use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::warn;

use omg_valence::data::collate::collate;
use omg_valence::data::dataset::{DatasetConfig, MultimodalDataset, DEFAULT_PATTERN};
use omg_valence::inference::predict::{self, PredictConfig};
use omg_valence::inference::reconstruct::PredictionMode;
use omg_valence::inference::scorer::LinearScorer;
use omg_valence::sweep::SweepReport;

#[derive(Parser, Debug)]
#[command(
    name = "omg-valence",
    about = "Multimodal valence dataset tools and chunked inference"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a dataset, collate a sample batch and report sequence lengths
    Inspect(InspectArgs),
    /// Predict per-frame valence from utterance manifests
    Predict(PredictArgs),
    /// Pick the best epoch from per-epoch cross-validation results
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Dataset base folder (CombinedAudio, CombinedText, CombinedVisual, Annotations)
    #[arg(long, env = "OMG_DATA_DIR", default_value = "./data/Training")]
    folder: PathBuf,

    /// JSON dataset config; overrides --folder
    #[arg(long, env = "OMG_DATASET_CONFIG")]
    config: Option<PathBuf>,

    /// File name pattern with subject and story capture groups
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Sections to split each video into
    #[arg(long, default_value_t = 1)]
    split: usize,

    /// Annotation frame rate
    #[arg(long, default_value_t = 25.0)]
    fps: f64,

    /// Seconds per feature chunk
    #[arg(long, default_value_t = 1.0)]
    chunk_dur: f64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Absolute,
    Difference,
}

impl From<ModeArg> for PredictionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Absolute => PredictionMode::Absolute,
            ModeArg::Difference => PredictionMode::Difference,
        }
    }
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Model name, e.g. model_1542296294_999
    #[arg(short, long)]
    model: String,

    /// Linear scorer weights (JSON with "weights" and "bias")
    #[arg(long)]
    weights: PathBuf,

    /// Folder of per-video utterance manifests (.json)
    #[arg(long, env = "OMG_MANIFEST_DIR", default_value = "./data/Validation/Utterances")]
    manifests: PathBuf,

    /// Folder of per-frame ground-truth annotations (.csv)
    #[arg(long, env = "OMG_ANNOTATION_DIR", default_value = "./data/Validation/Annotations")]
    annotations: PathBuf,

    /// Root folder for prediction output
    #[arg(long, env = "OMG_PREDICTION_DIR", default_value = "./data/Validation/predictions")]
    out_dir: PathBuf,

    /// Utterances per chunk
    #[arg(long, default_value_t = 10)]
    chunk_size: usize,

    /// Chunk step; zero or negative means non-overlapping
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    chunk_step: i64,

    /// Whether the scorer predicts values or differences
    #[arg(long, value_enum, default_value = "absolute")]
    mode: ModeArg,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// CSV with columns epoch,mean,std
    results: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Inspect(args) => inspect(args),
        Command::Predict(args) => run_predict(args),
        Command::Sweep(args) => sweep(args),
    }
}

fn inspect(args: InspectArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => DatasetConfig::from_json_file(path)?,
        None => DatasetConfig {
            pattern: args.pattern.clone(),
            fps: args.fps,
            chunk_dur: args.chunk_dur,
            split_ratio: args.split,
            ..DatasetConfig::from_root(&args.folder)
        },
    };

    println!("Loading data...");
    let dataset = MultimodalDataset::open(&config)?;

    println!("Testing batch collation...");
    let sample: Vec<_> = dataset.examples().iter().take(10).cloned().collect();
    if sample.is_empty() {
        println!("No examples found.");
        return Ok(());
    }
    let batch = collate(sample).context("collating sample batch")?;
    println!("Batch shapes:");
    for tensor in [&batch.audio, &batch.text, &batch.visual, &batch.valence] {
        println!("{:?}", tensor.shape());
    }
    println!("Sequence lengths: {:?}", batch.lengths);

    println!("Checking through data for mismatched sequence lengths...");
    let mut mismatched = 0;
    for row in dataset.length_report() {
        println!(
            "#{}\tSubject: {}\tStory: {}:",
            row.example + 1,
            row.video.subject,
            row.video.story
        );
        println!(
            "audio {}, text {}, visual {}, valence {}",
            row.audio, row.text, row.visual, row.valence
        );
        if row.mismatched() {
            warn!("{}: mismatched sequence lengths", row.video);
            mismatched += 1;
        }
    }
    println!("{mismatched} of {} examples have mismatched lengths", dataset.len());
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let mut scorer = LinearScorer::from_json_file(&args.weights)?;
    let config = PredictConfig {
        manifest_dir: args.manifests,
        annotation_dir: args.annotations,
        output_root: args.out_dir,
        model_name: args.model,
        chunk_size: args.chunk_size,
        chunk_step: args.chunk_step,
        mode: args.mode.into(),
    };
    let summary = predict::run(&config, &mut scorer)?;
    println!(
        "Wrote {} prediction files to {}",
        summary.videos.len(),
        summary.output_dir.display()
    );
    Ok(())
}

fn sweep(args: SweepArgs) -> Result<()> {
    let report = SweepReport::from_csv(&args.results)?;
    println!("{:?}", report.means);
    println!("{:?}", report.stds);
    match report.best {
        Some(best) => {
            println!("Best epoch: {}", best.epoch);
            println!("Best CCC: {}", best.mean);
        }
        None => println!("No epoch reached a positive CCC"),
    }
    Ok(())
}
