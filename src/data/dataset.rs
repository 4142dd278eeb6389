use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use ndarray::{s, Array2, Axis};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loader::{load_npy_matrix, load_npy_squeezed, load_table};
use super::model::{AlignedExample, Modality, VideoId};

/// Matches e.g. `Subject_1_Story_2.csv` or `Subject_1_Story_2_extra.npy`.
pub const DEFAULT_PATTERN: &str = r"Subject_(\d+)_Story_(\d+)(?:_\w*)?";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("file counts differ: audio {audio}, text {text}, visual {visual}, valence {valence}")]
    FileCountMismatch {
        audio: usize,
        text: usize,
        visual: usize,
        valence: usize,
    },
    #[error("invalid file pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("file pattern must capture subject and story ids, {0} does not")]
    MissingCapture(String),
    #[error("fps * chunk_dur must round to at least one frame (fps {fps}, chunk_dur {chunk_dur})")]
    InvalidChunking { fps: f64, chunk_dur: f64 },
    #[error("split_ratio must be at least 1")]
    InvalidSplitRatio,
    #[error("{video} has no {modality} file")]
    MissingVideo { video: VideoId, modality: Modality },
    #[error("{video} matches more than one {modality} file")]
    DuplicateVideo { video: VideoId, modality: Modality },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_fps() -> f64 {
    25.0
}

fn default_chunk_dur() -> f64 {
    1.0
}

fn default_split_ratio() -> usize {
    1
}

/// Where to find each source and how to align them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Tabular audio features (`.csv` or `.parquet`).
    pub audio_dir: PathBuf,
    /// Text features (`.npy`, 2-D).
    pub text_dir: PathBuf,
    /// Visual features (`.npy`, 3-D with a singleton axis 1).
    pub visual_dir: PathBuf,
    /// Per-frame valence annotations (`.csv`).
    pub valence_dir: PathBuf,
    /// Regex matched at the start of each file name; groups 1 and 2 are the
    /// subject and story ids.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Annotation frame rate.
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Seconds of video per feature chunk.
    #[serde(default = "default_chunk_dur")]
    pub chunk_dur: f64,
    /// Sections to split each video into.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: usize,
}

impl DatasetConfig {
    /// Standard layout under one data folder.
    pub fn from_root(root: &Path) -> Self {
        Self {
            audio_dir: root.join("CombinedAudio"),
            text_dir: root.join("CombinedText"),
            visual_dir: root.join("CombinedVisual"),
            valence_dir: root.join("Annotations"),
            pattern: default_pattern(),
            fps: default_fps(),
            chunk_dur: default_chunk_dur(),
            split_ratio: default_split_ratio(),
        }
    }

    /// Read a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Annotation frames per feature chunk, `round(fps * chunk_dur)`.
    pub fn frames_per_chunk(&self) -> Result<usize, DatasetError> {
        let ratio = (self.fps * self.chunk_dur).round();
        if !ratio.is_finite() || ratio < 1.0 {
            return Err(DatasetError::InvalidChunking {
                fps: self.fps,
                chunk_dur: self.chunk_dur,
            });
        }
        Ok(ratio as usize)
    }
}

// ---------------------------------------------------------------------------
// MultimodalDataset
// ---------------------------------------------------------------------------

/// Per-example sequence lengths, for spotting misaligned sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleLengths {
    pub example: usize,
    pub video: VideoId,
    pub audio: usize,
    pub text: usize,
    pub visual: usize,
    pub valence: usize,
}

impl ExampleLengths {
    /// Whether the four sources disagree on length.
    pub fn mismatched(&self) -> bool {
        !(self.audio == self.text && self.text == self.visual && self.visual == self.valence)
    }
}

/// Audio, text, visual features and valence ratings for a set of videos,
/// optionally split into several examples per video.
#[derive(Debug, Clone)]
pub struct MultimodalDataset {
    examples: Vec<AlignedExample>,
    /// Video index for each example.
    example_video: Vec<usize>,
    videos: Vec<VideoId>,
    valence_orig: Vec<Vec<f32>>,
}

impl MultimodalDataset {
    /// Discover, load and align every video described by `config`.
    ///
    /// Fails with [`DatasetError::FileCountMismatch`] before any file is
    /// read when the four directories hold different numbers of matching
    /// files, and with [`DatasetError::MissingVideo`] when a video found
    /// in one directory has no file in another.
    pub fn open(config: &DatasetConfig) -> Result<Self> {
        if config.split_ratio == 0 {
            return Err(DatasetError::InvalidSplitRatio.into());
        }
        let frames_per_chunk = config.frames_per_chunk()?;
        let pattern =
            Regex::new(&format!("^(?:{})", config.pattern)).map_err(DatasetError::from)?;

        let audio_files = matching_files(&config.audio_dir, &pattern)?;
        let text_files = matching_files(&config.text_dir, &pattern)?;
        let visual_files = matching_files(&config.visual_dir, &pattern)?;
        let valence_files = matching_files(&config.valence_dir, &pattern)?;

        let counts = [
            audio_files.len(),
            text_files.len(),
            visual_files.len(),
            valence_files.len(),
        ];
        if counts.iter().any(|&c| c != counts[0]) {
            return Err(DatasetError::FileCountMismatch {
                audio: counts[0],
                text: counts[1],
                visual: counts[2],
                valence: counts[3],
            }
            .into());
        }

        let audio_files = keyed_files(audio_files, &pattern, Modality::Audio)?;
        let text_files = keyed_files(text_files, &pattern, Modality::Text)?;
        let visual_files = keyed_files(visual_files, &pattern, Modality::Visual)?;
        let valence_files = keyed_files(valence_files, &pattern, Modality::Valence)?;

        // join on the video id so every example is one recording
        let mut sources = Vec::with_capacity(valence_files.len());
        for (video, f_va) in &valence_files {
            let f_au = source_file(&audio_files, video, Modality::Audio)?;
            let f_te = source_file(&text_files, video, Modality::Text)?;
            let f_vi = source_file(&visual_files, video, Modality::Visual)?;
            sources.push((f_au, f_te, f_vi, f_va));
        }

        let mut dataset = MultimodalDataset {
            examples: Vec::new(),
            example_video: Vec::new(),
            videos: valence_files.keys().cloned().collect(),
            valence_orig: Vec::new(),
        };

        for (video, (f_au, f_te, f_vi, f_va)) in sources.into_iter().enumerate() {
            let audio = load_table(f_au)?;
            let text = load_npy_matrix(f_te)?;
            let visual = load_npy_squeezed(f_vi)?;
            let valence_raw = load_table(f_va)?;
            dataset.valence_orig.push(valence_raw.iter().copied().collect());
            let valence = downsample_mean(&valence_raw, frames_per_chunk);

            debug!(
                "{}: audio {:?}, text {:?}, visual {:?}, valence {:?}",
                dataset.videos[video],
                audio.dim(),
                text.dim(),
                visual.dim(),
                valence.dim()
            );

            let k = config.split_ratio;
            let sections = split_rows(&audio, k)
                .into_iter()
                .zip(split_rows(&text, k))
                .zip(split_rows(&visual, k).into_iter().zip(split_rows(&valence, k)));
            for ((audio, text), (visual, valence)) in sections {
                dataset.examples.push(AlignedExample {
                    audio,
                    text,
                    visual,
                    valence,
                });
                dataset.example_video.push(video);
            }
        }

        info!(
            "loaded {} videos as {} examples (split_ratio {}, {} frames per chunk)",
            dataset.videos.len(),
            dataset.examples.len(),
            config.split_ratio,
            frames_per_chunk
        );
        Ok(dataset)
    }

    /// Number of examples after splitting.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the dataset holds no examples.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// The `i`-th example.
    pub fn get(&self, i: usize) -> Option<&AlignedExample> {
        self.examples.get(i)
    }

    /// All examples in load order.
    pub fn examples(&self) -> &[AlignedExample] {
        &self.examples
    }

    /// Source videos in load order.
    pub fn videos(&self) -> &[VideoId] {
        &self.videos
    }

    /// The video the `i`-th example was cut from.
    pub fn video_of(&self, i: usize) -> Option<&VideoId> {
        self.example_video.get(i).map(|&v| &self.videos[v])
    }

    /// Per-frame valence ratings of video `video`, before downsampling.
    pub fn valence_orig(&self, video: usize) -> Option<&[f32]> {
        self.valence_orig.get(video).map(Vec::as_slice)
    }

    /// Sequence lengths for every example.
    pub fn length_report(&self) -> Vec<ExampleLengths> {
        self.examples
            .iter()
            .enumerate()
            .map(|(i, ex)| ExampleLengths {
                example: i,
                video: self.videos[self.example_video[i]].clone(),
                audio: ex.audio.nrows(),
                text: ex.text.nrows(),
                visual: ex.visual.nrows(),
                valence: ex.valence.nrows(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// Files in `dir` whose names match `pattern`, sorted by name.
fn matching_files(dir: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if let Some(name) = entry.file_name().to_str() {
            if pattern.is_match(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// Key each file by the video its name captures.
fn keyed_files(
    files: Vec<PathBuf>,
    pattern: &Regex,
    modality: Modality,
) -> Result<BTreeMap<VideoId, PathBuf>, DatasetError> {
    let mut keyed = BTreeMap::new();
    for path in files {
        let video = video_id(&path, pattern)?;
        if keyed.contains_key(&video) {
            return Err(DatasetError::DuplicateVideo { video, modality });
        }
        keyed.insert(video, path);
    }
    Ok(keyed)
}

fn source_file<'a>(
    files: &'a BTreeMap<VideoId, PathBuf>,
    video: &VideoId,
    modality: Modality,
) -> Result<&'a PathBuf, DatasetError> {
    files.get(video).ok_or_else(|| DatasetError::MissingVideo {
        video: video.clone(),
        modality,
    })
}

fn video_id(path: &Path, pattern: &Regex) -> Result<VideoId, DatasetError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let caps = pattern
        .captures(name)
        .ok_or_else(|| DatasetError::MissingCapture(name.to_string()))?;
    match (caps.get(1), caps.get(2)) {
        (Some(subject), Some(story)) => Ok(VideoId {
            subject: subject.as_str().to_string(),
            story: story.as_str().to_string(),
        }),
        _ => Err(DatasetError::MissingCapture(name.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Alignment helpers
// ---------------------------------------------------------------------------

/// Average consecutive groups of `bucket` rows, column by column. The last
/// group may hold fewer rows.
pub fn downsample_mean(series: &Array2<f32>, bucket: usize) -> Array2<f32> {
    let bucket = bucket.max(1);
    let n_rows = series.nrows();
    let n_chunks = n_rows.div_ceil(bucket);
    let mut out = Array2::zeros((n_chunks, series.ncols()));
    for chunk in 0..n_chunks {
        let start = chunk * bucket;
        let end = (start + bucket).min(n_rows);
        let rows = series.slice(s![start..end, ..]);
        for (col, values) in rows.axis_iter(Axis(1)).enumerate() {
            let sum: f64 = values.iter().map(|&v| v as f64).sum();
            out[[chunk, col]] = (sum / (end - start) as f64) as f32;
        }
    }
    out
}

/// Row ranges splitting `len` rows into `k` contiguous sections. The first
/// `len % k` sections get one extra row.
pub fn split_sections(len: usize, k: usize) -> Vec<Range<usize>> {
    let k = k.max(1);
    let base = len / k;
    let extra = len % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

fn split_rows(array: &Array2<f32>, k: usize) -> Vec<Array2<f32>> {
    split_sections(array.nrows(), k)
        .into_iter()
        .map(|range| array.slice(s![range, ..]).to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ndarray::{array, concatenate, Array3};
    use ndarray_npy::write_npy;

    use super::*;
    use crate::data::loader::write_csv_table;

    struct Layout {
        _dir: tempfile::TempDir,
        config: DatasetConfig,
    }

    fn layout() -> Layout {
        let dir = tempfile::tempdir().unwrap();
        let config = DatasetConfig::from_root(dir.path());
        for d in [
            &config.audio_dir,
            &config.text_dir,
            &config.visual_dir,
            &config.valence_dir,
        ] {
            fs::create_dir_all(d).unwrap();
        }
        Layout { _dir: dir, config }
    }

    /// One video with `chunks` feature rows and `chunks * 25 - short` frames.
    fn write_video(
        config: &DatasetConfig,
        subject: u32,
        story: u32,
        chunks: usize,
        short: usize,
    ) {
        let stem = format!("Subject_{subject}_Story_{story}");
        let offset = (subject * 100 + story) as f32;
        let audio =
            Array2::from_shape_fn((chunks, 3), |(t, d)| offset + t as f32 + d as f32 * 0.1);
        let header = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        write_csv_table(&config.audio_dir.join(format!("{stem}.csv")), &header, &audio).unwrap();

        let text = Array2::from_shape_fn((chunks, 2), |(t, d)| t as f32 * 2.0 + d as f32);
        write_npy(config.text_dir.join(format!("{stem}.npy")), &text).unwrap();

        let visual = Array3::from_shape_fn((chunks, 1, 4), |(t, _, d)| t as f32 - d as f32);
        write_npy(config.visual_dir.join(format!("{stem}_features.npy")), &visual).unwrap();

        let frames = chunks * 25 - short;
        let valence = Array2::from_shape_fn((frames, 1), |(f, _)| (f / 25) as f32 + 0.5);
        let header = vec!["valence".to_string()];
        let path = config.valence_dir.join(format!("{stem}.csv"));
        write_csv_table(&path, &header, &valence).unwrap();
    }

    #[test]
    fn loads_videos_and_downsamples_valence() {
        let Layout { _dir, config } = layout();
        write_video(&config, 1, 2, 4, 0);
        write_video(&config, 1, 1, 3, 10);
        fs::write(config.audio_dir.join("README.txt"), "ignored").unwrap();

        let dataset = MultimodalDataset::open(&config).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(
            dataset.videos(),
            &[
                VideoId {
                    subject: "1".into(),
                    story: "1".into()
                },
                VideoId {
                    subject: "1".into(),
                    story: "2".into()
                },
            ]
        );

        let first = dataset.get(0).unwrap();
        assert_eq!(first.audio.dim(), (3, 3));
        assert_eq!(first.text.dim(), (3, 2));
        assert_eq!(first.visual.dim(), (3, 4));
        assert_eq!(first.valence, array![[0.5f32], [1.5], [2.5]]);
        assert!(first.is_aligned());
        assert_eq!(dataset.valence_orig(0).unwrap().len(), 65);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn mismatched_file_counts_fail_before_loading() {
        let Layout { _dir, config } = layout();
        for story in 0..10 {
            write_video(&config, 1, story, 2, 0);
        }
        fs::remove_file(config.visual_dir.join("Subject_1_Story_9_features.npy")).unwrap();
        // unreadable audio would fail if anything were loaded
        fs::write(config.audio_dir.join("Subject_1_Story_0.csv"), "a\nnot-a-number\n").unwrap();

        let err = MultimodalDataset::open(&config).unwrap_err();
        match err.downcast_ref::<DatasetError>() {
            Some(DatasetError::FileCountMismatch {
                audio,
                text,
                visual,
                valence,
            }) => assert_eq!((*audio, *text, *visual, *valence), (10, 10, 9, 10)),
            other => panic!("expected FileCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn files_are_joined_by_video_not_by_name_order() {
        let Layout { _dir, config } = layout();
        // by name, story 1 audio sorts before story 10 but story 1 visual
        // ("..._1_features.npy") sorts after it
        write_video(&config, 1, 1, 3, 0);
        write_video(&config, 1, 10, 5, 0);

        let dataset = MultimodalDataset::open(&config).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.examples().iter().all(AlignedExample::is_aligned));
        for (i, chunks) in [(0, 3), (1, 5)] {
            let example = dataset.get(i).unwrap();
            assert_eq!(example.audio.nrows(), chunks);
            assert_eq!(example.visual.nrows(), chunks);
        }
        assert_eq!(dataset.video_of(1).unwrap().story, "10");
        // audio rows are offset by subject * 100 + story
        assert_eq!(dataset.get(1).unwrap().audio[[0, 0]], 110.0);
    }

    #[test]
    fn video_missing_from_one_source_is_an_error() {
        let Layout { _dir, config } = layout();
        write_video(&config, 1, 1, 2, 0);
        write_video(&config, 1, 2, 2, 0);
        // counts still match, but story 2 has no text file
        fs::rename(
            config.text_dir.join("Subject_1_Story_2.npy"),
            config.text_dir.join("Subject_1_Story_3.npy"),
        )
        .unwrap();

        let err = MultimodalDataset::open(&config).unwrap_err();
        match err.downcast_ref::<DatasetError>() {
            Some(DatasetError::MissingVideo { video, modality }) => {
                assert_eq!(video.to_string(), "Subject_1_Story_2");
                assert_eq!(*modality, Modality::Text);
            }
            other => panic!("expected MissingVideo, got {other:?}"),
        }
    }

    #[test]
    fn split_ratio_yields_k_examples_that_concatenate_back() {
        let Layout { _dir, mut config } = layout();
        write_video(&config, 2, 1, 7, 0);
        write_video(&config, 3, 1, 5, 0);

        let full = MultimodalDataset::open(&config).unwrap();
        config.split_ratio = 3;
        let split = MultimodalDataset::open(&config).unwrap();
        assert_eq!(split.len(), 3 * full.len());

        for (video, whole) in full.examples().iter().enumerate() {
            let parts = &split.examples()[video * 3..video * 3 + 3];
            assert!((video * 3..video * 3 + 3).all(|i| split.video_of(i) == full.video_of(video)));
            let audio: Vec<_> = parts.iter().map(|p| p.audio.view()).collect();
            let text: Vec<_> = parts.iter().map(|p| p.text.view()).collect();
            let valence: Vec<_> = parts.iter().map(|p| p.valence.view()).collect();
            let visual: Vec<_> = parts.iter().map(|p| p.visual.view()).collect();
            assert_eq!(concatenate(Axis(0), &audio).unwrap(), whole.audio);
            assert_eq!(concatenate(Axis(0), &text).unwrap(), whole.text);
            assert_eq!(concatenate(Axis(0), &valence).unwrap(), whole.valence);
            assert_eq!(concatenate(Axis(0), &visual).unwrap(), whole.visual);
        }
    }

    #[test]
    fn length_report_flags_mismatch() {
        let Layout { _dir, config } = layout();
        write_video(&config, 1, 1, 3, 0);
        write_video(&config, 1, 2, 3, 0);
        // one extra annotation chunk for story 2
        let valence = Array2::from_elem((4 * 25, 1), 0.0f32);
        write_csv_table(
            &config.valence_dir.join("Subject_1_Story_2.csv"),
            &["valence".to_string()],
            &valence,
        )
        .unwrap();

        let report = MultimodalDataset::open(&config).unwrap().length_report();
        assert!(!report[0].mismatched());
        assert!(report[1].mismatched());
        assert_eq!(report[1].valence, 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let Layout { _dir, mut config } = layout();
        config.split_ratio = 0;
        assert!(MultimodalDataset::open(&config).is_err());

        config.split_ratio = 1;
        config.fps = 0.2;
        let err = MultimodalDataset::open(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn config_reads_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        fs::write(
            &path,
            r#"{
                "audio_dir": "a",
                "text_dir": "t",
                "visual_dir": "v",
                "valence_dir": "l",
                "split_ratio": 5
            }"#,
        )
        .unwrap();

        let config = DatasetConfig::from_json_file(&path).unwrap();
        assert_eq!(config.split_ratio, 5);
        assert_eq!(config.pattern, DEFAULT_PATTERN);
        assert_eq!(config.frames_per_chunk().unwrap(), 25);
    }

    #[test]
    fn downsample_averages_buckets_with_partial_tail() {
        let series = array![[1.0f32, 10.0], [3.0, 20.0], [5.0, 30.0], [8.0, 40.0], [9.0, 0.0]];
        let out = downsample_mean(&series, 2);
        assert_eq!(out, array![[2.0f32, 15.0], [6.5, 35.0], [9.0, 0.0]]);
    }

    #[test]
    fn split_sections_follow_array_split_sizes() {
        assert_eq!(split_sections(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(split_sections(2, 3), vec![0..1, 1..2, 2..2]);
        assert_eq!(split_sections(6, 1), vec![0..6]);
    }
}
