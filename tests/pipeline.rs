use anyhow::Result;
use ndarray::{Array2, ArrayView2};

use omg_valence::data::loader::{load_table, write_csv_table};
use omg_valence::inference::manifest::{Utterance, UtteranceManifest};
use omg_valence::inference::predict::{self, predict_video, PredictConfig};
use omg_valence::inference::reconstruct::{fit_to_length, PredictionMode};
use omg_valence::inference::scorer::LinearScorer;
use omg_valence::inference::window::ChunkWindower;

/// Scores each row with its first embedding value.
fn identity(chunk: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
    Ok(chunk.column(0).to_vec())
}

fn delta(i: usize) -> f32 {
    // exact in binary so cumulative sums compare exactly
    [0.5, -0.25, 0.125, 1.0][i % 4]
}

/// 23 utterances of 10 frames each, covering frames 0..=229.
fn manifest(excluded: Option<usize>) -> UtteranceManifest {
    UtteranceManifest {
        utterances: (0..23)
            .map(|i| Utterance {
                index: i,
                start_frame: i * 10,
                end_frame: i * 10 + 9,
                embedding: (Some(i) != excluded).then(|| vec![delta(i), 0.0]),
            })
            .collect(),
    }
}

#[test]
fn difference_mode_rebuilds_cumulative_sum_per_frame() {
    let windower = ChunkWindower::from_signed_step(10, -1).unwrap();
    let mut scorer = identity;
    let seq = predict_video(&windower, &mut scorer, &manifest(None), PredictionMode::Difference)
        .unwrap();

    assert_eq!(seq.len(), 230);
    let mut running = 0.0f32;
    for i in 0..23 {
        running += delta(i);
        assert!(seq[i * 10..i * 10 + 10].iter().all(|&v| v == running), "utterance {i}");
    }
}

#[test]
fn uncovered_utterance_carries_previous_value() {
    let windower = ChunkWindower::new(10, None).unwrap();
    let mut scorer = identity;
    let gapped = manifest(Some(22));
    let seq = predict_video(&windower, &mut scorer, &gapped, PredictionMode::Difference).unwrap();

    assert_eq!(seq.len(), 230);
    assert!(seq[220..230].iter().all(|&v| v == seq[219]));

    let absolute =
        predict_video(&windower, &mut scorer, &gapped, PredictionMode::Absolute).unwrap();
    assert!(absolute[220..230].iter().all(|&v| v == delta(21)));
}

#[test]
fn overlapping_chunks_average_to_the_same_values() {
    let windower = ChunkWindower::new(10, Some(3)).unwrap();
    let mut scorer = identity;
    let seq =
        predict_video(&windower, &mut scorer, &manifest(None), PredictionMode::Absolute).unwrap();
    for i in 0..23 {
        assert_eq!(seq[i * 10], delta(i));
    }
}

#[test]
fn output_is_fitted_to_ground_truth_length() {
    let windower = ChunkWindower::new(10, None).unwrap();
    let mut scorer = identity;
    let seq =
        predict_video(&windower, &mut scorer, &manifest(None), PredictionMode::Absolute).unwrap();
    let last = *seq.last().unwrap();

    let padded = fit_to_length(seq.clone(), 233);
    assert_eq!(&padded[230..], &[last, last, last]);

    let trimmed = fit_to_length(seq.clone(), 227);
    assert_eq!(trimmed, seq[..227].to_vec());
}

#[test]
fn run_writes_one_csv_per_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifests = dir.path().join("Utterances");
    let annotations = dir.path().join("Annotations");
    std::fs::create_dir_all(&manifests).unwrap();
    std::fs::create_dir_all(&annotations).unwrap();

    manifest(None)
        .write_json_file(&manifests.join("Subject_1_Story_1.json"))
        .unwrap();
    manifest(Some(3))
        .write_json_file(&manifests.join("Subject_1_Story_2.json"))
        .unwrap();
    let header = ["valence".to_string()];
    for (name, frames) in [("Subject_1_Story_1.csv", 233), ("Subject_1_Story_2.csv", 227)] {
        write_csv_table(&annotations.join(name), &header, &Array2::zeros((frames, 1))).unwrap();
    }

    let config = PredictConfig {
        manifest_dir: manifests,
        annotation_dir: annotations,
        output_root: dir.path().join("predictions"),
        model_name: "model_1542296294_999".to_string(),
        chunk_size: 10,
        chunk_step: -1,
        mode: PredictionMode::Absolute,
    };
    let mut scorer = LinearScorer {
        weights: vec![1.0, 0.0],
        bias: 0.0,
    };
    let summary = predict::run(&config, &mut scorer).unwrap();

    assert_eq!(summary.videos, vec!["Subject_1_Story_1", "Subject_1_Story_2"]);
    assert!(summary.output_dir.ends_with("1542296294_999_utter_chunk_attention"));

    let first = load_table(&summary.output_dir.join("Subject_1_Story_1.csv")).unwrap();
    assert_eq!(first.nrows(), 233);
    assert_eq!(first[[232, 0]], delta(22));

    let second = load_table(&summary.output_dir.join("Subject_1_Story_2.csv")).unwrap();
    assert_eq!(second.nrows(), 227);
    // utterance 3 has no embedding and repeats utterance 2
    assert_eq!(second[[35, 0]], delta(2));
}
