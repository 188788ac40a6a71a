// file: pipeline.rs
// desc: drawing-to-candidates and history flows through the public API

use burn::backend::ndarray::NdArray;
use burn::tensor::Tensor;
use kanji_doodle_rs::config::HistoryLimits;
use kanji_doodle_rs::history::HistoryItem;
use kanji_doodle_rs::inference::{BurnClassifier, ImageModel, ModelProfile, OutputKind};
use kanji_doodle_rs::preprocess::{BoundingBox, canonicalize, extract_bounds};
use kanji_doodle_rs::readings::{Readings, ReadingsTable};
use kanji_doodle_rs::storage::{HistoryStore, MemoryDocumentStore, MemoryStore};
use kanji_doodle_rs::{Raster, RecognizeError, Recognizer};

type TestBackend = NdArray<f32>;

struct FixedScores(Vec<f32>);

impl ImageModel<TestBackend> for FixedScores {
    fn forward(&self, _input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
        Tensor::<TestBackend, 1>::from_floats(self.0.as_slice(), &Default::default())
            .reshape([1, self.0.len()])
    }
}

/// 100x100 white RGBA canvas with a black square over 40..=60 on both axes.
fn square_drawing() -> Vec<u8> {
    let mut data = vec![255u8; 100 * 100 * 4];
    for y in 40..=60 {
        for x in 40..=60 {
            let i = (y * 100 + x) * 4;
            data[i..i + 3].fill(0);
        }
    }
    data
}

async fn loaded_recognizer() -> Recognizer<BurnClassifier<TestBackend>> {
    let recognizer = Recognizer::new(ModelProfile::ICHISADASHIOKO);
    recognizer
        .load(|| async {
            Ok(BurnClassifier::new(
                FixedScores(vec![0.1, 0.7, 0.2]),
                Default::default(),
                "一二三".chars().collect(),
                OutputKind::Probabilities,
            ))
        })
        .await
        .unwrap();
    recognizer
}

#[test]
fn square_is_centred_in_the_canonical_tensor() {
    let data = square_drawing();
    let raster = Raster::rgba(&data, 100, 100).unwrap();

    let bounds = extract_bounds(&raster).unwrap();
    assert_eq!(
        bounds,
        BoundingBox {
            min_x: 40,
            min_y: 40,
            max_x: 60,
            max_y: 60
        }
    );

    let tensor = canonicalize(&raster, &bounds, 64);
    assert_eq!(tensor.edge(), 64);
    assert!(tensor.values().iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(tensor.value(0, 0), 0.0);
    assert!(tensor.value(32, 32) > 0.99);

    let (mut cx, mut cy) = (0.0, 0.0);
    for y in 0..64 {
        for x in 0..64 {
            cx += x as f32 * tensor.value(x, y);
            cy += y as f32 * tensor.value(x, y);
        }
    }
    let mass = tensor.mass();
    assert!((cx / mass - 31.5).abs() < 1.5);
    assert!((cy / mass - 31.5).abs() < 1.5);
}

#[tokio::test]
async fn drawing_yields_ranked_candidates() {
    let recognizer = loaded_recognizer().await;
    let data = square_drawing();
    let raster = Raster::rgba(&data, 100, 100).unwrap();

    let results = recognizer.recognize(&raster, 2).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!((results[0].character, results[0].percentage.as_str()), ('二', "70.0"));
    assert_eq!((results[1].character, results[1].percentage.as_str()), ('三', "20.0"));

    let info = recognizer.model_info();
    assert_eq!(info.character_count, 3);
    assert_eq!(info.input_size, 64);
    assert!(recognizer.supports_character('一'));
}

#[tokio::test]
async fn blank_canvas_has_no_candidates() {
    let recognizer = loaded_recognizer().await;
    let data = vec![255u8; 100 * 100 * 4];
    let raster = Raster::rgba(&data, 100, 100).unwrap();
    assert!(recognizer.recognize(&raster, 5).unwrap().is_empty());
}

#[test]
fn truncated_canvas_is_rejected() {
    let data = vec![255u8; 10];
    assert!(matches!(
        Raster::rgba(&data, 100, 100),
        Err(RecognizeError::InvalidRaster { .. })
    ));
}

#[tokio::test]
async fn saved_candidates_keep_one_entry_per_character() {
    let readings: ReadingsTable = [(
        '二',
        Readings {
            on: vec!["ニ".into()],
            kun: vec!["ふた".into()],
        },
    )]
    .into_iter()
    .collect();
    let text = readings.get('二').map(Readings::display_text).unwrap_or_default();
    assert_eq!(text, "音: ニ / 訓: ふた");

    let store: HistoryStore<MemoryStore, MemoryDocumentStore> =
        HistoryStore::local(MemoryStore::new(), HistoryLimits::default());
    store.add_to_history(None, HistoryItem::new('二', text.clone(), 1)).await;
    store.add_to_history(None, HistoryItem::new('三', "", 2)).await;
    let history = store.add_to_history(None, HistoryItem::new('二', text, 3)).await;

    let chars: String = history.iter().map(|h| h.character).collect();
    assert_eq!(chars, "二三");
    assert_eq!(history[0].saved_at, 3);
}
