// file: inference.rs
// desc: classifier adapter over burn and the recognition facade

use std::future::Future;

use burn::tensor::{Tensor, activation::softmax, backend::Backend};
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::RecognizeError;
use crate::labels::LabelVocabulary;
use crate::preprocess::{CanonicalTensor, PreprocessConfig, Raster, canonicalize_with, extract_bounds_with};
use crate::rank::{RecognitionResult, rank};

/// What a network produces in its last layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Probabilities,
    /// Raw scores; softmax is applied by the adapter.
    Logits,
}

/// Static description of a classifier build and the input contract it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    pub name: &'static str,
    pub version: &'static str,
    pub preprocess: PreprocessConfig,
    pub output: OutputKind,
}

impl ModelProfile {
    /// ichisadashioko/kanji-recognition, 64x64 grayscale input with a softmax head.
    pub const ICHISADASHIOKO: ModelProfile = ModelProfile {
        name: "ichisadashioko/kanji-recognition",
        version: "v3",
        preprocess: PreprocessConfig {
            input_edge: 64,
            padding: crate::preprocess::CROP_PADDING,
            ink_threshold: crate::preprocess::INK_THRESHOLD,
        },
        output: OutputKind::Probabilities,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub character_count: usize,
    pub input_size: usize,
}

/// A loaded classifier. `predict` returns one probability per vocabulary entry,
/// in vocabulary order.
pub trait Classifier {
    fn vocabulary(&self) -> &LabelVocabulary;

    fn predict(&self, input: &CanonicalTensor) -> Result<Vec<f32>, RecognizeError>;
}

/// Network forward pass over an `N x S x S x 1` batch, producing `N x labels`.
pub trait ImageModel<B: Backend> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Classifier backed by a burn module.
pub struct BurnClassifier<B: Backend> {
    model: Box<dyn ImageModel<B>>,
    device: B::Device,
    vocabulary: LabelVocabulary,
    output: OutputKind,
}

impl<B: Backend> BurnClassifier<B> {
    pub fn new(
        model: impl ImageModel<B> + 'static,
        device: B::Device,
        vocabulary: LabelVocabulary,
        output: OutputKind,
    ) -> Self {
        Self {
            model: Box::new(model),
            device,
            vocabulary,
            output,
        }
    }

    fn input_tensor(&self, input: &CanonicalTensor) -> Tensor<B, 4> {
        let edge = input.edge();
        Tensor::<B, 1>::from_floats(input.values(), &self.device).reshape([1, edge, edge, 1])
    }
}

impl<B: Backend> Classifier for BurnClassifier<B> {
    fn vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    fn predict(&self, input: &CanonicalTensor) -> Result<Vec<f32>, RecognizeError> {
        // tensors are dropped when this scope ends, on every path
        let output = self.model.forward(self.input_tensor(input));
        let output = match self.output {
            OutputKind::Probabilities => output,
            OutputKind::Logits => softmax(output, 1),
        };

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| RecognizeError::Inference(format!("{e:?}")))
    }
}

/// Recognition facade: owns the model handle and runs
/// bounds -> canonical tensor -> classifier -> ranking.
pub struct Recognizer<C> {
    profile: ModelProfile,
    classifier: OnceCell<C>,
}

impl<C: Classifier> Recognizer<C> {
    pub fn new(profile: ModelProfile) -> Self {
        Self {
            profile,
            classifier: OnceCell::new(),
        }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    /// Load the classifier once. Concurrent callers wait for the same load;
    /// once loaded, `loader` is never run again. A failed load leaves the
    /// recognizer unloaded so it can be retried.
    pub async fn load<F, Fut>(&self, loader: F) -> Result<&C, RecognizeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, RecognizeError>>,
    {
        self.classifier
            .get_or_try_init(|| async move {
                log::info!("Loading classifier {} {}", self.profile.name, self.profile.version);
                let classifier = loader().await?;
                log::info!(
                    "Classifier ready with {} labels",
                    classifier.vocabulary().len()
                );
                Ok(classifier)
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.initialized()
    }

    /// Release the model handle. A later `load` loads again.
    pub fn unload(&mut self) -> Option<C> {
        self.classifier.take()
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.profile.name.to_string(),
            version: self.profile.version.to_string(),
            character_count: self
                .classifier
                .get()
                .map_or(0, |c| c.vocabulary().len()),
            input_size: self.profile.preprocess.input_edge,
        }
    }

    pub fn supports_character(&self, c: char) -> bool {
        self.classifier
            .get()
            .is_some_and(|classifier| classifier.vocabulary().contains(c))
    }

    /// Top `k` candidates for the drawing. An empty canvas yields an empty list.
    pub fn recognize(
        &self,
        raster: &Raster<'_>,
        k: usize,
    ) -> Result<Vec<RecognitionResult>, RecognizeError> {
        let classifier = self.classifier.get().ok_or(RecognizeError::NotLoaded)?;
        let config = &self.profile.preprocess;

        let Some(bounds) = extract_bounds_with(raster, config.ink_threshold) else {
            log::debug!("No ink on canvas, skipping inference");
            return Ok(Vec::new());
        };

        let input = canonicalize_with(raster, &bounds, config);
        let probabilities = classifier.predict(&input)?;
        drop(input);

        let vocabulary = classifier.vocabulary();
        if probabilities.len() != vocabulary.len() {
            return Err(RecognizeError::OutputMismatch {
                expected: vocabulary.len(),
                actual: probabilities.len(),
            });
        }

        Ok(rank(&probabilities, vocabulary, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use std::cell::Cell;

    type TestBackend = NdArray<f32>;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    struct FixedScores(Vec<f32>);

    impl ImageModel<TestBackend> for FixedScores {
        fn forward(&self, input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            assert_eq!(input.dims(), [1, 64, 64, 1]);
            Tensor::<TestBackend, 1>::from_floats(self.0.as_slice(), &device())
                .reshape([1, self.0.len()])
        }
    }

    // label 0 scores the ink mass, label 1 the empty area
    struct InkMass;

    impl ImageModel<TestBackend> for InkMass {
        fn forward(&self, input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            let [_, h, w, _] = input.dims();
            let ink = input.sum().reshape([1, 1]);
            let blank = ink.clone().neg().add_scalar((h * w) as f32);
            Tensor::cat(vec![ink, blank], 1)
        }
    }

    fn drawing() -> Vec<u8> {
        let mut data = vec![255u8; 100 * 100 * 4];
        for y in 40..=60 {
            for x in 40..=60 {
                let i = (y * 100 + x) * 4;
                data[i..i + 3].fill(0);
            }
        }
        data
    }

    fn recognizer_with(
        model: impl ImageModel<TestBackend> + 'static,
        labels: &str,
        output: OutputKind,
    ) -> Recognizer<BurnClassifier<TestBackend>> {
        let recognizer = Recognizer::new(ModelProfile::ICHISADASHIOKO);
        let classifier = BurnClassifier::new(model, device(), labels.chars().collect(), output);
        recognizer
            .classifier
            .set(classifier)
            .unwrap_or_else(|_| panic!("fresh recognizer"));
        recognizer
    }

    #[test]
    fn recognize_before_load_fails() {
        let recognizer: Recognizer<BurnClassifier<TestBackend>> =
            Recognizer::new(ModelProfile::ICHISADASHIOKO);
        let data = drawing();
        let raster = Raster::rgba(&data, 100, 100).unwrap();
        assert!(matches!(
            recognizer.recognize(&raster, 5),
            Err(RecognizeError::NotLoaded)
        ));
        assert_eq!(recognizer.model_info().character_count, 0);
    }

    #[test]
    fn ranks_model_output() {
        let recognizer = recognizer_with(
            FixedScores(vec![0.1, 0.7, 0.2]),
            "一二三",
            OutputKind::Probabilities,
        );
        let data = drawing();
        let raster = Raster::rgba(&data, 100, 100).unwrap();

        let results = recognizer.recognize(&raster, 2).unwrap();
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.character, r.percentage.as_str()))
            .collect();
        assert_eq!(summary, vec![('二', "70.0"), ('三', "20.0")]);
    }

    #[test]
    fn blank_canvas_short_circuits() {
        let recognizer = recognizer_with(
            FixedScores(vec![1.0, 0.0]),
            "一二",
            OutputKind::Probabilities,
        );
        let data = vec![255u8; 100 * 100 * 4];
        let raster = Raster::rgba(&data, 100, 100).unwrap();
        assert!(recognizer.recognize(&raster, 5).unwrap().is_empty());
    }

    #[test]
    fn logits_are_softmaxed() {
        let recognizer = recognizer_with(
            FixedScores(vec![0.0, 0.0, 0.0, 0.0]),
            "春夏秋冬",
            OutputKind::Logits,
        );
        let data = drawing();
        let raster = Raster::rgba(&data, 100, 100).unwrap();
        let results = recognizer.recognize(&raster, 4).unwrap();
        assert!(results.iter().all(|r| r.percentage == "25.0"));
        let chars: String = results.iter().map(|r| r.character).collect();
        assert_eq!(chars, "春夏秋冬");
    }

    #[test]
    fn canonical_tensor_reaches_the_model() {
        let recognizer = recognizer_with(InkMass, "墨白", OutputKind::Logits);
        let data = drawing();
        let raster = Raster::rgba(&data, 100, 100).unwrap();
        let results = recognizer.recognize(&raster, 1).unwrap();
        // a filled square covers well under half of the padded frame
        assert_eq!(results[0].character, '白');
    }

    #[test]
    fn mismatched_output_is_reported() {
        let recognizer = recognizer_with(
            FixedScores(vec![0.5, 0.5]),
            "一二三",
            OutputKind::Probabilities,
        );
        let data = drawing();
        let raster = Raster::rgba(&data, 100, 100).unwrap();
        assert!(matches!(
            recognizer.recognize(&raster, 3),
            Err(RecognizeError::OutputMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn load_runs_once() {
        let recognizer: Recognizer<BurnClassifier<TestBackend>> =
            Recognizer::new(ModelProfile::ICHISADASHIOKO);
        let calls = Cell::new(0);
        let counter = &calls;
        let loader = move || async move {
            counter.set(counter.get() + 1);
            Ok(BurnClassifier::new(
                FixedScores(vec![1.0]),
                device(),
                "一".chars().collect(),
                OutputKind::Probabilities,
            ))
        };

        let (a, b) = tokio::join!(recognizer.load(loader), recognizer.load(loader));
        assert!(a.is_ok() && b.is_ok());
        recognizer.load(loader).await.unwrap();

        assert_eq!(calls.get(), 1);
        assert!(recognizer.is_loaded());
        assert!(recognizer.supports_character('一'));
        assert!(!recognizer.supports_character('二'));
        assert_eq!(recognizer.model_info().character_count, 1);
        assert_eq!(recognizer.model_info().input_size, 64);
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let mut recognizer: Recognizer<BurnClassifier<TestBackend>> =
            Recognizer::new(ModelProfile::ICHISADASHIOKO);
        let failed = recognizer
            .load(|| async { Err(RecognizeError::Load("missing weights".into())) })
            .await;
        assert!(failed.is_err());
        assert!(!recognizer.is_loaded());

        recognizer
            .load(|| async {
                Ok(BurnClassifier::new(
                    FixedScores(vec![1.0]),
                    device(),
                    "一".chars().collect(),
                    OutputKind::Probabilities,
                ))
            })
            .await
            .unwrap();
        assert!(recognizer.is_loaded());

        assert!(recognizer.unload().is_some());
        assert!(!recognizer.is_loaded());
    }
}
