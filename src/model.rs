// file: model.rs
// desc: bundled kanji classifier generated from model/kanji.onnx at build time

use burn::backend::ndarray::NdArray;

use crate::error::RecognizeError;
use crate::inference::{BurnClassifier, ModelProfile};
use crate::readings::ReadingsTable;

pub type AppBackend = NdArray<f32>;
pub type BundledClassifier = BurnClassifier<AppBackend>;

#[cfg(kanji_model)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/model/kanji.rs"));
}

#[cfg(kanji_model)]
const LABELS: &str = include_str!("../model/labels.txt");

#[cfg(kanji_model)]
impl crate::inference::ImageModel<AppBackend> for generated::Model<AppBackend> {
    fn forward(&self, input: burn::tensor::Tensor<AppBackend, 4>) -> burn::tensor::Tensor<AppBackend, 2> {
        generated::Model::forward(self, input)
    }
}

/// Build the classifier embedded in this binary.
///
/// Weights are embedded by `burn-import`, so this never touches the network;
/// it is async to match the loader contract of `Recognizer::load`.
#[cfg(kanji_model)]
pub async fn load_bundled(profile: &ModelProfile) -> Result<BundledClassifier, RecognizeError> {
    use crate::labels::LabelVocabulary;

    let device = <AppBackend as burn::tensor::backend::Backend>::Device::default();
    let model: generated::Model<AppBackend> = generated::Model::default();
    let vocabulary = LabelVocabulary::from_lines(LABELS);
    if vocabulary.is_empty() {
        return Err(RecognizeError::Load("label table is empty".into()));
    }

    Ok(BurnClassifier::new(model, device, vocabulary, profile.output))
}

#[cfg(not(kanji_model))]
pub async fn load_bundled(profile: &ModelProfile) -> Result<BundledClassifier, RecognizeError> {
    log::warn!("{} was not bundled into this build", profile.name);
    Err(RecognizeError::ModelUnavailable)
}

#[cfg(kanji_readings)]
const READINGS: &str = include_str!("../model/readings.json");

/// Readings shipped next to the model; empty when none were generated.
#[cfg(kanji_readings)]
pub fn bundled_readings() -> ReadingsTable {
    ReadingsTable::from_json(READINGS).unwrap_or_else(|e| {
        log::error!("Bundled readings are malformed: {e}");
        ReadingsTable::default()
    })
}

#[cfg(not(kanji_readings))]
pub fn bundled_readings() -> ReadingsTable {
    ReadingsTable::default()
}

#[cfg(all(test, not(kanji_model)))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_missing_artifact() {
        let result = load_bundled(&ModelProfile::ICHISADASHIOKO).await;
        assert!(matches!(result, Err(RecognizeError::ModelUnavailable)));
    }
}
