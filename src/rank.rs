// file: rank.rs
// desc: top-k ranking of classifier probabilities

use serde::{Deserialize, Serialize};

use crate::labels::LabelVocabulary;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub character: char,
    pub probability: f32,
    /// `probability * 100` with one decimal, e.g. `"67.9"`
    pub percentage: String,
}

/// Rank labels by probability, highest first, and keep the first `k`.
///
/// Equal probabilities keep label index order. NaN ranks below every number
/// and is reported as 0.
/// Only indices present in both `probabilities` and `vocabulary` are ranked.
pub fn rank(probabilities: &[f32], vocabulary: &LabelVocabulary, k: usize) -> Vec<RecognitionResult> {
    if k == 0 {
        return Vec::new();
    }

    // NaN is reported as 0.0 but still sorts after a real 0.0
    let sort_key = |p: f32| if p.is_nan() { f32::NEG_INFINITY } else { p };

    let mut scored: Vec<(usize, f32)> = probabilities
        .iter()
        .take(vocabulary.len())
        .copied()
        .enumerate()
        .collect();

    // stable: ties stay in index order
    scored.sort_by(|a, b| sort_key(b.1).total_cmp(&sort_key(a.1)));

    scored
        .into_iter()
        .take(k)
        .filter_map(|(index, probability)| {
            let character = vocabulary.get(index)?;
            let probability = if probability.is_nan() { 0.0 } else { probability };
            Some(RecognitionResult {
                character,
                probability,
                percentage: format_percentage(probability),
            })
        })
        .collect()
}

/// Percent with one decimal, rounding half away from zero.
pub fn format_percentage(probability: f32) -> String {
    let percent = f64::from(probability) * 100.0;
    let rounded = (percent * 10.0).round() / 10.0;
    format!("{rounded:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vocab(chars: &str) -> LabelVocabulary {
        chars.chars().collect()
    }

    #[test]
    fn picks_top_two() {
        let results = rank(&[0.1, 0.7, 0.2], &vocab("一二三"), 2);
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.character, r.percentage.as_str()))
            .collect();
        assert_eq!(summary, vec![('二', "70.0"), ('三', "20.0")]);
    }

    #[test]
    fn zero_k_is_empty() {
        assert!(rank(&[0.5, 0.5], &vocab("一二"), 0).is_empty());
    }

    #[test]
    fn large_k_returns_everything() {
        let results = rank(&[0.2, 0.3, 0.5], &vocab("上中下"), 50);
        let chars: String = results.iter().map(|r| r.character).collect();
        assert_eq!(chars, "下中上");
    }

    #[test]
    fn ties_keep_index_order() {
        let results = rank(&[0.25, 0.25, 0.5, 0.25], &vocab("abcd"), 4);
        let chars: String = results.iter().map(|r| r.character).collect();
        assert_eq!(chars, "cabd");
    }

    #[test]
    fn nan_sinks_to_the_bottom() {
        let results = rank(&[f32::NAN, 0.0, 0.9], &vocab("xyz"), 3);
        let chars: String = results.iter().map(|r| r.character).collect();
        assert_eq!(chars, "zyx");

        let sunk = &results[2];
        assert_eq!(sunk.probability, 0.0);
        assert_eq!(sunk.percentage, "0.0");
    }

    #[test]
    fn formats_one_decimal() {
        assert_eq!(format_percentage(0.6789), "67.9");
        assert_eq!(format_percentage(0.7), "70.0");
        assert_eq!(format_percentage(1.0), "100.0");
        assert_eq!(format_percentage(0.0), "0.0");
        assert_eq!(format_percentage(0.00004), "0.0");
        assert_eq!(format_percentage(0.125), "12.5");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // 0.0625 is exact in binary: 6.25% -> 6.3
        assert_eq!(format_percentage(0.0625), "6.3");
    }

    proptest! {
        #[test]
        fn length_is_min_of_k_and_vocabulary(
            probs in prop::collection::vec(0.0f32..1.0, 0..40),
            k in 0usize..60,
        ) {
            let labels: LabelVocabulary = (0..probs.len())
                .map(|i| char::from_u32(0x4E00 + i as u32).unwrap())
                .collect();
            let results = rank(&probs, &labels, k);
            prop_assert_eq!(results.len(), k.min(labels.len()));
        }

        #[test]
        fn output_is_a_stable_descending_sort(
            probs in prop::collection::vec(prop::sample::select(vec![0.0f32, 0.1, 0.25, 0.5]), 1..30),
        ) {
            let labels: LabelVocabulary = (0..probs.len())
                .map(|i| char::from_u32(0x4E00 + i as u32).unwrap())
                .collect();
            let results = rank(&probs, &labels, probs.len());

            for pair in results.windows(2) {
                prop_assert!(pair[0].probability >= pair[1].probability);
                if pair[0].probability == pair[1].probability {
                    let a = labels.index_of(pair[0].character).unwrap();
                    let b = labels.index_of(pair[1].character).unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
