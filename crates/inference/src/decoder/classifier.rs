use lifecycle::{
    DecodeError, DecodePolicy, FieldKind, FieldValue, Filterable, HasLocation, Rect,
    ResultDecoder,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub location: Rect,
    pub label: String,
    pub label_index: usize,
    pub confidence: f32,
}

impl HasLocation for Classification {
    fn location(&self) -> Rect {
        self.location
    }
}

impl Filterable for Classification {
    fn schema() -> &'static [(&'static str, FieldKind)] {
        &[("label", FieldKind::Text), ("confidence", FieldKind::Number)]
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "label" => Some(FieldValue::Text(&self.label)),
            "confidence" => Some(FieldValue::Number(self.confidence as f64)),
            _ => None,
        }
    }
}

/// Softmax over raw logits, then argmax into the configured label list.
/// Malformed outputs are skipped so one bad crop does not cost the frame.
pub struct LabelClassifierDecoder {
    labels: Vec<String>,
}

impl LabelClassifierDecoder {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl ResultDecoder for LabelClassifierDecoder {
    type Raw = Vec<f32>;
    type Output = Classification;

    fn decode(&self, raw: Vec<f32>, location: Rect) -> Result<Classification, DecodeError> {
        if raw.is_empty() || raw.len() != self.labels.len() {
            return Err(DecodeError::Shape {
                expected: self.labels.len(),
                actual: raw.len(),
            });
        }
        if raw.iter().any(|l| !l.is_finite()) {
            return Err(DecodeError::InvalidValue("non-finite logit".to_string()));
        }

        let probabilities = softmax(&raw);
        let (label_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        Ok(Classification {
            location,
            label: self.labels[label_index].clone(),
            label_index,
            confidence,
        })
    }

    fn policy(&self) -> DecodePolicy {
        DecodePolicy::SkipItem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle::Filter;

    fn decoder() -> LabelClassifierDecoder {
        LabelClassifierDecoder::new(vec!["car".into(), "bus".into(), "truck".into()])
    }

    #[test]
    fn picks_highest_logit() {
        let result = decoder()
            .decode(vec![0.5, 3.0, 1.0], Rect::new(0, 0, 10, 10))
            .unwrap();

        assert_eq!(result.label, "bus");
        assert_eq!(result.label_index, 1);
        assert!(result.confidence > 0.5 && result.confidence < 1.0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probabilities = softmax(&[1000.0, 1000.0, 999.0]);
        let sum: f32 = probabilities.iter().sum();

        assert!((sum - 1.0).abs() < 1e-5);
        assert!((probabilities[0] - probabilities[1]).abs() < 1e-6);
    }

    #[test]
    fn label_count_mismatch_is_a_shape_error() {
        let err = decoder()
            .decode(vec![1.0, 2.0], Rect::new(0, 0, 1, 1))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::Shape {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(decoder().policy(), DecodePolicy::SkipItem);
    }

    #[test]
    fn filter_by_label_and_confidence() {
        let truck = decoder()
            .decode(vec![0.0, 0.0, 5.0], Rect::new(0, 0, 1, 1))
            .unwrap();

        let filter =
            Filter::for_payload::<Classification>("label == \"truck\" && confidence > 0.9")
                .unwrap();
        assert!(filter.matches(&truck));

        let filter = Filter::for_payload::<Classification>("label != 'truck'").unwrap();
        assert!(!filter.matches(&truck));
    }
}
