use lifecycle::{
    DecodeError, DecodePolicy, FieldKind, FieldValue, Filterable, HasLocation, Rect,
    ResultDecoder,
};
use serde::Serialize;

/// Net output order of the person attributes model.
pub const PERSON_ATTRIBUTES: [&str; 6] = [
    "is male",
    "hat",
    "longsleeves",
    "longpants",
    "longhair",
    "coatjacket",
];

const FLAG_FIELDS: [&str; 6] = [
    "is_male",
    "hat",
    "longsleeves",
    "longpants",
    "longhair",
    "coatjacket",
];

const SCHEMA: &[(&str, FieldKind)] = &[
    ("male_probability", FieldKind::Number),
    ("is_male", FieldKind::Flag),
    ("hat", FieldKind::Flag),
    ("longsleeves", FieldKind::Flag),
    ("longpants", FieldKind::Flag),
    ("longhair", FieldKind::Flag),
    ("coatjacket", FieldKind::Flag),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonAttributes {
    pub location: Rect,
    pub male_probability: f32,
    /// Attributes whose score exceeded the confidence threshold, in net order.
    pub attributes: Vec<&'static str>,
    #[serde(skip)]
    present: [bool; 6],
}

impl PersonAttributes {
    pub fn has(&self, attribute: &str) -> bool {
        PERSON_ATTRIBUTES
            .iter()
            .position(|a| *a == attribute)
            .is_some_and(|i| self.present[i])
    }

    /// Comma separated attribute names, empty when none passed the threshold.
    pub fn attributes_label(&self) -> String {
        self.attributes.join(", ")
    }
}

impl HasLocation for PersonAttributes {
    fn location(&self) -> Rect {
        self.location
    }
}

impl Filterable for PersonAttributes {
    fn schema() -> &'static [(&'static str, FieldKind)] {
        SCHEMA
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        if name == "male_probability" {
            return Some(FieldValue::Number(self.male_probability as f64));
        }
        FLAG_FIELDS
            .iter()
            .position(|f| *f == name)
            .map(|i| FieldValue::Flag(self.present[i]))
    }
}

pub struct PersonAttribsDecoder {
    confidence: f32,
}

impl PersonAttribsDecoder {
    pub fn new(confidence: f32) -> Self {
        Self { confidence }
    }
}

impl ResultDecoder for PersonAttribsDecoder {
    type Raw = Vec<f32>;
    type Output = PersonAttributes;

    fn decode(&self, raw: Vec<f32>, location: Rect) -> Result<PersonAttributes, DecodeError> {
        if raw.len() != PERSON_ATTRIBUTES.len() {
            return Err(DecodeError::Shape {
                expected: PERSON_ATTRIBUTES.len(),
                actual: raw.len(),
            });
        }
        if let Some(bad) = raw.iter().find(|s| !s.is_finite()) {
            return Err(DecodeError::InvalidValue(format!("non-finite score {bad}")));
        }

        let mut present = [false; 6];
        let mut attributes = Vec::new();
        for (i, score) in raw.iter().enumerate() {
            if *score > self.confidence {
                present[i] = true;
                attributes.push(PERSON_ATTRIBUTES[i]);
            }
        }

        Ok(PersonAttributes {
            location,
            male_probability: raw[0],
            attributes,
            present,
        })
    }

    fn policy(&self) -> DecodePolicy {
        DecodePolicy::FailBatch
    }
}
