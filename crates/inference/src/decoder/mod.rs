pub mod classifier;
pub mod person_attribs;

pub use classifier::{Classification, LabelClassifierDecoder};
pub use person_attribs::{PERSON_ATTRIBUTES, PersonAttribsDecoder, PersonAttributes};
