//! Batched request/result lifecycle for region-of-interest inference.
//!
//! A [`LifecycleManager`] buffers crops of a video frame, submits them as one
//! batch to an [`InferenceAdapter`] that computes off the pipeline thread, and
//! reconciles the outputs back to their frame locations through a
//! [`ResultDecoder`]. The decoded results of the latest cycle can be queried by
//! index or by a [`Filter`] expression.

pub mod adapter;
pub mod component;
pub mod decoder;
pub mod errors;
pub mod filter;
pub mod geometry;
pub mod manager;
pub mod metrics;
pub mod store;

pub use adapter::{BatchHandle, InferenceAdapter, Region};
pub use component::{AsyncInferenceComponent, OutputSink};
pub use decoder::{DecodePolicy, HasLocation, ResultDecoder};
pub use errors::{AdapterError, DecodeError, LifecycleError};
pub use filter::{FieldKind, FieldValue, Filter, FilterError, Filterable};
pub use geometry::{FrameBounds, Rect};
pub use manager::{FetchMode, LifecycleManager, LifecycleState, ManagerConfig};
pub use store::ResultStore;
