use crate::errors::DecodeError;
use crate::filter::Filterable;
use crate::geometry::Rect;

/// How a fetch treats a raw output that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Any decode failure discards the whole batch.
    #[default]
    FailBatch,
    /// Undecodable items are logged and dropped; the rest are committed in
    /// submission order.
    SkipItem,
}

/// Decoded payloads carry the location of the crop they came from.
pub trait HasLocation {
    fn location(&self) -> Rect;
}

/// Model-specific conversion from a raw adapter output to a typed result.
pub trait ResultDecoder {
    type Raw;
    type Output: HasLocation + Filterable;

    fn decode(&self, raw: Self::Raw, location: Rect) -> Result<Self::Output, DecodeError>;

    fn policy(&self) -> DecodePolicy {
        DecodePolicy::FailBatch
    }
}
