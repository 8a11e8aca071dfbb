//! Display-order derivation for event galleries.
//!
//! The media store has no first-class ordering, so position is encoded in
//! free-text tags of the form `order_<integer>`. Repeated reorders historically
//! appended tags instead of replacing them, so a single image may carry several
//! order tags; the numerically largest suffix is the most recently written one
//! and wins. Images without any order tag sort after every ordered image and
//! keep their relative upload order.

use serde::{Deserialize, Serialize};

use crate::store::StoredImage;

/// Reserved tag prefix. Anything else on the image is an ordinary tag.
pub const ORDER_TAG_PREFIX: &str = "order_";

/// One gallery entry, order metadata already resolved and stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImage {
    pub public_id: String,
    pub secure_url: String,
}

/// Tag written for an image at `position` during a reorder.
pub fn order_tag(position: usize) -> String {
    format!("{ORDER_TAG_PREFIX}{position}")
}

/// Resolves the effective order rank from an image's tag set.
///
/// Returns `None` when no tag parses as `order_<u32>`; stale duplicates are
/// resolved by taking the largest suffix (last writer wins).
pub fn order_rank(tags: &[String]) -> Option<u32> {
    tags.iter()
        .filter_map(|tag| {
            tag.strip_prefix(ORDER_TAG_PREFIX)
                .and_then(|suffix| suffix.parse::<u32>().ok())
        })
        .max()
}

/// Produces the display order for a set of stored images.
///
/// Ordered images sort ascending by rank; unordered images get `u32::MAX` so
/// they land after every ordered one. The sort is stable, so ties and
/// unordered images preserve the store's original sequence.
pub fn sort_by_order(mut resources: Vec<StoredImage>) -> Vec<EventImage> {
    resources.sort_by_key(|resource| order_rank(&resource.tags).unwrap_or(u32::MAX));

    resources
        .into_iter()
        .map(|resource| EventImage {
            public_id: resource.public_id,
            secure_url: resource.secure_url,
        })
        .collect()
}
