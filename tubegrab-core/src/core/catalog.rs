use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::media::{EncodingDescriptor, FormatCatalog, MediaInfo, MediaMetadata};

const PREFERRED_CONTAINER: &str = "mp4";

/// Builds the catalog for a resolved media item.
///
/// Entries are normalized, then grouped by `(container, height)`; each group
/// keeps only its largest entry, the first one reported winning ties.
pub fn build_catalog(info: &MediaInfo, requested_url: &str) -> FormatCatalog {
    let metadata = MediaMetadata::from_info(info, requested_url);
    let encodings = select_best(info.formats.iter().filter_map(EncodingDescriptor::from_raw));
    tracing::debug!(
        "catalog for '{}': {} raw formats -> {} encodings",
        metadata.title,
        info.formats.len(),
        encodings.len()
    );
    FormatCatalog::from_parts(metadata, encodings)
}

fn select_best(entries: impl Iterator<Item = EncodingDescriptor>) -> Vec<EncodingDescriptor> {
    let mut best: Vec<EncodingDescriptor> = Vec::new();
    let mut slots: HashMap<(String, Option<u32>), usize> = HashMap::new();

    for entry in entries {
        let key = (entry.container_ext.clone(), entry.height_px);
        match slots.get(&key) {
            Some(&idx) => {
                if entry.estimated_size_bytes > best[idx].estimated_size_bytes {
                    best[idx] = entry;
                }
            }
            None => {
                slots.insert(key, best.len());
                best.push(entry);
            }
        }
    }

    best.sort_by(presentation_order);
    best
}

/// `mp4` first, other containers alphabetically; inside a container tallest
/// first with audio-only (no height) last.
fn presentation_order(a: &EncodingDescriptor, b: &EncodingDescriptor) -> Ordering {
    let rank = |e: &EncodingDescriptor| e.container_ext != PREFERRED_CONTAINER;
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.container_ext.cmp(&b.container_ext))
        .then_with(|| match (a.height_px, b.height_px) {
            (Some(ha), Some(hb)) => hb.cmp(&ha),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}
