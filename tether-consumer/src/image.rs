//! Service image assets.

use serde::{Deserialize, Serialize};

/// Raw image bytes. Empty when no asset matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A candidate image of known size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub source: String,
}

/// Picks the candidate closest to `width`×`height` by squared distance.
/// Ties keep the earliest candidate.
pub fn select_closest_image(width: u32, height: u32, candidates: &[ImageInfo]) -> Option<&ImageInfo> {
    candidates.iter().min_by_key(|image| {
        let dw = i64::from(image.width) - i64::from(width);
        let dh = i64::from(image.height) - i64::from(height);
        dw * dw + dh * dh
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(size: u32, source: &str) -> ImageInfo {
        ImageInfo {
            width: size,
            height: size,
            source: source.to_string(),
        }
    }

    #[test]
    fn closest_size_wins() {
        let candidates = vec![image(34, "small"), image(64, "medium"), image(126, "large")];
        assert_eq!(select_closest_image(60, 60, &candidates).unwrap().source, "medium");
        assert_eq!(select_closest_image(300, 300, &candidates).unwrap().source, "large");
        assert_eq!(select_closest_image(0, 0, &candidates).unwrap().source, "small");
    }

    #[test]
    fn no_candidates() {
        assert!(select_closest_image(16, 16, &[]).is_none());
        assert!(ImageData::empty().is_empty());
    }
}
