use serde::{Deserialize, Serialize};

/// Media description as the engine reports it, before normalization.
///
/// Field names follow yt-dlp's `--dump-json` output so the struct can be
/// deserialized straight from it. Everything is optional: the engine omits
/// keys freely and internal code only ever sees [`EncodingDescriptor`]s.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub uploader_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
}

/// One selectable encoding of a media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingDescriptor {
    pub format_id: String,
    pub container_ext: String,
    pub height_px: Option<u32>,
    pub estimated_size_bytes: Option<u64>,
    pub has_video: bool,
    pub has_audio: bool,
}

impl EncodingDescriptor {
    /// Normalizes an engine format entry.
    ///
    /// Returns `None` for entries that carry neither a usable video stream
    /// with a known height nor an audio-only stream (storyboards, manifests
    /// without codec info and the like).
    pub fn from_raw(raw: &RawFormat) -> Option<Self> {
        let format_id = raw.format_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let container_ext = raw.ext.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

        let has_video = match raw.vcodec.as_deref() {
            Some(codec) => codec != "none",
            None => raw.height.is_some(),
        };
        let has_audio = raw.acodec.as_deref().is_some_and(|codec| codec != "none");

        let height_px = if has_video { raw.height.filter(|h| *h > 0) } else { None };
        let audio_only = !has_video && has_audio;
        if height_px.is_none() && !audio_only {
            return None;
        }

        let estimated_size_bytes = raw
            .filesize
            .or(raw.filesize_approx)
            .filter(|size| size.is_finite() && *size >= 0.0)
            .map(|size| size as u64);

        Some(Self {
            format_id: format_id.to_string(),
            container_ext: container_ext.to_string(),
            height_px,
            estimated_size_bytes,
            has_video,
            has_audio,
        })
    }

    /// Both audio and video live in this single encoding.
    ///
    /// This says nothing about whether the engine will still run a
    /// post-processing step; that is only known once it reports one.
    pub fn is_merged_format(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn resolution_label(&self) -> String {
        match self.height_px {
            Some(height) => format!("{height}p"),
            None => "Unknown_resolution".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub title: String,
    pub channel: Option<String>,
    pub channel_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub webpage_url: Option<String>,
}

impl MediaMetadata {
    pub fn from_info(info: &MediaInfo, requested_url: &str) -> Self {
        Self {
            title: info
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "untitled".to_string()),
            channel: info.channel.clone().or_else(|| info.uploader.clone()),
            channel_url: info.channel_url.clone().or_else(|| info.uploader_url.clone()),
            duration_seconds: info.duration,
            thumbnail_url: info.thumbnail.clone(),
            webpage_url: info
                .webpage_url
                .clone()
                .or_else(|| Some(requested_url.to_string())),
        }
    }
}

/// The encodings available for one resolved media item.
///
/// Built once per successful search and never mutated; a new search
/// produces a new catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatCatalog {
    metadata: MediaMetadata,
    encodings: Vec<EncodingDescriptor>,
}

impl FormatCatalog {
    pub(crate) fn from_parts(metadata: MediaMetadata, encodings: Vec<EncodingDescriptor>) -> Self {
        Self {
            metadata,
            encodings,
        }
    }

    pub fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    pub fn encodings(&self) -> &[EncodingDescriptor] {
        &self.encodings
    }

    pub fn get(&self, format_id: &str) -> Option<&EncodingDescriptor> {
        self.encodings.iter().find(|e| e.format_id == format_id)
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }
}
