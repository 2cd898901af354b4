use std::collections::HashMap;
use std::path::PathBuf;

use tubegrab_core::core::progress::format_size;
use tubegrab_core::core::registry::{RegistryKey, TaskRegistry};
use tubegrab_core::{DownloadProgress, EncodingDescriptor, Event, FormatCatalog, TaskHandle, TaskId};

/// Formats picked from a catalog, plus requested ids the catalog lacks.
#[derive(Debug, Default, PartialEq)]
pub struct Selection {
    pub formats: Vec<EncodingDescriptor>,
    pub unknown: Vec<String>,
}

/// Resolves requested format ids against `catalog`; no request means the
/// catalog's first entry.
pub fn select_formats(catalog: &FormatCatalog, requested: &[String]) -> Selection {
    if requested.is_empty() {
        return Selection {
            formats: catalog.encodings().first().cloned().into_iter().collect(),
            unknown: Vec::new(),
        };
    }

    let mut selection = Selection::default();
    for id in requested {
        match catalog.get(id) {
            Some(encoding) => selection.formats.push(encoding.clone()),
            None => selection.unknown.push(id.clone()),
        }
    }
    selection
}

pub fn render_catalog(catalog: &FormatCatalog) -> String {
    let meta = catalog.metadata();
    let mut out = format!("{}\n", meta.title);
    if let Some(channel) = &meta.channel {
        out.push_str(&format!("  by {channel}\n"));
    }
    for encoding in catalog.encodings() {
        let size = encoding
            .estimated_size_bytes
            .map(format_size)
            .unwrap_or_else(|| "?".to_string());
        let kind = match (encoding.has_video, encoding.has_audio) {
            (true, true) => "video+audio",
            (true, false) => "video",
            _ => "audio",
        };
        out.push_str(&format!(
            "  {:<8} {:<5} {:<19} {:>10}  {}\n",
            encoding.format_id,
            encoding.container_ext,
            encoding.resolution_label(),
            size,
            kind
        ));
    }
    out
}

pub fn render_progress(label: &str, progress: &DownloadProgress) -> String {
    let stream = if progress.is_single_stream_format {
        ""
    } else if progress.is_primary_stream {
        " (video)"
    } else {
        " (audio)"
    };
    format!(
        "{label}{stream}: {:5.1}%  {}",
        progress.percent, progress.eta_display
    )
}

struct Tracked {
    key: RegistryKey,
    label: String,
}

#[derive(Debug, Default)]
pub struct Summary {
    pub completed: Vec<PathBuf>,
    pub failed: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Follows submitted downloads to their terminal events and frees their
/// registry keys.
#[derive(Default)]
pub struct Console {
    downloads: HashMap<TaskId, Tracked>,
    summary: Summary,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, handle: &TaskHandle) {
        let key = handle.key().clone();
        let label = format!("{} [{}]", key.media_title, key.format_id);
        self.downloads.insert(handle.id(), Tracked { key, label });
    }

    pub fn is_idle(&self) -> bool {
        self.downloads.is_empty()
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn into_summary(self) -> Summary {
        self.summary
    }

    /// Applies one download event. Returns the line to show, if any.
    pub fn on_event(&mut self, event: &Event, registry: &TaskRegistry) -> Option<String> {
        match event {
            Event::DownloadProgress(progress) => {
                let tracked = self.downloads.get(&progress.task_id)?;
                Some(render_progress(&tracked.label, progress))
            }
            Event::DownloadFinished { task_id, final_path } => {
                let tracked = self.settle(*task_id, registry)?;
                self.summary.completed.push(final_path.clone());
                Some(format!("{}: saved to {}", tracked.label, final_path.display()))
            }
            Event::DownloadFailed { task_id, message } => {
                let tracked = self.settle(*task_id, registry)?;
                self.summary.failed += 1;
                Some(format!("{}: failed: {message}", tracked.label))
            }
            Event::DownloadCancelled { task_id } => {
                let tracked = self.settle(*task_id, registry)?;
                self.summary.cancelled += 1;
                Some(format!("{}: cancelled", tracked.label))
            }
            _ => None,
        }
    }

    fn settle(&mut self, task_id: TaskId, registry: &TaskRegistry) -> Option<Tracked> {
        let tracked = self.downloads.remove(&task_id)?;
        registry.release(&tracked.key);
        Some(tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tubegrab_core::core::catalog::build_catalog;
    use tubegrab_core::core::engine::{DownloadRequest, Engine, EngineConfig, EngineHooks};
    use tubegrab_core::error::EngineError;
    use tubegrab_core::models::media::{MediaInfo, RawFormat};
    use tubegrab_core::{ChannelEmitter, Dispatcher, DownloadSpec};

    struct IdleEngine;

    impl Engine for IdleEngine {
        fn name(&self) -> &str {
            "idle"
        }

        fn extract(&self, _url: &str, _config: &EngineConfig) -> Result<MediaInfo, EngineError> {
            Ok(MediaInfo::default())
        }

        fn download(
            &self,
            request: &DownloadRequest<'_>,
            _hooks: &mut dyn EngineHooks,
        ) -> Result<(), EngineError> {
            std::fs::write(request.output.current(), b"media")?;
            Ok(())
        }
    }

    fn encoding(id: &str, height: Option<u32>, ext: &str) -> EncodingDescriptor {
        EncodingDescriptor {
            format_id: id.into(),
            container_ext: ext.into(),
            height_px: height,
            estimated_size_bytes: Some(1_500_000),
            has_video: height.is_some(),
            has_audio: height.is_none(),
        }
    }

    fn progress(task_id: TaskId) -> DownloadProgress {
        DownloadProgress {
            task_id,
            percent: 42.0,
            eta_display: "00:00:10".into(),
            is_single_stream_format: false,
            is_primary_stream: false,
        }
    }

    fn raw(id: &str, ext: &str, height: Option<u32>, vcodec: &str, acodec: &str) -> RawFormat {
        RawFormat {
            format_id: Some(id.into()),
            ext: Some(ext.into()),
            height,
            filesize: Some(1_500_000.0),
            vcodec: Some(vcodec.into()),
            acodec: Some(acodec.into()),
            ..RawFormat::default()
        }
    }

    fn catalog() -> FormatCatalog {
        let info = MediaInfo {
            title: Some("Clip".into()),
            channel: Some("Chan".into()),
            formats: vec![
                raw("136", "mp4", Some(720), "avc1", "none"),
                raw("137", "mp4", Some(1080), "avc1", "none"),
                raw("140", "m4a", None, "none", "mp4a"),
            ],
            ..MediaInfo::default()
        };
        build_catalog(&info, "https://example.com/v")
    }

    #[test]
    fn no_request_selects_first_entry() {
        let selection = select_formats(&catalog(), &[]);
        assert_eq!(selection.formats.len(), 1);
        assert_eq!(selection.formats[0].format_id, "137");
        assert!(selection.unknown.is_empty());
    }

    #[test]
    fn unknown_ids_are_reported() {
        let requested = vec!["140".to_string(), "999".to_string(), "136".to_string()];
        let selection = select_formats(&catalog(), &requested);
        let ids: Vec<&str> = selection.formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["140", "136"]);
        assert_eq!(selection.unknown, vec!["999".to_string()]);
    }

    #[test]
    fn catalog_rows_show_size_and_kind() {
        let text = render_catalog(&catalog());
        assert!(text.starts_with("Clip\n  by Chan\n"));
        assert!(text.contains("1080p"));
        assert!(text.contains("1.43 MB"));
        assert!(text.contains("Unknown_resolution"));
    }

    #[test]
    fn progress_line_names_the_stream() {
        assert_eq!(
            render_progress("Clip [137]", &progress(1)),
            "Clip [137] (audio):  42.0%  00:00:10"
        );
    }

    #[tokio::test]
    async fn terminal_event_releases_registry_key() {
        let dir = tempfile::tempdir().unwrap();
        let (emitter, mut rx) = ChannelEmitter::new();
        let dispatcher = Dispatcher::new(Arc::new(IdleEngine), EngineConfig::default(), emitter, 1);
        let handle = dispatcher
            .submit_download(DownloadSpec {
                url: "https://example.com/v".into(),
                media_title: "Clip".into(),
                format: encoding("137", Some(1080), "mp4"),
                destination_dir: dir.path().to_path_buf(),
            })
            .unwrap();

        let mut console = Console::new();
        console.track(&handle);
        while !console.is_idle() {
            let event = rx.recv().await.unwrap();
            console.on_event(&event, dispatcher.registry());
        }

        assert!(dispatcher.registry().is_empty());
        assert_eq!(console.summary().completed, vec![dir.path().join("Clip_1080p.mp4")]);
        assert!(console.summary().success());
    }

    #[test]
    fn untracked_events_are_ignored() {
        let registry = TaskRegistry::new();
        let mut console = Console::new();
        assert_eq!(
            console.on_event(&Event::DownloadProgress(progress(9)), &registry),
            None
        );
        assert_eq!(
            console.on_event(&Event::DownloadCancelled { task_id: 9 }, &registry),
            None
        );
        assert_eq!(console.summary().cancelled, 0);
    }
}
