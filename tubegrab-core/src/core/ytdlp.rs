//! [`Engine`] backed by the yt-dlp executable.
//!
//! Progress is read from stdout through custom `--progress-template`s, one
//! line per update (`--newline`). Stderr is collected on a side thread and
//! only inspected when the process fails.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use crate::core::engine::{
    DownloadRequest, Engine, EngineConfig, EngineHooks, HookFlow, PostprocessStatus,
    ProgressReport, TransferStatus,
};
use crate::core::process;
use crate::error::EngineError;
use crate::models::media::MediaInfo;

const PROGRESS_TAG: &str = "[tubegrab]";
const POSTPROCESS_TAG: &str = "[tubegrab-pp]";

const DOWNLOAD_TEMPLATE: &str = "download:[tubegrab] %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s";
const POSTPROCESS_TEMPLATE: &str =
    "postprocess:[tubegrab-pp] %(progress.status)s %(progress.postprocessor)s";

const STDERR_TAIL_LINES: usize = 40;

pub struct YtDlpEngine {
    binary: PathBuf,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn spawn(&self, args: &[OsString]) -> Result<Child, EngineError> {
        tracing::debug!("spawning {} {:?}", self.binary.display(), args);
        process::std_command(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                reason: format!("{}: {}", self.binary.display(), e),
            })
    }
}

impl Engine for YtDlpEngine {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn extract(&self, url: &str, config: &EngineConfig) -> Result<MediaInfo, EngineError> {
        let output = self
            .spawn(&extract_args(url, config))?
            .wait_with_output()
            .map_err(|e| EngineError::Spawn {
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, url));
        }

        serde_json::from_slice::<MediaInfo>(&output.stdout).map_err(|e| EngineError::Extraction {
            reason: format!("yt-dlp returned invalid JSON: {e}"),
        })
    }

    fn download(
        &self,
        request: &DownloadRequest<'_>,
        hooks: &mut dyn EngineHooks,
    ) -> Result<(), EngineError> {
        let output_path = request.output.current();
        let mut child = self.spawn(&download_args(request, &output_path))?;

        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Spawn {
            reason: "yt-dlp stdout not captured".to_string(),
        })?;

        let mut merging = false;
        let mut aborted = false;
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            let flow = match parse_line(&line) {
                Some(OutputLine::Progress(report)) => hooks.on_progress(&report),
                Some(OutputLine::Postprocess(PostprocessStatus::Started)) if !merging => {
                    merging = true;
                    hooks.on_postprocess(PostprocessStatus::Started)
                }
                Some(OutputLine::Postprocess(PostprocessStatus::Finished)) if merging => {
                    merging = false;
                    hooks.on_postprocess(PostprocessStatus::Finished)
                }
                _ => HookFlow::Continue,
            };
            if flow == HookFlow::Abort {
                aborted = true;
                break;
            }
        }

        if aborted {
            tracing::debug!("stopping yt-dlp after abort request");
            if let Err(e) = child.kill() {
                tracing::debug!("kill yt-dlp: {}", e);
            }
        }
        let status = child.wait().map_err(|e| EngineError::Spawn {
            reason: e.to_string(),
        })?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if aborted {
            return Err(EngineError::Aborted);
        }
        if !status.success() {
            tracing::debug!("yt-dlp exited with {}: {}", status, tail(&stderr));
            return Err(classify_failure(&stderr, request.url));
        }
        Ok(())
    }
}

fn extract_args(url: &str, config: &EngineConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["--dump-json", "--no-warnings", "--no-playlist"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push("--retries".into());
    args.push(config.retries.to_string().into());
    args.push("--".into());
    args.push(url.into());
    args
}

fn download_args(request: &DownloadRequest<'_>, output: &Path) -> Vec<OsString> {
    let config = request.config;
    let selector = config
        .format_selector
        .clone()
        .unwrap_or_else(|| format!("{}+bestaudio/best", request.format_id));

    let mut args: Vec<OsString> = vec![
        "-f".into(),
        selector.into(),
        "--no-playlist".into(),
        "--newline".into(),
        "--progress-template".into(),
        DOWNLOAD_TEMPLATE.into(),
        "--progress-template".into(),
        POSTPROCESS_TEMPLATE.into(),
        "--retries".into(),
        config.retries.to_string().into(),
        "--fragment-retries".into(),
        config.fragment_retries.to_string().into(),
    ];

    args.push(if config.skip_unavailable_fragments {
        "--skip-unavailable-fragments".into()
    } else {
        "--abort-on-unavailable-fragments".into()
    });
    args.push(if config.keep_video {
        "--keep-video".into()
    } else {
        "--no-keep-video".into()
    });
    if config.overwrite {
        args.push("--force-overwrites".into());
    }
    if !config.merge_output_format.is_empty() {
        args.push("--merge-output-format".into());
        args.push(config.merge_output_format.clone().into());
    }
    if let Some(ffmpeg) = &config.ffmpeg_location {
        args.push("--ffmpeg-location".into());
        args.push(ffmpeg.clone().into());
    }

    args.push("-o".into());
    args.push(output.as_os_str().to_owned());
    args.push("--".into());
    args.push(request.url.into());
    args
}

#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress(ProgressReport),
    Postprocess(PostprocessStatus),
}

fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_TAG) {
        return parse_progress(rest).map(OutputLine::Progress);
    }
    if let Some(rest) = line.strip_prefix(POSTPROCESS_TAG) {
        let mut fields = rest.split_whitespace();
        let status = fields.next()?;
        let processor = fields.next().unwrap_or("");
        if !is_merge_step(processor) {
            return None;
        }
        return match status {
            "started" => Some(OutputLine::Postprocess(PostprocessStatus::Started)),
            "finished" => Some(OutputLine::Postprocess(PostprocessStatus::Finished)),
            _ => None,
        };
    }
    // Older builds ignore the postprocess template but still log the merge.
    if line.starts_with("[Merger] Merging formats into") {
        return Some(OutputLine::Postprocess(PostprocessStatus::Started));
    }
    None
}

fn parse_progress(rest: &str) -> Option<ProgressReport> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let [status, downloaded, total, estimate, speed] = fields.as_slice() else {
        return None;
    };

    let status = match *status {
        "downloading" => TransferStatus::Downloading,
        "finished" => TransferStatus::Finished,
        "error" => TransferStatus::Error,
        _ => return None,
    };
    let downloaded_bytes = parse_number(downloaded).map(|n| n as u64).unwrap_or(0);
    let total_bytes = parse_number(total)
        .or_else(|| parse_number(estimate))
        .map(|n| n as u64);

    Some(ProgressReport {
        status,
        downloaded_bytes,
        total_bytes,
        speed: parse_number(speed),
    })
}

/// yt-dlp prints `NA` for missing fields.
fn parse_number(field: &str) -> Option<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
}

fn is_merge_step(processor: &str) -> bool {
    ["Merger", "Remux", "Convertor"]
        .iter()
        .any(|name| processor.contains(name))
}

/// Maps yt-dlp's stderr onto the engine error taxonomy.
pub fn classify_failure(stderr: &str, url: &str) -> EngineError {
    let lower = stderr.to_lowercase();
    let reason = last_error_line(stderr);

    if lower.contains("unsupported url") {
        return EngineError::UnsupportedUrl {
            url: url.to_string(),
        };
    }

    if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("this video is not available")
        || lower.contains("video is private")
        || lower.contains("video has been removed")
        || lower.contains("this video does not exist")
        || lower.contains("requested format is not available")
    {
        return EngineError::Extraction { reason };
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return EngineError::Timeout { reason };
    }

    if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("socket")
        || lower.contains("dns")
        || lower.contains("failed to connect")
        || lower.contains("name or service not known")
        || lower.contains("getaddrinfo")
    {
        return EngineError::Network { reason };
    }

    EngineError::Extraction { reason }
}

fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or(lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}

fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
