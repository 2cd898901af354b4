use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_TITLE_CHARS: usize = 180;

pub fn sanitize_path_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = name.trim().replace(['\t', '\n', '\r'], "");
    let name = WS_RE.replace_all(&name, " ");
    let name = name.replace(" | ", "｜");

    let name = name.trim_end_matches([' ', '-', '.', ';']);

    let forbidden: &[(char, char)] = &[
        ('<', '＜'),
        ('>', '＞'),
        (':', '꞉'),
        ('"', '＂'),
        ('/', '⧸'),
        ('\\', '＼'),
        ('|', '｜'),
        ('?', '？'),
        ('*', ' '),
    ];

    let mut result = name.to_string();
    for (from, to) in forbidden {
        result = result.replace(*from, &to.to_string());
    }

    // Catches control characters and reserved names the table above misses.
    let result = sanitize_filename::sanitize(result.trim());
    let result: String = result.chars().take(MAX_TITLE_CHARS).collect();
    let result = result.trim();

    if result.is_empty() {
        "untitled".to_string()
    } else {
        result.to_string()
    }
}

/// `{title}_{resolution}.{ext}` with the title sanitized.
pub fn destination_file_name(title: &str, resolution: &str, ext: &str) -> String {
    format!("{}_{}.{}", sanitize_path_component(title), resolution, ext)
}

/// First free path for `file_name` in `dir`, appending `_1`, `_2`, ... to the
/// stem. A candidate is taken when anything exists at it or when any
/// `{stem}.{ext}` file exists, since the engine may change the container.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let (stem, ext) = split_extension(file_name);
    let mut counter: u32 = 0;
    loop {
        let candidate_stem = match counter {
            0 => stem.to_string(),
            n => format!("{stem}_{n}"),
        };
        let candidate = match ext {
            Some(ext) => dir.join(format!("{candidate_stem}.{ext}")),
            None => dir.join(&candidate_stem),
        };
        if !candidate.exists() && same_stem_files(dir, &candidate_stem).is_empty() {
            return candidate;
        }
        counter += 1;
    }
}

/// Files in `dir` named `{stem}.{ext}` with a single extension. Fragments
/// (`{stem}.f137.mp4`) and partials (`{stem}.mp4.part`) are not included.
pub fn same_stem_files(dir: &Path, stem: &str) -> Vec<PathBuf> {
    let prefix = format!("{stem}.");
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(&prefix))
                .is_some_and(|ext| !ext.is_empty() && !ext.contains('.'))
        })
        .collect()
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}
