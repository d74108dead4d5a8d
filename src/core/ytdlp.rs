use std::path::{Path, PathBuf};

use tubearc_core::platforms::{classify, is_http_url, Platform};

use crate::core::configuration::Features;
use crate::core::error::InvalidRequest;
use crate::core::filename::sanitize_path_component;
use crate::core::tools::{find_tool, ToolDescriptor, ToolKind};
use crate::models::download::{
    DownloadCommand, DownloadMode, DownloadRequest, DownloadSelection, Quality,
};

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const FALLBACK_LOG_NAME: &str = "download";
const MAX_LOG_STEM_BYTES: usize = 200;

const MERGED_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best";
const VIDEO_ONLY_SELECTOR: &str = "bestvideo[ext=mp4]/bestvideo";
const AUDIO_ONLY_SELECTOR: &str = "bestaudio/best";
const SEPARATE_SELECTOR: &str = "bestvideo[ext=mp4],bestaudio[ext=m4a]";

fn quality_selector(quality: Quality) -> &'static str {
    match quality {
        Quality::Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best",
        Quality::Worst => "worstvideo[ext=mp4]+worstaudio[ext=m4a]/worst",
        Quality::AudioOnly => "bestaudio/best",
    }
}

fn ensure_tool_ready<'a>(
    tools: &'a [ToolDescriptor],
    kind: ToolKind,
    fallback_name: &str,
) -> Result<&'a ToolDescriptor, InvalidRequest> {
    match find_tool(tools, kind) {
        Some(tool) if tool.is_present() => Ok(tool),
        Some(tool) => Err(InvalidRequest::ToolNotReady(tool.name.clone())),
        None => Err(InvalidRequest::ToolNotReady(fallback_name.to_string())),
    }
}

/// Turns raw shell input into a request, refusing anything that could not
/// run. Nothing is spawned or written here.
pub fn validate(
    selection: &DownloadSelection,
    tools: &[ToolDescriptor],
    features: &Features,
) -> Result<DownloadRequest, InvalidRequest> {
    let url = selection.url.trim();
    if url.is_empty() {
        return Err(InvalidRequest::EmptyUrl);
    }
    if !is_http_url(url) {
        return Err(InvalidRequest::NotHttp);
    }

    let platform = classify(url);
    if !features.extended_platforms && platform != Platform::YouTube {
        return Err(InvalidRequest::UnsupportedPlatform(
            platform.display_name().to_string(),
        ));
    }

    let mode = selection.mode().ok_or(InvalidRequest::NoStreamSelected)?;
    if mode != DownloadMode::Combined && !features.separate_streams {
        return Err(InvalidRequest::SeparateStreamsDisabled);
    }

    check_tools(tools, mode)?;

    Ok(DownloadRequest {
        url: url.to_string(),
        platform,
        output_dir: selection.output_dir.clone(),
        quality: selection.quality,
        mode,
        want_metadata: selection.want_metadata,
        want_subtitles: selection.want_subtitles,
    })
}

fn check_tools(tools: &[ToolDescriptor], mode: DownloadMode) -> Result<(), InvalidRequest> {
    ensure_tool_ready(tools, ToolKind::Downloader, "yt-dlp")?;
    if mode == DownloadMode::Combined {
        ensure_tool_ready(tools, ToolKind::MediaProcessor, "ffmpeg")?;
    }
    for tool in tools.iter().filter(|t| t.required_for(mode)) {
        if !tool.is_present() {
            return Err(InvalidRequest::ToolNotReady(tool.name.clone()));
        }
    }
    Ok(())
}

/// Pure: the same request and tool table always give the same command.
pub fn build(
    request: &DownloadRequest,
    tools: &[ToolDescriptor],
) -> Result<DownloadCommand, InvalidRequest> {
    let downloader = ensure_tool_ready(tools, ToolKind::Downloader, "yt-dlp")?;

    let output_template = request
        .output_dir
        .join(OUTPUT_TEMPLATE)
        .to_string_lossy()
        .to_string();

    let mut args = vec![request.url.clone(), "-o".to_string(), output_template];

    if let Some(ffmpeg) = find_tool(tools, ToolKind::MediaProcessor).filter(|t| t.is_present()) {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.local_path.to_string_lossy().to_string());
    } else if request.mode == DownloadMode::Combined {
        return Err(InvalidRequest::ToolNotReady("ffmpeg".to_string()));
    }

    match request.mode {
        DownloadMode::Combined => {
            let selector = if request.platform.supports_quality() {
                quality_selector(request.quality)
            } else {
                MERGED_SELECTOR
            };
            args.extend([
                "-f".to_string(),
                selector.to_string(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
                "--postprocessor-args".to_string(),
                "ffmpeg:-c:v copy -c:a aac".to_string(),
            ]);
        }
        DownloadMode::VideoOnly => {
            args.extend(["-f".to_string(), VIDEO_ONLY_SELECTOR.to_string()]);
        }
        DownloadMode::AudioOnly => {
            args.extend([
                "-f".to_string(),
                AUDIO_ONLY_SELECTOR.to_string(),
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
            ]);
        }
        DownloadMode::Both => {
            args.extend([
                "-f".to_string(),
                SEPARATE_SELECTOR.to_string(),
                "--keep-video".to_string(),
            ]);
        }
    }

    if request.want_metadata {
        args.extend([
            "--write-description".to_string(),
            "--write-thumbnail".to_string(),
        ]);
    }

    if request.want_subtitles {
        args.extend([
            "--write-subs".to_string(),
            "--write-auto-subs".to_string(),
            "--sub-format".to_string(),
            "srt".to_string(),
        ]);
    }

    args.extend([
        "--windows-filenames".to_string(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
    ]);

    Ok(DownloadCommand {
        program: downloader.local_path.clone(),
        args,
        output_dir: request.output_dir.clone(),
        log_path: log_path_for(&request.output_dir, &request.url),
    })
}

pub fn validate_and_build(
    selection: &DownloadSelection,
    tools: &[ToolDescriptor],
    features: &Features,
) -> Result<DownloadCommand, InvalidRequest> {
    let request = validate(selection, tools, features)?;
    build(&request, tools)
}

/// `<output_dir>/<last URL path segment plus query>.log`, sanitized for the
/// filesystem. The query stays so `watch?v=` links get distinct logs.
pub fn log_path_for(output_dir: &Path, url: &str) -> PathBuf {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };
    let after_scheme = path
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(path);
    let last = after_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("")
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    let segment = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", last, q),
        _ => last.to_string(),
    };

    let mut name = sanitize_path_component(&segment);
    if name.len() > MAX_LOG_STEM_BYTES {
        let cut = name
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= MAX_LOG_STEM_BYTES)
            .last()
            .unwrap_or(0);
        name.truncate(cut);
    }
    if name.is_empty() {
        name = FALLBACK_LOG_NAME.to_string();
    }
    output_dir.join(format!("{}.log", name))
}
