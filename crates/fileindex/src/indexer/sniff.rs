//! Best-effort content type detection from the first bytes of a file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes handed to a sniffer.
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Detects a media type from a file's leading bytes.
pub trait ContentSniffer: Send + Sync {
    /// Returns a media type for `head` (at most [`SNIFF_LEN`] bytes), or
    /// `None` when nothing can be said. `name` is the file's base name.
    fn detect(&self, head: &[u8], name: &str) -> Option<String>;
}

/// Reads the head of `path` and runs `sniffer` over it.
///
/// Unreadable and empty files yield an empty content type.
pub fn sniff_path(sniffer: &dyn ContentSniffer, path: &Path) -> String {
    let head = match read_head(path) {
        Ok(head) => head,
        Err(error) => {
            log::debug!(
                "fileindex sniff failed path={} error={}",
                path.display(),
                error
            );
            return String::new();
        }
    };
    if head.is_empty() {
        return String::new();
    }
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    sniffer.detect(&head, &name).unwrap_or_default()
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Signature-based sniffer with a text heuristic and an extension fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicSniffer;

impl ContentSniffer for MagicSniffer {
    fn detect(&self, head: &[u8], name: &str) -> Option<String> {
        if head.is_empty() {
            return None;
        }
        if let Some(found) = match_signature(head) {
            return Some(found.to_string());
        }
        if let Some(found) = match_markup(head) {
            return Some(found.to_string());
        }
        if looks_like_text(head) {
            return Some(TEXT_PLAIN.to_string());
        }
        let guessed = mime_guess::from_path(name)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Some(guessed.unwrap_or_else(|| OCTET_STREAM.to_string()))
    }
}

fn match_signature(head: &[u8]) -> Option<&'static str> {
    const PREFIXES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1F\x8B\x08", "application/x-gzip"),
        (b"\x1A\x45\xDF\xA3", "video/webm"),
        (b"OggS\x00", "application/ogg"),
        (b"ID3", "audio/mpeg"),
        (b"\xEF\xBB\xBF", TEXT_PLAIN),
        (b"\xFE\xFF", "text/plain; charset=utf-16be"),
        (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    ];

    if let Some(found) = PREFIXES
        .iter()
        .find(|(prefix, _)| head.starts_with(prefix))
        .map(|(_, found)| *found)
    {
        return Some(found);
    }

    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        match &head[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wave"),
            b"AVI " => return Some("video/avi"),
            _ => {}
        }
    }

    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some("video/mp4");
    }

    None
}

fn match_markup(head: &[u8]) -> Option<&'static str> {
    const HTML_TAGS: &[&[u8]] = &[
        b"<!doctype html",
        b"<html",
        b"<head",
        b"<script",
        b"<iframe",
        b"<h1",
        b"<div",
        b"<font",
        b"<table",
        b"<a",
        b"<style",
        b"<title",
        b"<b",
        b"<body",
        b"<br",
        b"<p",
        b"<!--",
    ];

    let start = head
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(head.len());
    let trimmed = &head[start..];

    if trimmed.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }

    for tag in HTML_TAGS {
        if trimmed.len() <= tag.len() || !trimmed[..tag.len()].eq_ignore_ascii_case(tag) {
            continue;
        }
        // The tag must end here: `<a>` and `<a href` are HTML, `<abc` is not.
        let next = trimmed[tag.len()];
        if next == b' ' || next == b'>' {
            return Some("text/html; charset=utf-8");
        }
    }
    None
}

fn looks_like_text(head: &[u8]) -> bool {
    head.iter().all(|&byte| {
        !matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
    })
}
