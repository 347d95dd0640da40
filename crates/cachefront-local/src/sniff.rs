//! First-bytes MIME sniffing for downloaded artifacts.
//!
//! The gate reads up to the first 512 bytes of a staged download and
//! decides whether the artifact is an admissible static asset. Byte
//! signatures win over the declared `Content-Type`; the declared type is
//! only consulted for text types that carry no reliable signature (CSS,
//! JavaScript). The URL's claimed extension plays no part in admission.

use cachefront_core::{Error, Result};

/// How many leading bytes the gate inspects.
pub const SNIFF_LEN: usize = 512;

const SCRIPT_TYPES: &[&str] = &[
    "application/javascript",
    "application/x-javascript",
    "text/javascript",
];

const FONT_TYPES: &[&str] = &[
    "font/woff",
    "font/woff2",
    "application/font-woff",
    "application/font-woff2",
    "application/x-font-ttf",
    "font/ttf",
    "font/otf",
    "application/vnd.ms-fontobject",
];

fn matches_at(head: &[u8], offset: usize, sig: &[u8]) -> bool {
    head.len() >= offset + sig.len() && &head[offset..offset + sig.len()] == sig
}

/// MP4 box scan: a `ftyp` box whose brand (or any compatible brand)
/// starts with "mp4".
fn is_mp4(head: &[u8]) -> bool {
    if head.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
    if box_size % 4 != 0 || !matches_at(head, 4, b"ftyp") {
        return false;
    }
    if matches_at(head, 8, b"mp4") {
        return true;
    }
    let mut i = 16;
    while i + 3 <= box_size && i + 3 <= head.len() {
        if matches_at(head, i, b"mp4") {
            return true;
        }
        i += 4;
    }
    false
}

fn sniff_signature(head: &[u8]) -> Option<&'static str> {
    // Images.
    if matches_at(head, 0, b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if matches_at(head, 0, b"GIF87a") || matches_at(head, 0, b"GIF89a") {
        return Some("image/gif");
    }
    if matches_at(head, 0, &[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if matches_at(head, 0, b"RIFF") && matches_at(head, 8, b"WEBPVP") {
        return Some("image/webp");
    }
    if matches_at(head, 0, b"BM") {
        return Some("image/bmp");
    }
    if matches_at(head, 0, &[0x00, 0x00, 0x01, 0x00]) || matches_at(head, 0, &[0x00, 0x00, 0x02, 0x00]) {
        return Some("image/x-icon");
    }
    // Fonts.
    if matches_at(head, 0, b"wOFF") {
        return Some("font/woff");
    }
    if matches_at(head, 0, b"wOF2") {
        return Some("font/woff2");
    }
    if matches_at(head, 0, &[0x00, 0x01, 0x00, 0x00]) {
        return Some("font/ttf");
    }
    if matches_at(head, 0, b"OTTO") {
        return Some("font/otf");
    }
    if matches_at(head, 0, b"ttcf") {
        return Some("font/collection");
    }
    if matches_at(head, 34, &[0x4C, 0x50]) {
        return Some("application/vnd.ms-fontobject");
    }
    // Audio.
    if matches_at(head, 0, b"ID3")
        || matches_at(head, 0, &[0xFF, 0xFB])
        || matches_at(head, 0, &[0xFF, 0xF3])
        || matches_at(head, 0, &[0xFF, 0xF2])
    {
        return Some("audio/mpeg");
    }
    if matches_at(head, 0, b"OggS") {
        return Some("audio/ogg");
    }
    if matches_at(head, 0, b"fLaC") {
        return Some("audio/flac");
    }
    if matches_at(head, 0, b"RIFF") && matches_at(head, 8, b"WAVE") {
        return Some("audio/wave");
    }
    if matches_at(head, 0, b"MThd") {
        return Some("audio/midi");
    }
    // Video, identified so it can be refused.
    if matches_at(head, 0, b"RIFF") && matches_at(head, 8, b"AVI ") {
        return Some("video/avi");
    }
    if matches_at(head, 0, &[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if is_mp4(head) {
        return Some("video/mp4");
    }
    // Documents and archives, all refused downstream.
    if matches_at(head, 0, b"%PDF-") {
        return Some("application/pdf");
    }
    if matches_at(head, 0, b"%!PS-Adobe-") {
        return Some("application/postscript");
    }
    if matches_at(head, 0, &[0x1F, 0x8B, 0x08]) {
        return Some("application/x-gzip");
    }
    if matches_at(head, 0, b"PK\x03\x04") {
        return Some("application/zip");
    }
    if matches_at(head, 0, b"Rar!\x1A\x07") {
        return Some("application/x-rar-compressed");
    }
    None
}

/// Tag prefixes from the WHATWG sniffing table. A match requires a
/// terminating space or `>` (the comment marker is complete in itself).
const HTML_TAGS: &[&str] = &[
    "<!doctype html",
    "<html",
    "<head",
    "<script",
    "<iframe",
    "<h1",
    "<div",
    "<font",
    "<table",
    "<a",
    "<style",
    "<title",
    "<b",
    "<body",
    "<br",
    "<p",
    "<!--",
];

fn sniff_html(head: &[u8]) -> bool {
    let start = head
        .iter()
        .position(|b| !matches!(b, 0x09 | 0x0A | 0x0C | 0x0D | 0x20))
        .unwrap_or(head.len());
    let rest: Vec<u8> = head[start..]
        .iter()
        .take(32)
        .map(|b| b.to_ascii_lowercase())
        .collect();
    for tag in HTML_TAGS {
        let t = tag.as_bytes();
        if !rest.starts_with(t) {
            continue;
        }
        if *tag == "<!--" {
            return true;
        }
        if let Some(&next) = rest.get(t.len()) {
            if next == b' ' || next == b'>' {
                return true;
            }
        }
    }
    false
}

/// Media-type essence for a downloaded artifact: byte signatures first,
/// then the HTML pattern table, then the declared type with parameters
/// stripped. Unknown content degrades to `application/octet-stream`.
pub fn classify(head: &[u8], claimed: Option<&str>) -> String {
    let head = &head[..head.len().min(SNIFF_LEN)];
    if let Some(sig) = sniff_signature(head) {
        return sig.to_string();
    }
    if sniff_html(head) {
        return "text/html".to_string();
    }
    match claimed.and_then(|c| c.parse::<mime::Mime>().ok()) {
        Some(m) => m.essence_str().to_string(),
        None => "application/octet-stream".to_string(),
    }
}

fn is_admitted(essence: &str) -> bool {
    if essence.starts_with("image/") || essence.starts_with("audio/") {
        return true;
    }
    essence == "text/css" || SCRIPT_TYPES.contains(&essence) || FONT_TYPES.contains(&essence)
}

/// Run the admission gate over the first bytes of a staged download.
/// Returns the sniffed essence for admitted content and
/// `DisallowedContentType` for everything else.
pub fn admit(head: &[u8], claimed: Option<&str>) -> Result<String> {
    let essence = classify(head, claimed);
    if is_admitted(&essence) {
        Ok(essence)
    } else {
        Err(Error::DisallowedContentType(essence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const MP3_ID3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00";
    const WOFF2: &[u8] = b"wOF2\x00\x01\x00\x00";
    const MP4: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42iso5";
    const PDF: &[u8] = b"%PDF-1.7\n%stuff";

    #[test]
    fn signatures_beat_the_declared_type() {
        assert_eq!(classify(PNG, Some("application/octet-stream")), "image/png");
        assert_eq!(classify(JPEG, Some("text/plain")), "image/jpeg");
        assert_eq!(classify(WOFF2, None), "font/woff2");
        assert_eq!(classify(MP3_ID3, Some("text/html")), "audio/mpeg");
    }

    #[test]
    fn html_is_detected_regardless_of_claim() {
        let doc = b"\n  <!DOCTYPE html><body>hi</body>";
        assert_eq!(classify(doc, Some("image/png")), "text/html");
        assert_eq!(classify(b"<html><head></head></html>", None), "text/html");
        assert_eq!(classify(b"<!-- comment -->", Some("text/css")), "text/html");
    }

    #[test]
    fn css_is_not_mistaken_for_html() {
        let css = b"a { color: red; }\n.b > .c { margin: 0 }";
        assert_eq!(classify(css, Some("text/css; charset=utf-8")), "text/css");
    }

    #[test]
    fn declared_type_is_normalized() {
        let js = b"export function f() { return 1; }";
        assert_eq!(
            classify(js, Some("Application/JavaScript; charset=UTF-8")),
            "application/javascript"
        );
    }

    #[test]
    fn admits_the_static_asset_classes() {
        assert!(admit(PNG, None).is_ok());
        assert!(admit(MP3_ID3, Some("audio/mpeg")).is_ok());
        assert!(admit(b"a { color: red }", Some("text/css")).is_ok());
        assert!(admit(WOFF2, Some("font/woff2")).is_ok());
        assert!(admit(b"var x = 1;", Some("application/javascript")).is_ok());
        assert!(admit(b"var x = 1;", Some("text/javascript")).is_ok());
        assert!(admit(b"@font-face {}", Some("application/font-woff")).is_ok());
    }

    #[test]
    fn rejects_everything_else() {
        for (head, claimed) in [
            (&b"<html><body>x</body></html>"[..], Some("image/png")),
            (PDF, Some("application/pdf")),
            (&b"\x04\x01\x02\x03"[..], Some("application/octet-stream")),
            (MP4, Some("video/mp4")),
            (&b"{\"a\": 1}"[..], Some("application/json")),
            (&b"hello"[..], None),
        ] {
            let err = admit(head, claimed).unwrap_err();
            assert!(
                matches!(err, Error::DisallowedContentType(_)),
                "{head:?} should be refused, got {err:?}"
            );
        }
    }

    #[test]
    fn mp4_box_scan_reads_compatible_brands() {
        assert!(is_mp4(MP4));
        let isom: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x00\x00mp41mp42";
        assert!(is_mp4(isom));
        assert!(!is_mp4(b"\x00\x00\x00\x18stypmp42"));
    }

    #[test]
    fn sniffs_only_the_head() {
        let mut long = vec![b' '; SNIFF_LEN];
        long.extend_from_slice(b"<html>");
        // The tag sits past the sniff window, so the claim decides.
        assert_eq!(classify(&long, Some("text/css")), "text/css");
    }
}
