//! Path utilities for detecting video files and guessing MIME types by
//! extension.

use std::path::Path;

/// Supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "mov", "wmv", "flv",
];

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use reelcache_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.mkv")));
/// assert!(is_video_file(Path::new("/path/to/video.mp4")));
/// assert!(!is_video_file(Path::new("subtitle.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of video file extensions.
#[must_use]
pub fn video_extensions() -> &'static [&'static str] {
    VIDEO_EXTENSIONS
}

/// Guess the MIME type of a media file from its extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use reelcache_common::paths::guess_content_type;
///
/// assert_eq!(guess_content_type(Path::new("a.mkv")), "video/x-matroska");
/// assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
/// ```
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    content_type_for_extension(&ext)
}

/// MIME type for a bare (lowercase) extension such as `"mp4"`.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/mp2t",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("movie.mkv")));
        assert!(is_video_file(Path::new("movie.mp4")));
        assert!(is_video_file(Path::new("movie.webm")));
        assert!(is_video_file(Path::new("movie.ts")));

        // Case insensitive
        assert!(is_video_file(Path::new("movie.MKV")));
        assert!(is_video_file(Path::new("movie.Mp4")));

        // With paths
        assert!(is_video_file(Path::new("/path/to/movie.mkv")));

        assert!(!is_video_file(Path::new("subtitle.srt")));
        assert!(!is_video_file(Path::new("image.jpg")));
        assert!(!is_video_file(Path::new("no_extension")));
        assert!(!is_video_file(Path::new("")));
    }

    #[test]
    fn test_multiple_dots() {
        assert!(is_video_file(Path::new("Show.S01E02.1080p.mkv")));
        assert!(is_video_file(Path::new(".hidden.mkv")));
    }

    #[test]
    fn test_video_extensions() {
        let exts = video_extensions();
        assert_eq!(exts.len(), 9);
        assert!(exts.contains(&"mkv"));
        assert!(exts.contains(&"flv"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("x.mp4")), "video/mp4");
        assert_eq!(guess_content_type(Path::new("x.M4V")), "video/mp4");
        assert_eq!(guess_content_type(Path::new("x.mkv")), "video/x-matroska");
        assert_eq!(guess_content_type(Path::new("x.webm")), "video/webm");
        assert_eq!(guess_content_type(Path::new("x.ts")), "video/mp2t");
        assert_eq!(guess_content_type(Path::new("x")), "application/octet-stream");
    }
}
