//! URL-based content routing.
//!
//! Purely syntactic: looks at the path extension and the host name only.

use entityx_types::ContentCategory;
use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "avif", "heic",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "m4v", "3gp",
];

/// Host fragments of well-known news outlets.
const NEWS_DOMAINS: &[&str] = &[
    "bbc.",
    "reuters.",
    "apnews.",
    "nytimes.",
    "theguardian.",
    "washingtonpost.",
    "cnn.",
    "foxnews.",
    "nbcnews.",
    "huffpost.",
];

/// Pick the analyzer pipeline for `url`.
///
/// Precedence: image extension, video extension, news host, no extension
/// (treated as an article), otherwise unknown.
#[must_use]
pub fn classify(url: &str) -> ContentCategory {
    let lowered = url.to_lowercase();
    let (host, path) = host_and_path(&lowered);

    match extension(&path) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => ContentCategory::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => ContentCategory::Video,
        _ if NEWS_DOMAINS.iter().any(|domain| host.contains(domain)) => ContentCategory::Text,
        None => ContentCategory::Text,
        Some(_) => ContentCategory::Unknown,
    }
}

/// Whether `url` almost certainly points at a raw image file.
#[must_use]
pub fn is_direct_image_url(url: &str) -> bool {
    classify(url) == ContentCategory::Image
}

/// Unparseable input (e.g. no scheme) is treated as a bare path.
fn host_and_path(lowered: &str) -> (String, String) {
    match Url::parse(lowered) {
        Ok(url) => (
            url.host_str().unwrap_or_default().to_string(),
            url.path().to_string(),
        ),
        Err(_) => {
            let end = lowered.find(['?', '#']).unwrap_or(lowered.len());
            (String::new(), lowered[..end].to_string())
        }
    }
}

/// Extension of the last path segment, without the dot.
fn extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions() {
        assert_eq!(classify("https://cdn.example.com/a/cat.JPG"), ContentCategory::Image);
        assert_eq!(classify("https://x.test/p.webp?w=200#top"), ContentCategory::Image);
        assert_eq!(classify("https://x.test/scan.heic"), ContentCategory::Image);
        assert!(is_direct_image_url("http://x.test/a.png"));
    }

    #[test]
    fn video_extensions() {
        assert_eq!(classify("https://videos.test/clip.mp4"), ContentCategory::Video);
        assert_eq!(classify("https://videos.test/clip.3gp"), ContentCategory::Video);
    }

    #[test]
    fn extension_beats_news_domain() {
        assert_eq!(
            classify("https://www.bbc.co.uk/images/photo.jpg"),
            ContentCategory::Image
        );
    }

    #[test]
    fn news_domains_are_text() {
        assert_eq!(
            classify("https://www.reuters.com/world/story.html"),
            ContentCategory::Text
        );
        assert_eq!(classify("https://edition.CNN.com/index.php"), ContentCategory::Text);
    }

    #[test]
    fn missing_extension_is_text() {
        assert_eq!(classify("https://blog.example.com/posts/hello"), ContentCategory::Text);
        assert_eq!(classify("https://blog.example.com/"), ContentCategory::Text);
        assert_eq!(classify("https://a.test/v1.2/article"), ContentCategory::Text);
    }

    #[test]
    fn unknown_extension() {
        assert_eq!(classify("https://files.test/report.pdf"), ContentCategory::Unknown);
        assert_eq!(classify("https://files.test/trailing."), ContentCategory::Unknown);
    }

    #[test]
    fn unparseable_input_is_treated_as_a_path() {
        assert_eq!(classify("example.com/cat.png"), ContentCategory::Image);
        assert_eq!(classify("not a url"), ContentCategory::Text);
        assert_eq!(classify("archive.zip?download=1"), ContentCategory::Unknown);
    }
}
