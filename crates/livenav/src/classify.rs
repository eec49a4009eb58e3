//! Naming and classification of captured resources.
//!
//! Maps a response's URL, resource kind and `Content-Type` header onto a
//! storage [`Category`] and a filename. The resource kind always wins; the
//! content type is only consulted when the kind did not decide. Pure
//! functions only: nothing here touches the filesystem.

use chrono::{Local, NaiveTime};
use url::Url;

use crate::types::{Category, ResourceKind};

/// `Content-Type` fragment → image extension, checked in order.
const IMAGE_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
];

/// Extensions looked for anywhere in the URL when the content type is silent.
const IMAGE_URL_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];

/// `Content-Type` fragment → font extension, checked in order.
const FONT_CONTENT_TYPES: &[(&str, &str)] = &[
    ("font/woff2", ".woff2"),
    ("application/font-woff2", ".woff2"),
    ("font/woff", ".woff"),
    ("application/font-woff", ".woff"),
    ("font/ttf", ".ttf"),
    ("application/x-font-ttf", ".ttf"),
    ("font/otf", ".otf"),
];

const GENERIC_BINARY_EXTENSION: &str = ".bin";
const GENERIC_FONT_EXTENSION: &str = ".font";

/// Where a resource goes and what it is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub filename: String,
}

/// Classify a resource using the current local time for synthesized names.
pub fn classify(url: &str, kind: ResourceKind, content_type: &str) -> Classification {
    classify_at(url, kind, content_type, Local::now().time())
}

/// Classify a resource with an explicit clock value for synthesized names.
pub fn classify_at(
    url: &str,
    kind: ResourceKind,
    content_type: &str,
    at: NaiveTime,
) -> Classification {
    let content_type = content_type.to_lowercase();
    let parts = UrlParts::split(url);

    let basename = parts.basename();
    let filename = if basename.is_empty() || !basename.contains('.') {
        synthesize_filename(&parts, kind, at)
    } else {
        basename.to_string()
    };

    let (category, extension) = if kind == ResourceKind::Document || content_type.contains("text/html") {
        (Category::Html, Some(".html"))
    } else if kind == ResourceKind::Stylesheet || content_type.contains("text/css") {
        (Category::Css, Some(".css"))
    } else if kind == ResourceKind::Script || content_type.contains("javascript") {
        (Category::Js, Some(".js"))
    } else if kind == ResourceKind::Image {
        (Category::Images, Some(image_extension(&content_type, url)))
    } else if kind == ResourceKind::Font {
        (Category::Fonts, Some(font_extension(&content_type)))
    } else {
        (Category::Other, None)
    };

    let filename = match extension {
        Some(ext) => ensure_suffix(filename, ext),
        None => filename,
    };

    Classification { category, filename }
}

/// Resolve an image extension from the content type, then the URL, then `.bin`.
pub fn image_extension(content_type: &str, url: &str) -> &'static str {
    if let Some((_, ext)) = IMAGE_CONTENT_TYPES
        .iter()
        .find(|(mime, _)| content_type.contains(mime))
    {
        return ext;
    }

    let lower = url.to_lowercase();
    IMAGE_URL_EXTENSIONS
        .iter()
        .find(|ext| lower.contains(*ext))
        .copied()
        .unwrap_or(GENERIC_BINARY_EXTENSION)
}

/// Resolve a font extension from the content type, falling back to `.font`.
pub fn font_extension(content_type: &str) -> &'static str {
    FONT_CONTENT_TYPES
        .iter()
        .find(|(mime, _)| content_type.contains(mime))
        .map(|(_, ext)| *ext)
        .unwrap_or(GENERIC_FONT_EXTENSION)
}

fn ensure_suffix(mut filename: String, ext: &str) -> String {
    if !filename.ends_with(ext) {
        filename.push_str(ext);
    }
    filename
}

/// `{domain}_{path-or-index}_{HHMMSS}.{kind}`
fn synthesize_filename(parts: &UrlParts, kind: ResourceKind, at: NaiveTime) -> String {
    let domain = parts.netloc.replace([':', '/'], "_");
    let path = parts.path.replace('/', "_");
    let path = path.trim_matches('_');
    let path = if path.is_empty() { "index" } else { path };

    format!("{domain}_{path}_{}.{}", at.format("%H%M%S"), kind.as_str())
}

/// Host (with port) and raw path of a URL.
pub(crate) struct UrlParts {
    pub netloc: String,
    pub path: String,
}

impl UrlParts {
    pub(crate) fn split(url: &str) -> Self {
        match Url::parse(url) {
            Ok(parsed) => {
                let mut netloc = parsed.host_str().unwrap_or_default().to_string();
                if let Some(port) = parsed.port() {
                    netloc.push(':');
                    netloc.push_str(&port.to_string());
                }
                Self {
                    netloc,
                    path: parsed.path().to_string(),
                }
            }
            Err(_) => Self {
                netloc: String::new(),
                path: url.split(['?', '#']).next().unwrap_or_default().to_string(),
            },
        }
    }

    fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}
