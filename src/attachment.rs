//! Image attachments: classification, validation, and wire encoding.
//!
//! An attachment source is either a local file, a URL, or unknown (rejected
//! at attach time). Local files are read, optionally resized, and embedded
//! as base64 data URLs; URLs are passed through untouched after a
//! reachability probe.

use crate::config::ImageSettings;
use crate::error::ChatError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn url_pattern() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| {
        Regex::new(r"^https?://\S+$").expect("url pattern should compile")
    })
}

/// Where the attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Local(PathBuf),
    Url(String),
}

impl AttachmentSource {
    /// Classify raw user input. Anything that is neither an existing file
    /// nor an http(s) URL is rejected here, before it can reach a request.
    pub fn classify(input: &str) -> Result<Self, ChatError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::Attachment("empty attachment path".into()));
        }
        if url_pattern().is_match(input) {
            return Ok(AttachmentSource::Url(input.to_string()));
        }
        let path = PathBuf::from(input);
        if path.is_file() {
            return Ok(AttachmentSource::Local(path));
        }
        Err(ChatError::Attachment(format!(
            "'{input}' is neither an existing file nor an http(s) URL"
        )))
    }

    /// Identity used for duplicate detection within one prompt.
    pub fn key(&self) -> String {
        match self {
            AttachmentSource::Local(path) => path.to_string_lossy().into_owned(),
            AttachmentSource::Url(url) => url.clone(),
        }
    }
}

/// One attached image, with the metadata the host reads back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub source: AttachmentSource,
    pub name: String,
    /// On-disk size in bytes; zero for URLs.
    pub size: u64,
    pub dimensions: Option<(u32, u32)>,
    /// Optional user note spoken alongside the name.
    pub description: String,
}

impl Attachment {
    pub fn display_size(&self) -> String {
        match self.source {
            AttachmentSource::Url(_) => "[URL]".to_string(),
            AttachmentSource::Local(_) => {
                if self.size >= 1024 * 1024 {
                    format!("{:.1} MB", self.size as f64 / (1024.0 * 1024.0))
                } else {
                    format!("{} KB", self.size.div_ceil(1024))
                }
            }
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.display_size())?;
        if let Some((w, h)) = self.dimensions {
            write!(f, ", {w} x {h}")?;
        }
        if !self.description.is_empty() {
            write!(f, ", {}", self.description)?;
        }
        Ok(())
    }
}

/// Image inspection and transformation, kept behind a trait so the session
/// logic can be exercised without decoding real files.
pub trait ImageOps {
    /// Pixel dimensions of a local image, if it decodes.
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)>;

    /// Re-encode `path` as JPEG within `max_width`/`max_height`, returning
    /// the encoded bytes. `Ok(None)` means the image is already small enough.
    fn resize(
        &self,
        path: &Path,
        max_width: u32,
        max_height: u32,
        quality: u8,
    ) -> Result<Option<Vec<u8>>, ChatError>;

    /// Whether `url` answers with an image content type.
    fn probe_url(&self, url: &str) -> Result<(), ChatError>;
}

/// Default implementation backed by the `image` crate and a blocking HTTP
/// HEAD probe.
pub struct DefaultImageOps;

impl ImageOps for DefaultImageOps {
    fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        image::image_dimensions(path).ok()
    }

    fn resize(
        &self,
        path: &Path,
        max_width: u32,
        max_height: u32,
        quality: u8,
    ) -> Result<Option<Vec<u8>>, ChatError> {
        let img = image::open(path)
            .map_err(|err| ChatError::Attachment(format!("cannot decode {}: {err}", path.display())))?;
        let (w, h) = (img.width(), img.height());
        let fits_width = max_width == 0 || w <= max_width;
        let fits_height = max_height == 0 || h <= max_height;
        if fits_width && fits_height {
            return Ok(None);
        }
        let bound_w = if max_width == 0 { w } else { max_width };
        let bound_h = if max_height == 0 { h } else { max_height };
        let resized = img.resize(bound_w, bound_h, image::imageops::FilterType::Lanczos3);
        let mut out = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        resized
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|err| ChatError::Attachment(format!("jpeg encode failed: {err}")))?;
        Ok(Some(out))
    }

    fn probe_url(&self, url: &str) -> Result<(), ChatError> {
        let client = reqwest::blocking::Client::new();
        let response = client
            .head(url)
            .send()
            .map_err(|err| ChatError::Connection(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ChatError::Attachment(format!(
                "'{url}' answered with status {}",
                response.status().as_u16()
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ChatError::Attachment(format!(
                "'{url}' is not an image (content type '{content_type}')"
            )));
        }
        Ok(())
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Build a new attachment from user input, probing URLs and reading local
/// metadata. Rejects duplicates against `existing`.
pub fn attach(
    input: &str,
    description: &str,
    existing: &[Attachment],
    ops: &dyn ImageOps,
) -> Result<Attachment, ChatError> {
    let source = AttachmentSource::classify(input)?;
    let key = source.key();
    if existing
        .iter()
        .any(|a| a.source.key().eq_ignore_ascii_case(&key))
    {
        return Err(ChatError::Attachment(format!(
            "'{}' is already attached",
            source.key()
        )));
    }
    match &source {
        AttachmentSource::Url(url) => {
            ops.probe_url(url)?;
            let name = url
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(url.as_str())
                .to_string();
            Ok(Attachment {
                source,
                name,
                size: 0,
                dimensions: None,
                description: description.trim().to_string(),
            })
        }
        AttachmentSource::Local(path) => {
            let meta = fs::metadata(path)
                .map_err(|err| ChatError::Attachment(format!("cannot stat {}: {err}", path.display())))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned());
            Ok(Attachment {
                dimensions: ops.dimensions(path),
                source,
                name,
                size: meta.len(),
                description: description.trim().to_string(),
            })
        }
    }
}

/// The `image_url` value sent on the wire: the URL itself, or a base64 data
/// URL of the (optionally resized) local file.
pub fn wire_url(
    attachment: &Attachment,
    images: &ImageSettings,
    ops: &dyn ImageOps,
) -> Result<String, ChatError> {
    match &attachment.source {
        AttachmentSource::Url(url) => Ok(url.clone()),
        AttachmentSource::Local(path) => {
            if images.resize {
                if let Some(resized) =
                    ops.resize(path, images.max_width, images.max_height, images.quality)?
                {
                    return Ok(format!(
                        "data:image/jpeg;base64,{}",
                        BASE64.encode(&resized)
                    ));
                }
            }
            let bytes = fs::read(path)
                .map_err(|err| ChatError::Attachment(format!("cannot read {}: {err}", path.display())))?;
            Ok(format!(
                "data:{};base64,{}",
                mime_for_path(path),
                BASE64.encode(&bytes)
            ))
        }
    }
}
