//! Local filename resolution for downloaded images.

use url::Url;

/// Extensions kept as-is; anything else is replaced with the default.
/// Matching is case-sensitive on the literal extension.
const ALLOWED_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

/// Default extension substituted when the URL's own extension is not allowed.
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Derive a local file name for a downloaded resource.
///
/// Takes the final path segment of the URL as the base name, or synthesizes
/// `image_{row_index}{ext}` when the path has no usable segment. The URL's
/// extension is kept only when it is on the image allow-list.
///
/// Always returns a usable name; unparseable URLs fall through to the
/// synthesized form.
pub fn resolve_filename(raw_url: &str, default_ext: &str, row_index: u32) -> String {
    let path = Url::parse(raw_url)
        .map(|u| u.path().to_owned())
        .unwrap_or_default();
    let basename = path.rsplit('/').next().unwrap_or("");

    if basename.is_empty() {
        return format!("image_{row_index}{default_ext}");
    }

    let (stem, ext) = split_extension(basename);
    if ALLOWED_EXTENSIONS.contains(&ext) {
        format!("{stem}{ext}")
    } else {
        format!("{stem}{default_ext}")
    }
}

/// Split a file name into stem and extension (including the dot).
/// A leading dot is part of the stem, matching common splitext behavior.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
