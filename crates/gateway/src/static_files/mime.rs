use std::path::Path;

/// Content type used when the extension is unknown
pub const DEFAULT_MIME_TYPE: &str = "application/text";

/// Content type for `path`, guessed from its extension.
pub fn mime_type(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(DEFAULT_MIME_TYPE)
}
