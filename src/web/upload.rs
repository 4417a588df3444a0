//! Upload validation and multipart form extraction

use crate::web::error::WebError;
use axum::{body::Bytes, extract::Multipart};

/// Extensions accepted by the upload routes, lower-case
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "svg", "ico"];

pub const NO_FILE_MESSAGE: &str = "No file uploaded";
pub const INVALID_NAME_MESSAGE: &str = "Invalid file name";
pub const DISALLOWED_TYPE_MESSAGE: &str =
    "File type not allowed. Supported formats: PNG, JPG, JPEG, WEBP, SVG, ICO";

/// Whether `filename` has an allowed extension after its last `.`
#[must_use]
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Reduce a client-supplied name to a safe flat file name
///
/// Non-ASCII characters are dropped, path separators become spaces, runs of
/// whitespace become `_`, anything outside `[A-Za-z0-9_.-]` is removed and
/// leading/trailing `.`/`_` are stripped. Returns `None` when nothing is left.
#[must_use]
pub fn secure_filename(filename: &str) -> Option<String> {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Output name for a saved input: the stem before the last `.` plus `.png`
#[must_use]
pub fn output_file_name(filename: &str) -> String {
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    format!("{stem}.png")
}

/// File part of an upload form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client, unsanitized
    pub file_name: String,
    pub data: Bytes,
}

/// Fields of the upload forms, collected in whatever order they arrive
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<UploadedFile>,
    pub mode: Option<String>,
}

impl UploadForm {
    /// Drain a multipart body, keeping the first `image` file and `mode` text
    ///
    /// # Errors
    /// - Body over `limit` bytes (413)
    /// - Malformed multipart data (400)
    pub async fn read(mut multipart: Multipart, limit: usize) -> Result<Self, WebError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| WebError::from_multipart(&e, limit))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("image") if form.image.is_none() => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| WebError::from_multipart(&e, limit))?;
                    form.image = Some(UploadedFile { file_name, data });
                },
                Some("mode") if form.mode.is_none() => {
                    let mode = field
                        .text()
                        .await
                        .map_err(|e| WebError::from_multipart(&e, limit))?;
                    form.mode = Some(mode);
                },
                other => {
                    log::debug!("Ignoring multipart field {:?}", other);
                },
            }
        }

        Ok(form)
    }

    /// Apply the upload checks in order: present, named, allowed type
    ///
    /// # Errors
    /// - 400 with the message of the first failing check
    pub fn validated_image(&mut self) -> Result<UploadedFile, WebError> {
        let image = self
            .image
            .take()
            .ok_or_else(|| WebError::bad_request(NO_FILE_MESSAGE))?;
        if image.file_name.is_empty() {
            return Err(WebError::bad_request(INVALID_NAME_MESSAGE));
        }
        if !allowed_file(&image.file_name) {
            return Err(WebError::bad_request(DISALLOWED_TYPE_MESSAGE));
        }
        Ok(image)
    }
}
