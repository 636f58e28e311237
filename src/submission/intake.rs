// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Intake validation.
//!
//! Everything here runs before any key material is generated, so a rejected
//! submission costs nothing but the upload.

use axum::body::Bytes;

use crate::error::{CloakError, CloakResult};

/// Maximum number of files per submission.
pub const MAX_FILES: usize = 5;

/// Maximum size of a single file (25 MiB).
pub const MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// Maximum size of the text message (1 MiB of UTF-8).
pub const MAX_TEXT_BYTES: usize = 1024 * 1024;

/// Longest stored file name, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Accepted attachment types.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/jpeg",
    "image/png",
    "video/mp4",
];

/// An uploaded attachment, before encryption.
#[derive(Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl std::fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingFile")
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One anonymous submission as received.
#[derive(Clone, Default)]
pub struct SubmissionInput {
    pub text_message: String,
    pub files: Vec<IncomingFile>,
}

impl std::fmt::Debug for SubmissionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionInput")
            .field("text_len", &self.text_message.len())
            .field("files", &self.files)
            .finish()
    }
}

impl SubmissionInput {
    /// Check all intake rules and normalize file names and MIME types.
    pub fn validate(&mut self) -> CloakResult<()> {
        if self.text_message.trim().is_empty() {
            return Err(CloakError::InvalidInput("textMessage is required".to_string()));
        }
        if self.text_message.len() > MAX_TEXT_BYTES {
            return Err(CloakError::InvalidInput(format!(
                "textMessage exceeds {MAX_TEXT_BYTES} bytes"
            )));
        }
        if self.files.len() > MAX_FILES {
            return Err(CloakError::InvalidInput(format!(
                "at most {MAX_FILES} files may be attached, got {}",
                self.files.len()
            )));
        }

        for file in &mut self.files {
            file.original_name = sanitize_filename(&file.original_name);
            file.mime_type = normalize_mime(&file.mime_type);

            if file.bytes.is_empty() {
                return Err(CloakError::InvalidInput(format!(
                    "file {} is empty",
                    file.original_name
                )));
            }
            if file.bytes.len() > MAX_FILE_SIZE {
                return Err(CloakError::InvalidInput(format!(
                    "file {} exceeds {} bytes",
                    file.original_name, MAX_FILE_SIZE
                )));
            }
            if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
                return Err(CloakError::InvalidInput(format!(
                    "file type {} is not accepted",
                    file.mime_type
                )));
            }
        }
        Ok(())
    }
}

/// Lowercase and drop parameters (`image/PNG; q=1` → `image/png`).
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Reduce a client-supplied name to its final path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
