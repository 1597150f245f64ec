//! Sticker output service
//!
//! Naming and saving of finished stickers, kept apart from pipeline logic.

use crate::{
    error::{Result, StickerError},
    types::EncodedImage,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// File name prefix for downloaded stickers
pub const STICKER_FILE_PREFIX: &str = "sticker-ai";

/// Service for writing finished stickers to disk
pub struct StickerWriter;

impl StickerWriter {
    /// Download file name for a sticker produced at `timestamp`
    ///
    /// # Examples
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use sticker_ai::services::StickerWriter;
    ///
    /// let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    /// assert_eq!(StickerWriter::file_name_at(at), "sticker-ai-1700000000123.png");
    /// ```
    #[must_use]
    pub fn file_name_at(timestamp: DateTime<Utc>) -> String {
        format!(
            "{}-{}.png",
            STICKER_FILE_PREFIX,
            timestamp.timestamp_millis()
        )
    }

    /// Download file name for a sticker produced now
    #[must_use]
    pub fn file_name() -> String {
        Self::file_name_at(Utc::now())
    }

    /// File name for a sticker keyed from an existing image, e.g. `cat.png` -> `cat-sticker.png`
    #[must_use]
    pub fn derived_file_name<P: AsRef<Path>>(input: P) -> String {
        let stem = input
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(STICKER_FILE_PREFIX);
        format!("{}-sticker.png", stem)
    }

    /// Write an encoded image to `path`, creating parent directories
    ///
    /// # Errors
    /// - Directory creation or file write failures
    pub fn save<P: AsRef<Path>>(image: &EncodedImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StickerError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        std::fs::write(path_ref, image.bytes())
            .map_err(|e| StickerError::file_io_error("write sticker", path_ref, &e))?;

        tracing::debug!(
            path = %path_ref.display(),
            bytes = image.len(),
            "Sticker written"
        );
        Ok(())
    }

    /// Write an encoded image into `dir` under a fresh timestamped name
    ///
    /// # Errors
    /// - Directory creation or file write failures
    pub fn save_in_dir<P: AsRef<Path>>(image: &EncodedImage, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(Self::file_name());
        Self::save(image, &path)?;
        Ok(path)
    }
}
