//! The image form's current file and its preview handle.

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use solver_core::ImageInput;
use tracing::debug;

/// Reads a file into an upload, sniffing its image type.
pub fn load_image(path: impl AsRef<Path>) -> anyhow::Result<ImageInput> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let input = ImageInput::from_bytes(file_name, bytes)?;
    Ok(input)
}

/// Owns the selected image and whatever preview the view built for it.
///
/// The preview is dropped as soon as it is replaced, cleared, or the
/// selection itself goes away.
#[derive(Debug)]
pub struct ImageSelection<P> {
    input: Option<ImageInput>,
    preview: Option<P>,
}

impl<P> Default for ImageSelection<P> {
    fn default() -> Self {
        Self {
            input: None,
            preview: None,
        }
    }
}

impl<P> ImageSelection<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, input: ImageInput, preview: Option<P>) {
        self.release_preview();
        debug!(file = input.file_name(), bytes = input.len(), "image selected");
        self.input = Some(input);
        self.preview = preview;
    }

    pub fn clear(&mut self) {
        self.release_preview();
        self.input = None;
    }

    pub fn input(&self) -> Option<&ImageInput> {
        self.input.as_ref()
    }

    pub fn preview(&self) -> Option<&P> {
        self.preview.as_ref()
    }

    fn release_preview(&mut self) {
        if self.preview.take().is_some() {
            debug!("image preview released");
        }
    }
}
