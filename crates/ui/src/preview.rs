//! Terminal graphics detection and preview protocols for the selected image.

use std::time::Duration;

use image::imageops::FilterType;
use ratatui::layout::Rect;
use ratatui_image::Resize;
use ratatui_image::picker::{Picker, ProtocolType, cap_parser::QueryStdioOptions};
use ratatui_image::protocol::Protocol;
use solver_core::ImageInput;
use tracing::{debug, warn};

/// Cell box a preview is encoded for.
pub(crate) const PREVIEW_CELLS: (u16, u16) = (48, 14);

fn env_has(key: &str, pred: impl Fn(&str) -> bool) -> bool {
    std::env::var(key).ok().is_some_and(|v| pred(v.trim()))
}

fn graphics_terminal_hint() -> bool {
    env_has("KITTY_WINDOW_ID", |v| !v.is_empty())
        || env_has("TERM", |v| v.starts_with("xterm-kitty"))
        || env_has("ITERM_SESSION_ID", |v| !v.is_empty())
        || env_has("TERM_PROGRAM", |v| v.contains("iTerm") || v == "WezTerm")
}

pub(crate) fn should_query_stdio() -> bool {
    graphics_terminal_hint() || std::env::var_os("TMUX").is_some()
}

pub(crate) fn stdio_query_timeout() -> Duration {
    if graphics_terminal_hint() {
        Duration::from_millis(1500)
    } else if std::env::var_os("TMUX").is_some() {
        Duration::from_millis(300)
    } else {
        Duration::ZERO
    }
}

/// Must run after the terminal entered raw mode.
pub(crate) fn detect_picker() -> Picker {
    let mut picker = if should_query_stdio() {
        let options = QueryStdioOptions {
            timeout: stdio_query_timeout(),
            text_sizing_protocol: false,
        };
        Picker::from_query_stdio_with_options(options).unwrap_or_else(|_| Picker::halfblocks())
    } else {
        Picker::halfblocks()
    };
    // photos of worksheets are often transparent PNG scans
    picker.set_background_color(image::Rgba([255u8, 255u8, 255u8, 255u8]));
    debug!(protocol = protocol_label(&picker), "image picker ready");
    picker
}

pub(crate) fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}

/// Decodes the selected file and encodes it for the terminal. `None` when the
/// bytes are not a decodable image; the file can still be submitted.
pub(crate) fn build_preview(picker: &Picker, input: &ImageInput) -> Option<Protocol> {
    let decoded = match image::load_from_memory(input.bytes()) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(file = input.file_name(), %err, "no preview for image");
            return None;
        }
    };
    let (width, height) = PREVIEW_CELLS;
    let size = Rect::new(0, 0, width, height);
    match picker.new_protocol(decoded, size, Resize::Fit(Some(FilterType::Triangle))) {
        Ok(protocol) => Some(protocol),
        Err(err) => {
            warn!(file = input.file_name(), %err, "image preview encode failed");
            None
        }
    }
}
