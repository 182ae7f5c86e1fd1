mod summary;

pub use summary::*;

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{crate_authors, Command};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::APP_HELP_TEMPLATE;

pub fn cli() -> Command {
    summary()
        .name("bupsum")
        .author(crate_authors!("\n")) // requires `cargo` feature
        .help_template(APP_HELP_TEMPLATE)
}

/// Parses a path and makes sure that it exists.
fn existing_path_parser(input: &str) -> Result<PathBuf, anyhow::Error> {
    let path = PathBuf::from(input);
    if path.try_exists()? {
        Ok(path)
    } else {
        Err(anyhow!("file not found"))
    }
}

/// Truncates `s` so that it fits in `max_width` columns, replacing the
/// last characters with `...` if necessary.
fn truncate_with_ellipsis(s: Cow<str>, max_width: usize) -> Cow<str> {
    if s.width() <= max_width {
        return s;
    }

    let mut width = 0;
    let mut last_char_idx = 0;

    for (idx, c) in s.char_indices() {
        last_char_idx = idx;
        let char_width = c.width().unwrap_or(0);
        if width + char_width + 3 >= max_width {
            break;
        }
        width += char_width;
    }

    format!("{}...", &s[..last_char_idx]).into()
}
