//! Terminal progress bar driven by walk progress callbacks
//!
//! ```rust,no_run
//! use treeprint::progress::progress_bar;
//! use treeprint::walker::Walker;
//! use std::path::Path;
//!
//! # fn main() -> treeprint::Result<()> {
//! let root = Path::new("/data");
//! let walker = Walker::new();
//! let total = walker.measure(root)?;
//! let (bar, callback) = progress_bar(total.bytes);
//! let result = walker.with_progress(callback).walk(root)?;
//! bar.finish_and_clear();
//! # Ok(())
//! # }
//! ```

use crate::types::{ProgressCallback, ProgressInfo};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}";

/// Longest current-item suffix shown next to the bar
const MESSAGE_WIDTH: usize = 40;

/// Create a byte-sized progress bar and a callback that advances it
pub fn progress_bar(total_bytes: u64) -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new(total_bytes);
    let style = ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    let callback = callback_for(bar.clone());
    (bar, callback)
}

/// Callback moving `bar` to the reported byte count
///
/// Bytes inside archives are not part of a pre-pass total; the bar's length
/// grows to fit instead of overflowing.
pub fn callback_for(bar: ProgressBar) -> ProgressCallback {
    Arc::new(move |info: ProgressInfo| {
        if let Some(total) = info.total_bytes {
            if info.bytes_processed > total {
                bar.set_length(info.bytes_processed);
            }
        }
        bar.set_position(info.bytes_processed);
        if let Some(item) = info.current_item {
            bar.set_message(tail(&item, MESSAGE_WIDTH));
        }
    })
}

/// Last `width` characters of `text`
fn tail(text: &str, width: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(width)).collect()
}
