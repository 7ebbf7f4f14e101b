//! Progress reporting for the binary: a count bar for known totals and a spinner for
//! archive sessions, both of which can be hidden (non-TTY output, tests).

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const COUNT_TEMPLATE: &str = "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
                              elapsed: {elapsed_precise}  eta: {eta_precise}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}  elapsed: {elapsed_precise}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// A small wrapper around an `indicatif` bar.
/// - `count(..)` for items out of a known total, `spinner(..)` when the total is unknown
/// - `inc_items(delta)` increments, `set_message(..)` relabels
/// - `finish(msg)` finalizes with a message
pub struct ProgressScope {
    pb: ProgressBar,
}

impl ProgressScope {
    pub fn count<T: Into<String>>(label: T, total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(style(COUNT_TEMPLATE));
        Self::labeled(pb, label.into())
    }

    pub fn spinner<T: Into<String>>(label: T) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(style(SPINNER_TEMPLATE));
        Self::labeled(pb, label.into())
    }

    /// Draws nothing; all calls are accepted.
    pub fn hidden() -> Self {
        Self { pb: ProgressBar::hidden() }
    }

    fn labeled(pb: ProgressBar, label: String) -> Self {
        if !label.is_empty() {
            pb.set_message(label);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    #[inline] pub fn inc_items(&self, delta: u64) { self.pb.inc(delta); }
    pub fn position(&self) -> u64 { self.pb.position() }
    pub fn set_message<T: Into<String>>(&self, msg: T) { self.pb.set_message(msg.into()); }
    pub fn finish<T: Into<String>>(&self, msg: T) { self.pb.finish_with_message(msg.into()); }
}
