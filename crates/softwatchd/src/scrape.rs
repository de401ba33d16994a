//! Markup-scrape contract for the pixel supervisor and the WBM
//! run-parameter view.
//!
//! Both pages are legacy HTML and are consumed as text. The scraped layout
//! is a fixed contract:
//!
//! * supervisor status page: one line contains `Current State`; the state
//!   string sits in the first inline-emphasis (`<b>`) element on that line;
//! * run-parameter table: rows are closed by `</TR>`; a soft-error row
//!   contains both `PIXEL_STATE` and `RunningSoftErrorDetected`; its last
//!   table cell holds the detection timestamp.
//!
//! A layout change on either page is handled here and nowhere else.

use scraper::{Html, Selector};

/// Label on the supervisor status line.
pub const STATE_LABEL: &str = "Current State";

/// Supervisor state string while the pixel detector is taking data.
pub const RUNNING_STATE: &str = "Running";

/// Marker closing one row of the run-parameter table.
pub const ROW_END: &str = "</TR>";

/// Run-parameter key for pixel state transitions.
pub const PIXEL_STATE_LABEL: &str = "PIXEL_STATE";

/// Run-parameter value recorded when soft-error detection fired.
pub const SOFT_ERROR_DETECTED: &str = "RunningSoftErrorDetected";

/// Extract the supervisor state from the status page.
///
/// Scans line-by-line for the `Current State` line and returns the text of
/// its first `<b>` element, or `None` when the line or the emphasis is
/// missing.
pub fn supervisor_state(page: &str) -> Option<String> {
    let line = page.lines().find(|line| line.contains(STATE_LABEL))?;
    first_emphasis(line)
}

fn first_emphasis(line: &str) -> Option<String> {
    let fragment = Html::parse_fragment(line);
    let emphasis = Selector::parse("b").ok()?;
    let element = fragment.select(&emphasis).next()?;
    Some(element.text().collect::<String>().trim().to_string())
}

/// Find the timestamp of the most recent soft-error detection row.
///
/// Rows are scanned in reverse so the latest transition wins. Returns the
/// trimmed text of the matching row's last table cell, or `None` when no
/// row matches or the matching row has no cells.
pub fn last_soft_error_timestamp(table: &str) -> Option<String> {
    let row = table
        .rsplit(ROW_END)
        .find(|row| row.contains(PIXEL_STATE_LABEL) && row.contains(SOFT_ERROR_DETECTED))?;
    last_cell(row)
}

fn last_cell(row: &str) -> Option<String> {
    // Table elements only survive the HTML5 tree builder inside a table
    // context, so the bare row fragment gets wrapped before parsing.
    let fragment = Html::parse_fragment(&format!("<table>{row}</table>"));
    let cell = Selector::parse("td").ok()?;
    let element = fragment.select(&cell).last()?;
    let text = element.text().collect::<String>().trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
