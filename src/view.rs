//! Plain-text rendering of a wall snapshot.

use std::fmt::Write;

use crate::wall::WallSnapshot;

pub const TITLE: &str = "Complaint Wall";
pub const TYPING_LINE: &str = "someone is typing...";
pub const EMPTY_LINE: &str = "(no complaints yet)";

/// Render the wall: title, typing line if anyone is typing, then each
/// complaint newest first with its time.
#[must_use]
pub fn render(snapshot: &WallSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {TITLE} ({}) ==", snapshot.complaints.len());
    if snapshot.someone_typing {
        let _ = writeln!(out, "{TYPING_LINE}");
    }
    if snapshot.complaints.is_empty() {
        let _ = writeln!(out, "{EMPTY_LINE}");
    }
    for complaint in &snapshot.complaints {
        let _ = writeln!(out, "- {}  [{}]", complaint.text, complaint.display_time());
    }
    out
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
