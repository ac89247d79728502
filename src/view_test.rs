use super::*;
use time::macros::datetime;

use crate::complaint::{Complaint, ComplaintId};

#[test]
fn empty_wall_says_so() {
    let out = render(&WallSnapshot::default());
    assert_eq!(out, "== Complaint Wall (0) ==\n(no complaints yet)\n");
}

#[test]
fn complaints_render_in_snapshot_order_with_times() {
    let snapshot = WallSnapshot {
        complaints: vec![
            Complaint::new(ComplaintId::new("2"), "no heat", datetime!(2024-05-01 10:15:30 UTC)),
            Complaint::new(ComplaintId::new("1"), "slow lift", datetime!(2024-05-01 09:00:00 UTC)),
        ],
        draft: "typing this".into(),
        someone_typing: false,
    };

    let out = render(&snapshot);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "== Complaint Wall (2) ==",
            "- no heat  [2024-05-01 10:15:30 UTC]",
            "- slow lift  [2024-05-01 09:00:00 UTC]",
        ]
    );
}

#[test]
fn typing_line_follows_title() {
    let snapshot = WallSnapshot { someone_typing: true, ..WallSnapshot::default() };
    let out = render(&snapshot);
    assert_eq!(out.lines().nth(1), Some(TYPING_LINE));
}
