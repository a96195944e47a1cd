//! Range advisor: classify how the primary span sits against the
//! counterpart span and suggest the exports that would close the gaps.

use std::fmt;

use chrono::Days;
use serde::Serialize;

use crate::model::DateSpan;

pub const USER_PLACEHOLDER: &str = "YOUR_USERNAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapClass {
    Disjoint,
    Partial,
    Full,
}

impl fmt::Display for OverlapClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disjoint => write!(f, "disjoint"),
            Self::Partial => write!(f, "partial"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeAdvice {
    pub class: OverlapClass,
    pub overlap: Option<DateSpan>,
    /// Parts of A not covered by B.
    pub gaps: Vec<DateSpan>,
    /// One export invocation per gap.
    pub commands: Vec<String>,
}

pub fn export_command(program: &str, user: Option<&str>, gap: &DateSpan) -> String {
    let user = user
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(USER_PLACEHOLDER);
    format!(
        "{program} export --user {user} --from-date {} --to-date {}",
        gap.start, gap.end
    )
}

pub fn advise(a: &DateSpan, b: &DateSpan, user: Option<&str>, program: &str) -> RangeAdvice {
    let (class, overlap, gaps) = if a.end < b.start || b.end < a.start {
        (OverlapClass::Disjoint, None, vec![*a])
    } else if b.covers(a) {
        (OverlapClass::Full, a.intersect(b), Vec::new())
    } else {
        let mut gaps = Vec::new();
        if a.start < b.start {
            if let Some(end) = b.start.checked_sub_days(Days::new(1)) {
                gaps.push(DateSpan::new(a.start, end));
            }
        }
        if a.end > b.end {
            if let Some(start) = b.end.checked_add_days(Days::new(1)) {
                gaps.push(DateSpan::new(start, a.end));
            }
        }
        (OverlapClass::Partial, a.intersect(b), gaps)
    };

    let commands = gaps
        .iter()
        .map(|gap| export_command(program, user, gap))
        .collect();

    RangeAdvice {
        class,
        overlap,
        gaps,
        commands,
    }
}
