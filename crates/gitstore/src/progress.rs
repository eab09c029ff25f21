//! Translation of git progress output into percentages

/// Receives progress from long-running store operations
pub trait ProgressMonitor {
    /// `completed` units of `phase` are done; `total` when git reports one
    fn update(&mut self, phase: &str, completed: u64, total: Option<u64>);

    /// The operation finished successfully
    fn finish(&mut self) {}
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressMonitor for NoProgress {
    fn update(&mut self, _phase: &str, _completed: u64, _total: Option<u64>) {}
}

/// One parsed progress line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub phase: String,
    pub completed: u64,
    pub total: Option<u64>,
}

/// Parse a single git stderr progress line
///
/// Understands `Phase: 42% (21/50)`, `Phase: 21` and the `remote:` prefix
/// the server side adds. Anything else yields `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let line = line.trim();
    let line = line
        .strip_prefix("remote:")
        .map(str::trim_start)
        .unwrap_or(line);

    let (phase, rest) = line.split_once(':')?;
    let phase = phase.trim();
    if phase.is_empty() || !phase.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        return None;
    }
    let rest = rest.trim();

    if let (Some(open), Some(close)) = (rest.find('('), rest.find(')')) {
        if open < close {
            let (done, total) = rest[open + 1..close].split_once('/')?;
            return Some(ProgressLine {
                phase: phase.to_string(),
                completed: done.trim().parse().ok()?,
                total: Some(total.trim().parse().ok()?),
            });
        }
    }

    let count = rest
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()?
        .parse()
        .ok()?;
    Some(ProgressLine {
        phase: phase.to_string(),
        completed: count,
        total: None,
    })
}

fn percent(completed: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some((completed.min(total) * 100 / total) as u8),
        _ => None,
    }
}

/// Per-phase percentages, emitted only when they advance
pub struct PercentProgress<F: FnMut(&str, u8)> {
    phase: String,
    last: Option<u8>,
    emit: F,
}

impl<F: FnMut(&str, u8)> PercentProgress<F> {
    pub fn new(emit: F) -> Self {
        Self {
            phase: String::new(),
            last: None,
            emit,
        }
    }
}

impl<F: FnMut(&str, u8)> ProgressMonitor for PercentProgress<F> {
    fn update(&mut self, phase: &str, completed: u64, total: Option<u64>) {
        let Some(pct) = percent(completed, total) else {
            return;
        };
        if phase != self.phase {
            self.phase = phase.to_string();
            self.last = None;
        }
        if self.last.map_or(true, |last| pct > last) {
            self.last = Some(pct);
            (self.emit)(phase, pct);
        }
    }
}

/// A known git phase and the slice of the overall scale it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRange {
    pub phase: &'static str,
    pub start: u8,
    pub end: u8,
}

const fn range(phase: &'static str, start: u8, end: u8) -> PhaseRange {
    PhaseRange { phase, start, end }
}

pub const PUSH_PHASES: &[PhaseRange] = &[
    range("Enumerating objects", 0, 5),
    range("Counting objects", 5, 10),
    range("Compressing objects", 10, 25),
    range("Writing objects", 25, 100),
];

pub const RESTORE_PHASES: &[PhaseRange] = &[
    range("Enumerating objects", 0, 2),
    range("Counting objects", 2, 5),
    range("Compressing objects", 5, 10),
    range("Receiving objects", 10, 90),
    range("Resolving deltas", 90, 95),
    range("Updating files", 95, 100),
];

/// Maps known phases onto one monotonic 0-100 scale
pub struct CombinedProgress<F: FnMut(u8)> {
    phases: &'static [PhaseRange],
    last: Option<u8>,
    emit: F,
}

impl<F: FnMut(u8)> CombinedProgress<F> {
    pub fn new(phases: &'static [PhaseRange], emit: F) -> Self {
        Self {
            phases,
            last: None,
            emit,
        }
    }

    fn advance(&mut self, overall: u8) {
        if self.last.map_or(true, |last| overall > last) {
            self.last = Some(overall);
            (self.emit)(overall);
        }
    }
}

impl<F: FnMut(u8)> ProgressMonitor for CombinedProgress<F> {
    fn update(&mut self, phase: &str, completed: u64, total: Option<u64>) {
        let Some(range) = self.phases.iter().find(|r| r.phase == phase).copied() else {
            return;
        };
        let pct = u32::from(percent(completed, total).unwrap_or(0));
        let span = u32::from(range.end - range.start);
        let overall = u32::from(range.start) + span * pct / 100;
        self.advance(overall as u8);
    }

    fn finish(&mut self) {
        self.advance(100);
    }
}
