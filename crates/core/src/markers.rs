//! Stream Time Marker extraction.
//!
//! Streaming tools export highlights as lines like
//! `0:15:43 Stream Time Marker - Epic moment`. Each occurrence of the marker
//! phrase is read with this grammar:
//!
//! ```text
//! marker := clock WS+ "Stream Time Marker" HWS* "-"? HWS* text
//! clock  := DIGIT+ ":" DIGIT DIGIT ":" DIGIT DIGIT
//! text   := anything up to the end of the line, trimmed
//! ```
//!
//! `WS` is any whitespace, `HWS` excludes newlines so a marker without a
//! description never eats the next line. Occurrences that do not fit are
//! reported in [`MarkerScan::rejected`] instead of being dropped silently.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const MARKER_PHRASE: &str = "Stream Time Marker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMarker {
    /// Clock exactly as written in the input.
    pub original: String,
    pub description: String,
    /// 1-based line of the clock.
    pub line: usize,
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub hours: u64,
    pub minutes: u8,
    pub seconds: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing clock-like right before the phrase.
    MissingClock,
    /// Digits and colons, but not `H:MM:SS`.
    Malformed,
    /// Minutes or seconds >= 60, or hours too large to represent.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMarker {
    pub line: usize,
    pub clock: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub markers: Vec<TimestampMarker>,
    pub rejected: Vec<RejectedMarker>,
}

impl MarkerScan {
    /// First rejection that should stop a submission. Only a well formed
    /// clock with out of range fields blocks; anything else is a
    /// non-matching line.
    pub fn first_blocking(&self) -> Option<&RejectedMarker> {
        self.rejected
            .iter()
            .find(|r| r.reason == RejectReason::OutOfRange)
    }
}

impl Clock {
    pub fn parse(token: &str) -> Result<Self, RejectReason> {
        if token.is_empty() {
            return Err(RejectReason::MissingClock);
        }

        let parts: Vec<&str> = token.split(':').collect();
        let &[hours, minutes, seconds] = parts.as_slice() else {
            return Err(RejectReason::Malformed);
        };

        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hours)
            || minutes.len() != 2
            || seconds.len() != 2
            || !all_digits(minutes)
            || !all_digits(seconds)
        {
            return Err(RejectReason::Malformed);
        }

        let hours: u64 = hours.parse().map_err(|_| RejectReason::OutOfRange)?;
        let minutes: u8 = minutes.parse().map_err(|_| RejectReason::Malformed)?;
        let seconds: u8 = seconds.parse().map_err(|_| RejectReason::Malformed)?;
        if minutes >= 60 || seconds >= 60 {
            return Err(RejectReason::OutOfRange);
        }

        let clock = Self {
            hours,
            minutes,
            seconds,
        };
        clock.checked_total_seconds().ok_or(RejectReason::OutOfRange)?;
        Ok(clock)
    }

    fn checked_total_seconds(&self) -> Option<u64> {
        self.hours
            .checked_mul(3600)?
            .checked_add(self.minutes as u64 * 60 + self.seconds as u64)
    }

    pub fn total_seconds(&self) -> u64 {
        self.checked_total_seconds().unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

pub fn default_description(clock: &str) -> String {
    format!("Event at {}", clock)
}

/// Phrase occurrence with the byte span of its clock token.
struct Occurrence {
    clock_start: usize,
    clock_end: usize,
    phrase_end: usize,
}

fn is_horizontal_space(c: char) -> bool {
    c.is_whitespace() && c != '\n'
}

fn locate(text: &str) -> Vec<Occurrence> {
    text.match_indices(MARKER_PHRASE)
        .map(|(pos, phrase)| {
            let before = &text[..pos];
            let clock_end = before.trim_end().len();
            // no whitespace between clock and phrase: the clock does not bind
            let clock_start = if clock_end == before.len() {
                clock_end
            } else {
                before[..clock_end]
                    .char_indices()
                    .rev()
                    .find(|(_, c)| !(c.is_ascii_digit() || *c == ':'))
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(0)
            };
            // nothing clock-like: anchor the empty token on the phrase itself
            let (clock_start, clock_end) = if clock_start == clock_end {
                (pos, pos)
            } else {
                (clock_start, clock_end)
            };
            Occurrence {
                clock_start,
                clock_end,
                phrase_end: pos + phrase.len(),
            }
        })
        .collect()
}

/// Scan `text` and split phrase occurrences into markers and rejections.
pub fn scan_markers(text: &str) -> MarkerScan {
    let occurrences = locate(text);
    let mut scan = MarkerScan::default();
    let mut line = 1;
    let mut counted_to = 0;

    for (idx, occ) in occurrences.iter().enumerate() {
        line += text[counted_to..occ.clock_start].matches('\n').count();
        counted_to = occ.clock_start;

        let token = &text[occ.clock_start..occ.clock_end];
        let clock = match Clock::parse(token) {
            Ok(clock) => clock,
            Err(reason) => {
                scan.rejected.push(RejectedMarker {
                    line,
                    clock: token.to_string(),
                    reason,
                });
                continue;
            }
        };

        let rest = &text[occ.phrase_end..];
        let mut end = rest.find('\n').unwrap_or(rest.len());
        // a second marker on the same line starts a new description
        if let Some(next) = occurrences.get(idx + 1) {
            end = end.min(next.clock_start.saturating_sub(occ.phrase_end));
        }
        let raw = rest[..end].trim_start_matches(is_horizontal_space);
        let raw = raw.strip_prefix('-').unwrap_or(raw);
        let description = raw.trim();

        scan.markers.push(TimestampMarker {
            original: token.to_string(),
            description: if description.is_empty() {
                default_description(token)
            } else {
                description.to_string()
            },
            line,
            seconds: clock.total_seconds(),
        });
    }

    scan
}

/// Markers in document order; empty when the phrase never matches.
pub fn extract_markers(text: &str) -> Vec<TimestampMarker> {
    scan_markers(text).markers
}
