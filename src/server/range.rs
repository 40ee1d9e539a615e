// HTTP Range header handling for single-file byte ranges.

use crate::source::traits::ByteRange;

#[derive(Debug, PartialEq, Eq)]
enum ParsedRange {
    StartEnd {
        start: u64,
        end_inclusive: Option<u64>,
    },
    Suffix {
        len: u64,
    },
}

/// What a Range header asks of a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No Range header: serve the whole file.
    Full,
    /// One satisfiable range, clamped to the file.
    Partial(ByteRange),
    /// Malformed, or no byte of the file falls inside the range.
    Unsatisfiable,
    /// More than one range was requested.
    MultipleRanges,
}

/// Parse one range spec (the part after `bytes=`).
/// Supports:
/// - start-end
/// - start-
/// - -suffix_len
fn parse_range_spec(spec: &str) -> Option<ParsedRange> {
    let mut parts = spec.splitn(2, '-');
    let start_str = parts.next()?.trim();
    let end_str = parts.next()?.trim();

    if start_str.is_empty() {
        let len: u64 = end_str.parse().ok()?;
        if len == 0 {
            return None;
        }
        Some(ParsedRange::Suffix { len })
    } else {
        let start: u64 = start_str.parse().ok()?;
        let end_inclusive = if end_str.is_empty() {
            None
        } else {
            Some(end_str.parse::<u64>().ok()?)
        };
        Some(ParsedRange::StartEnd {
            start,
            end_inclusive,
        })
    }
}

/// Resolve an optional Range header against a file of `total` bytes.
///
/// Ends past the last byte are clamped to `total - 1`; a start at or past the
/// end of the file, or a start after the end, is unsatisfiable.
pub fn resolve_range(header: Option<&str>, total: u64) -> RangeOutcome {
    let Some(value) = header else {
        return RangeOutcome::Full;
    };
    let Some(specs) = value.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Unsatisfiable;
    };

    let specs: Vec<&str> = specs
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let spec = match specs.as_slice() {
        [single] => *single,
        [] => return RangeOutcome::Unsatisfiable,
        _ => return RangeOutcome::MultipleRanges,
    };

    let Some(parsed) = parse_range_spec(spec) else {
        return RangeOutcome::Unsatisfiable;
    };
    if total == 0 {
        return RangeOutcome::Unsatisfiable;
    }
    let last = total - 1;

    let (start, end) = match parsed {
        ParsedRange::StartEnd {
            start,
            end_inclusive: Some(end),
        } => {
            if start > end || start > last {
                return RangeOutcome::Unsatisfiable;
            }
            (start, end.min(last))
        }
        ParsedRange::StartEnd {
            start,
            end_inclusive: None,
        } => {
            if start > last {
                return RangeOutcome::Unsatisfiable;
            }
            (start, last)
        }
        ParsedRange::Suffix { len } => (total.saturating_sub(len), last),
    };

    RangeOutcome::Partial(ByteRange { start, end })
}
