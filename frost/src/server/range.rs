//! `Range` / `If-Range` evaluation for file responses.
//!
//! Only single byte ranges are honoured; anything else is served as the full
//! body, which is what a client must accept from any server.

use chrono::{DateTime, Utc};

use crate::http_date::parse_http_date;

/// A parsed `Range: bytes=...` specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b`
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`, the last `n` bytes
    Suffix(u64),
}

/// How to answer a file request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServePlan {
    /// `200` with the whole file.
    Full,
    /// `206` with the inclusive range `[start, end]`.
    Partial { start: u64, end: u64 },
    /// `416`.
    Unsatisfiable,
}

impl ServePlan {
    /// Decide the response for a file of `size` bytes last modified at `modified`.
    pub fn for_request(
        range: Option<&str>,
        if_range: Option<&str>,
        size: u64,
        modified: DateTime<Utc>,
    ) -> Self {
        let Some(spec) = range.and_then(parse_range) else {
            return Self::Full;
        };

        if let Some(validator) = if_range {
            // HTTP dates carry whole seconds only
            match parse_http_date(validator) {
                Some(date) if date.timestamp() == modified.timestamp() => {}
                _ => return Self::Full,
            }
        }

        resolve(spec, size)
    }
}

/// Parse a single-range `bytes=` header value.
pub fn parse_range(value: &str) -> Option<RangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        (true, false) => end.parse().ok().map(RangeSpec::Suffix),
        (false, true) => start.parse().ok().map(RangeSpec::From),
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            (end >= start).then_some(RangeSpec::FromTo(start, end))
        }
    }
}

fn resolve(spec: RangeSpec, size: u64) -> ServePlan {
    match spec {
        RangeSpec::FromTo(start, _) | RangeSpec::From(start) if start >= size => {
            ServePlan::Unsatisfiable
        }
        RangeSpec::FromTo(start, end) => ServePlan::Partial {
            start,
            end: end.min(size - 1),
        },
        RangeSpec::From(start) => ServePlan::Partial {
            start,
            end: size - 1,
        },
        RangeSpec::Suffix(n) if n == 0 || size == 0 => ServePlan::Unsatisfiable,
        RangeSpec::Suffix(n) => ServePlan::Partial {
            start: size.saturating_sub(n),
            end: size - 1,
        },
    }
}
