use service_core::error::AppError;

/// Parse an HTTP `Range` header against a known total size into an
/// inclusive `(start, end)` byte window.
///
/// No header means the whole file. Supported forms: `bytes=a-b`,
/// `bytes=a-`, `bytes=-n` (final n bytes). The end is clamped to the last
/// byte; a window starting past the end of the file is unsatisfiable.
pub fn parse_range_header(
    header: Option<&str>,
    total_size: u64,
) -> Result<(u64, u64), AppError> {
    if total_size == 0 {
        return Err(AppError::RangeNotSatisfiable(0));
    }
    let Some(header) = header else {
        return Ok((0, total_size - 1));
    };

    let window = header
        .strip_prefix("bytes=")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("unsupported range unit")))?
        .trim();
    // multiple ranges are not served
    let (raw_start, raw_end) = window
        .split_once('-')
        .filter(|_| !window.contains(','))
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("malformed range: {header}")))?;

    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("malformed range: {header}")))
    };

    let (start, end) = match (raw_start.is_empty(), raw_end.is_empty()) {
        // bytes=-n : final n bytes
        (true, false) => {
            let suffix = parse(raw_end)?;
            if suffix == 0 {
                return Err(AppError::RangeNotSatisfiable(total_size));
            }
            (total_size.saturating_sub(suffix), total_size - 1)
        }
        // bytes=a- : from a to the end
        (false, true) => (parse(raw_start)?, total_size - 1),
        // bytes=a-b
        (false, false) => (parse(raw_start)?, parse(raw_end)?.min(total_size - 1)),
        (true, true) => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "malformed range: {header}"
            )));
        }
    };

    if start > end || start >= total_size {
        return Err(AppError::RangeNotSatisfiable(total_size));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_means_whole_file() {
        assert_eq!(parse_range_header(None, 100).unwrap(), (0, 99));
    }

    #[test]
    fn bounded_range() {
        assert_eq!(parse_range_header(Some("bytes=10-20"), 100).unwrap(), (10, 20));
    }

    #[test]
    fn open_ended_range() {
        assert_eq!(parse_range_header(Some("bytes=10-"), 100).unwrap(), (10, 99));
    }

    #[test]
    fn suffix_range() {
        assert_eq!(parse_range_header(Some("bytes=-10"), 100).unwrap(), (90, 99));
    }

    #[test]
    fn end_is_clamped_to_file_size() {
        assert_eq!(parse_range_header(Some("bytes=10-5000"), 100).unwrap(), (10, 99));
    }

    #[test]
    fn start_past_the_end_is_unsatisfiable() {
        assert!(matches!(
            parse_range_header(Some("bytes=100-"), 100),
            Err(AppError::RangeNotSatisfiable(100))
        ));
    }

    #[test]
    fn garbage_is_a_bad_request() {
        assert!(parse_range_header(Some("bites=0-1"), 100).is_err());
        assert!(parse_range_header(Some("bytes=a-b"), 100).is_err());
        assert!(parse_range_header(Some("bytes=0-1,5-6"), 100).is_err());
    }
}
