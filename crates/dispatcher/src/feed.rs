//! Capture feed - newline-delimited JSON to captured events

use contracts::CapturedEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::error::DispatcherError;

/// Feed counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub forwarded: u64,
    pub rejected: u64,
}

/// Decode one feed line; blank lines yield `None`
///
/// # Errors
/// Returns `InvalidEvent` when the line is not a captured event
pub fn decode_line(line_no: u64, line: &str) -> Result<Option<CapturedEvent>, DispatcherError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| DispatcherError::invalid_event(line_no, e.to_string()))
}

/// Forward every decodable line of `reader` into `tx`
///
/// Undecodable lines are logged and skipped. Stops at end of input or when
/// the receiving side is gone.
///
/// # Errors
/// Returns error only when reading fails
#[instrument(name = "feed_pump", skip_all)]
pub async fn pump<R>(reader: R, tx: &mpsc::Sender<CapturedEvent>) -> Result<FeedStats, DispatcherError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        match decode_line(stats.lines, &line) {
            Ok(Some(captured)) => {
                if tx.send(captured).await.is_err() {
                    debug!("Dispatcher gone, stopping feed");
                    break;
                }
                stats.forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Skipping capture feed line");
                stats.rejected += 1;
            }
        }
    }

    debug!(
        lines = stats.lines,
        forwarded = stats.forwarded,
        rejected = stats.rejected,
        "Capture feed finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Direction;

    #[test]
    fn test_decode_line() {
        let line = r#"{"direction":"incoming","url":"wss://x","rawPayload":"hi","timestamp":"2024-05-01T12:00:00Z"}"#;
        let captured = decode_line(1, line).unwrap().unwrap();
        assert_eq!(captured.direction, Direction::Incoming);

        assert!(decode_line(2, "   ").unwrap().is_none());

        let err = decode_line(3, "{not json").unwrap_err();
        assert!(matches!(err, DispatcherError::InvalidEvent { line: 3, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_pump_skips_bad_lines() {
        let input = concat!(
            r#"{"direction":"outgoing","url":"wss://x","rawPayload":null,"timestamp":"2024-05-01T12:00:00Z"}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"direction":"incoming","url":"wss://x","rawPayload":"(binary data)","timestamp":"2024-05-01T12:00:01Z"}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        let stats = pump(input.as_bytes(), &tx).await.unwrap();

        assert_eq!(
            stats,
            FeedStats {
                lines: 4,
                forwarded: 2,
                rejected: 1
            }
        );
        assert_eq!(rx.recv().await.unwrap().direction, Direction::Outgoing);
        let second = rx.recv().await.unwrap();
        assert!(second.raw_payload.unwrap().is_binary());
    }
}
