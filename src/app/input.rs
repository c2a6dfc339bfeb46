use crate::domain::{LogRecord, ShipperError};
use crate::signer::unix_now;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Turns one input line into a record. JSON objects become one field per
/// key; anything else is kept whole under `content`.
pub fn parse_line(line: &str, time: i64) -> LogRecord {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => LogRecord::from_json_object(time, &object),
        _ => LogRecord::from_message(time, line),
    }
}

/// Reads lines until EOF or cancellation and forwards them to the shipper.
///
/// Blocks when the channel is full. Returns the number of records sent.
pub async fn forward_lines<R>(
    reader: R,
    records: mpsc::Sender<LogRecord>,
    cancel: CancellationToken,
) -> Result<u64, ShipperError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Input reader cancelled after {} records", forwarded);
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            info!("Input reached EOF after {} records", forwarded);
            break;
        };

        let trimmed = line.trim_end_matches('\r');
        if trimmed.trim().is_empty() {
            continue;
        }

        let record = parse_line(trimmed, unix_now());
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = records.send(record) => {
                if sent.is_err() {
                    return Err(ShipperError::Shutdown("record channel closed".to_string()));
                }
            }
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
