//! External scanner input.
//!
//! Lets any out-of-process walker feed the reconciler by writing
//! [`ScanMessage`]s as JSON lines to a file or a pipe. The stream must end
//! with `{"type":"complete"}`; an EOF before that line leaves the scan
//! incomplete and the index untouched.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::{LocateError, Result};
use crate::scan::{ScanMessage, ScanSender, Scanner};

#[derive(Debug, Clone)]
pub enum JsonLinesSource {
    Stdin,
    File(PathBuf),
}

pub struct JsonLinesScanner {
    source: JsonLinesSource,
}

impl JsonLinesScanner {
    pub fn new(source: JsonLinesSource) -> Self {
        Self { source }
    }

    /// `-` reads standard input, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::new(JsonLinesSource::Stdin)
        } else {
            Self::new(JsonLinesSource::File(PathBuf::from(arg)))
        }
    }
}

#[async_trait]
impl Scanner for JsonLinesScanner {
    fn name(&self) -> String {
        match &self.source {
            JsonLinesSource::Stdin => "jsonl:-".to_string(),
            JsonLinesSource::File(path) => format!("jsonl:{}", path.display()),
        }
    }

    async fn scan(&self, sink: ScanSender) -> Result<()> {
        match &self.source {
            JsonLinesSource::Stdin => read_scan_lines(BufReader::new(tokio::io::stdin()), sink).await,
            JsonLinesSource::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    LocateError::Scanner(format!("cannot open {}: {}", path.display(), e))
                })?;
                read_scan_lines(BufReader::new(file), sink).await
            }
        }
    }
}

/// Forwards JSON-line scan messages from `reader` into `sink`.
///
/// Blank lines are ignored. A malformed line aborts the scan. Anything after
/// the completion line is not read.
pub async fn read_scan_lines<R>(reader: R, mut sink: ScanSender) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| LocateError::Scanner(format!("read failed: {}", e)))?
    {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message: ScanMessage = serde_json::from_str(trimmed)
            .map_err(|e| LocateError::Scanner(format!("line {}: {}", line_no, e)))?;

        match message {
            ScanMessage::Entry(entry) => sink.send(entry).await?,
            ScanMessage::Complete => {
                debug!(entries = sink.sent(), "external scan complete");
                return sink.complete().await;
            }
        }
    }

    warn!(
        entries = sink.sent(),
        "external scan ended without a completion line"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanResult;

    const COMPLETE_STREAM: &str = r#"{"type":"entry","path":"/a/report.txt","size":120,"modified_at":1,"kind":"file"}

{"type":"entry","path":"/a/reports/","modified_at":2,"kind":"directory"}
{"type":"complete"}
{"type":"entry","path":"/ignored","modified_at":3,"kind":"file"}
"#;

    #[tokio::test]
    async fn complete_stream_is_accepted() {
        let (sink, scan) = ScanResult::channel(16);
        read_scan_lines(COMPLETE_STREAM.as_bytes(), sink).await.unwrap();

        let entries = scan.collect().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["/a/reports/"].name, "reports");
        assert!(!entries.contains_key("/ignored"));
    }

    #[tokio::test]
    async fn truncated_stream_is_incomplete() {
        let input = r#"{"type":"entry","path":"/a/report.txt","size":120,"modified_at":1,"kind":"file"}"#;
        let (sink, scan) = ScanResult::channel(16);
        read_scan_lines(input.as_bytes(), sink).await.unwrap();

        assert!(matches!(
            scan.collect().await,
            Err(LocateError::ScanIncomplete { received: 1, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_line_aborts() {
        let input = "{\"type\":\"entry\",\"path\":\"/a\"\nnot json\n{\"type\":\"complete\"}\n";
        let (sink, _scan) = ScanResult::channel(16);
        let err = read_scan_lines(input.as_bytes(), sink).await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn dash_means_stdin() {
        assert_eq!(JsonLinesScanner::from_arg("-").name(), "jsonl:-");
        assert_eq!(
            JsonLinesScanner::from_arg("/tmp/scan.jsonl").name(),
            "jsonl:/tmp/scan.jsonl"
        );
    }
}
