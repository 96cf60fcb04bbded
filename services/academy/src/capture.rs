//! Terminal speech capture: every line typed on stdin is one recognised utterance.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

pub const FINISH: &str = "/fine";
pub const QUIT: &str = "/esci";
pub const THEORY: &str = "/teoria";
pub const REPEAT: &str = "/ripeti";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text, possibly empty (just Enter).
    Line(String),
    Finish,
    Quit,
    Theory,
    Repeat,
    /// The input stream is gone. Reported once.
    Closed,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            FINISH => Input::Finish,
            QUIT => Input::Quit,
            THEORY => Input::Theory,
            REPEAT => Input::Repeat,
            _ => Input::Line(line.to_string()),
        }
    }
}

pub struct LineCapture<R> {
    lines: Lines<BufReader<R>>,
    open: bool,
}

impl<R: AsyncRead + Unpin> LineCapture<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Waits for the next line. Cancel safe, so it can sit in a `select!`.
    /// Once the stream has closed this never resolves again.
    pub async fn next(&mut self) -> Input {
        if !self.open {
            return std::future::pending().await;
        }
        match self.lines.next_line().await {
            Ok(Some(line)) => Input::parse(&line),
            Ok(None) => {
                self.open = false;
                Input::Closed
            }
            Err(e) => {
                tracing::error!("Failed to read input: {:?}", e);
                self.open = false;
                Input::Closed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_recognises_commands_case_insensitively() {
        assert_eq!(Input::parse(" /FINE "), Input::Finish);
        assert_eq!(Input::parse("/esci"), Input::Quit);
        assert_eq!(Input::parse("/Teoria"), Input::Theory);
        assert_eq!(Input::parse("/ripeti"), Input::Repeat);
        assert_eq!(Input::parse("  mela pera  "), Input::Line("mela pera".to_string()));
        assert_eq!(Input::parse(""), Input::Line(String::new()));
    }

    #[tokio::test]
    async fn test_lines_then_closed_once() {
        let mut capture = LineCapture::new("fragola\n/fine\n".as_bytes());

        assert_eq!(capture.next().await, Input::Line("fragola".to_string()));
        assert_eq!(capture.next().await, Input::Finish);
        assert_eq!(capture.next().await, Input::Closed);
        assert!(!capture.is_open());

        let after_close = tokio::time::timeout(Duration::from_millis(20), capture.next()).await;
        assert!(after_close.is_err(), "a closed capture stays silent");
    }
}
