use super::command::Command;
use crate::error::{FulfillmentError, Result};
use std::io::BufRead;

/// Reads one [`Command`] per line.
///
/// Blank lines and lines starting with `#` are skipped. A malformed line
/// yields an error and does not stop the stream.
pub struct CommandReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { reader: source }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .lines()
            .filter(|line| match line {
                Ok(line) => {
                    let line = line.trim();
                    !line.is_empty() && !line.starts_with('#')
                }
                Err(_) => true,
            })
            .map(|line| {
                let line = line?;
                serde_json::from_str(&line).map_err(FulfillmentError::from)
            })
    }
}
