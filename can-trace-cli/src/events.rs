//! Recorded field event streams
//!
//! One JSON event per line, as exported from the analyzer:
//!
//! ```text
//! {"type": "identifier_field", "identifier": 768, "start_time": 10.0}
//! {"type": "data_field", "data": 3}
//! {"type": "ack_field"}
//! ```

use anyhow::{Context, Result};
use can_trace::FieldEvent;
use std::io::{BufRead, Lines};

/// Iterator over the events of a JSON-lines stream, skipping blank lines
pub struct EventReader<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<FieldEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;

            let line = match line.with_context(|| format!("Failed to read event line {}", self.line_no)) {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if line.trim().is_empty() {
                continue;
            }

            return Some(
                serde_json::from_str(&line)
                    .with_context(|| format!("Invalid field event on line {}: {}", self.line_no, line)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_event_stream() {
        let input = "\
{\"type\": \"identifier_field\", \"identifier\": 768, \"start_time\": 10.0}

{\"type\": \"data_field\", \"data\": 3}
{\"type\": \"ack_field\"}
";
        let events: Vec<FieldEvent> = EventReader::new(input.as_bytes()).collect::<Result<_>>().unwrap();
        assert_eq!(
            events,
            vec![
                FieldEvent::Identifier { identifier: 768, start_time: 10.0 },
                FieldEvent::Data { data: 3 },
                FieldEvent::Ack,
            ]
        );
    }

    #[test]
    fn test_reports_bad_line_number() {
        let input = "{\"type\": \"ack_field\"}\n{\"type\": \"data_field\", \"data\": 300}\n";
        let mut reader = EventReader::new(input.as_bytes());
        assert!(reader.next().unwrap().is_ok());

        let err = reader.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
