//! Recipient ingest: decodes a delimited text file with a header row into
//! an ordered recipient list.
//!
//! The header must name a `name` and an `email` column (any case, any
//! order). Rows that are too short or whose email lacks an `@` are dropped
//! silently; only structural problems fail the import.

use std::path::Path;

use multimail_core::error::ImportError;
use multimail_core::types::Recipient;
use tracing::{debug, info};

const QUOTE: char = '"';

/// Stateless decoder for recipient files.
#[derive(Debug, Clone, Copy)]
pub struct RecipientDecoder {
    delimiter: char,
}

impl RecipientDecoder {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Read and decode a recipient file.
    pub fn read_path(&self, path: &Path) -> Result<Vec<Recipient>, ImportError> {
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read recipient file");
        self.decode_bytes(&bytes)
    }

    /// Decode raw bytes, which must be UTF-8.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Vec<Recipient>, ImportError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ImportError::ReadError(format!("not valid UTF-8: {e}")))?;
        self.decode(text)
    }

    /// Decode recipient text. Output order matches row order.
    pub fn decode(&self, raw: &str) -> Result<Vec<Recipient>, ImportError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let mut rows = raw.split(['\r', '\n']).filter(|line| !line.is_empty());

        let header = rows.next().ok_or(ImportError::InvalidFormat)?;
        let columns: Vec<String> = self
            .split_row(header)
            .into_iter()
            .map(|c| c.trim().to_lowercase())
            .collect();

        let name_idx = columns.iter().position(|c| c == "name");
        let email_idx = columns.iter().position(|c| c == "email");
        let (Some(name_idx), Some(email_idx)) = (name_idx, email_idx) else {
            return Err(ImportError::MissingColumns);
        };
        let min_fields = name_idx.max(email_idx) + 1;

        let mut recipients = Vec::new();
        let mut dropped = 0usize;
        for row in rows {
            let fields = self.split_row(row);
            if fields.len() < min_fields {
                dropped += 1;
                continue;
            }

            let name = fields[name_idx].trim();
            let email = fields[email_idx].trim();
            if !Recipient::is_valid_email(email) {
                dropped += 1;
                continue;
            }

            recipients.push(Recipient::new(name, email));
        }

        info!(
            accepted = recipients.len(),
            dropped,
            "Decoded recipient file"
        );

        Ok(recipients)
    }

    /// Split one row on the delimiter. A double quote toggles quoted mode
    /// and is consumed; inside quotes the delimiter is literal text.
    pub fn split_row(&self, row: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut inside_quotes = false;

        for ch in row.chars() {
            if ch == QUOTE {
                inside_quotes = !inside_quotes;
            } else if ch == self.delimiter && !inside_quotes {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push(ch);
            }
        }
        fields.push(current);
        fields
    }
}

impl Default for RecipientDecoder {
    fn default() -> Self {
        Self::new(',')
    }
}
