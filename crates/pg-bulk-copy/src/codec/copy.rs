//! PostgreSQL COPY BINARY stream framing.
//!
//! Header: PGCOPY\n\xff\r\n\0 (11 bytes) + flags (4 bytes) + ext_len (4 bytes)
//! Each row: field_count (2 bytes) + [field_len (4 bytes) + data]*
//! Trailer: -1 (2 bytes as field_count)

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{PgValue, WireType};
use crate::error::{BulkCopyError, Result};

/// PostgreSQL COPY binary header signature.
pub const PG_COPY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// Minimum header size: signature (11) + flags (4) + extension length (4).
const HEADER_SIZE: usize = 19;

/// Builds a COPY BINARY stream row by row.
///
/// The writer enforces the framing rules: every row carries exactly
/// `column_count` fields and rows cannot be started while the previous one
/// is still short of fields.
#[derive(Debug)]
pub struct CopyWriter {
    buf: BytesMut,
    column_count: i16,
    fields_in_row: usize,
    row_open: bool,
    rows: u64,
    finished: bool,
}

impl CopyWriter {
    /// Create a writer and emit the stream header.
    pub fn new(column_count: usize) -> Result<Self> {
        let column_count = i16::try_from(column_count)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                BulkCopyError::Protocol(format!("invalid COPY column count {}", column_count))
            })?;
        let mut buf = BytesMut::with_capacity(64 * 1024);
        buf.put_slice(PG_COPY_SIGNATURE);
        buf.put_i32(0); // flags
        buf.put_i32(0); // extension area length
        Ok(Self {
            buf,
            column_count,
            fields_in_row: 0,
            row_open: false,
            rows: 0,
            finished: false,
        })
    }

    fn check_row_complete(&self) -> Result<()> {
        if self.row_open && self.fields_in_row != self.column_count as usize {
            return Err(BulkCopyError::Protocol(format!(
                "row {} has {} of {} fields",
                self.rows,
                self.fields_in_row,
                self.column_count
            )));
        }
        Ok(())
    }

    fn check_field_slot(&self) -> Result<()> {
        if self.finished {
            return Err(BulkCopyError::Protocol("COPY stream already finished".into()));
        }
        if !self.row_open {
            return Err(BulkCopyError::Protocol("field written before start_row".into()));
        }
        if self.fields_in_row >= self.column_count as usize {
            return Err(BulkCopyError::Protocol(format!(
                "row {} already has {} fields",
                self.rows, self.column_count
            )));
        }
        Ok(())
    }

    pub fn start_row(&mut self) -> Result<()> {
        if self.finished {
            return Err(BulkCopyError::Protocol("COPY stream already finished".into()));
        }
        self.check_row_complete()?;
        self.buf.put_i16(self.column_count);
        self.row_open = true;
        self.fields_in_row = 0;
        self.rows += 1;
        Ok(())
    }

    pub fn write(&mut self, value: &PgValue, wire_type: WireType) -> Result<()> {
        self.check_field_slot()?;
        super::encode(&mut self.buf, value, wire_type)?;
        self.fields_in_row += 1;
        Ok(())
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.check_field_slot()?;
        super::encode_null(&mut self.buf);
        self.fields_in_row += 1;
        Ok(())
    }

    /// Emit the trailer and return the number of rows written.
    pub fn finish(&mut self) -> Result<u64> {
        if self.finished {
            return Err(BulkCopyError::Protocol("COPY stream already finished".into()));
        }
        self.check_row_complete()?;
        self.buf.put_i16(-1);
        self.row_open = false;
        self.finished = true;
        Ok(self.rows)
    }

    /// Number of bytes not yet taken.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Take everything buffered so far.
    pub fn take_chunk(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// PostgreSQL COPY BINARY format parser.
///
/// Accumulates bytes and parses complete rows as they become available.
pub struct CopyParser {
    buffer: BytesMut,
    column_types: Vec<WireType>,
    header_parsed: bool,
    complete: bool,
}

impl CopyParser {
    /// Create a new parser with the expected column types.
    pub fn new(column_types: Vec<WireType>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            column_types,
            header_parsed: false,
            complete: false,
        }
    }

    /// Parse a complete stream in one go.
    pub fn parse_all(
        column_types: Vec<WireType>,
        data: &[u8],
    ) -> Result<Vec<Vec<Option<PgValue>>>> {
        let mut parser = Self::new(column_types);
        parser.extend(data);
        let mut rows = Vec::new();
        while let Some(row) = parser.next_row()? {
            rows.push(row);
        }
        if !parser.is_complete() {
            return Err(BulkCopyError::Protocol(
                "COPY stream ended without trailer".into(),
            ));
        }
        if parser.buffered_len() > 0 {
            return Err(BulkCopyError::Protocol(format!(
                "{} bytes after COPY trailer",
                parser.buffered_len()
            )));
        }
        Ok(rows)
    }

    /// Append more data from the COPY stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if we've reached the end of the COPY stream.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Try to parse the next row from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(row))` if a complete row was parsed
    /// - `Ok(None)` if more data is needed or the trailer was reached
    /// - `Err(...)` if parsing failed
    pub fn next_row(&mut self) -> Result<Option<Vec<Option<PgValue>>>> {
        if self.complete {
            return Ok(None);
        }
        if !self.header_parsed && !self.try_parse_header()? {
            return Ok(None);
        }

        match self.calculate_row_length()? {
            Some(2) if self.field_count() == Some(-1) => {
                self.complete = true;
                self.buffer.advance(2);
                Ok(None)
            }
            Some(len) if self.buffer.len() >= len => Ok(Some(self.parse_row_data()?)),
            _ => Ok(None),
        }
    }

    fn field_count(&self) -> Option<i16> {
        (self.buffer.len() >= 2).then(|| i16::from_be_bytes([self.buffer[0], self.buffer[1]]))
    }

    /// Try to parse the header. Returns true if successful.
    fn try_parse_header(&mut self) -> Result<bool> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(false);
        }

        if &self.buffer[..11] != PG_COPY_SIGNATURE {
            return Err(BulkCopyError::Protocol(
                "Invalid PostgreSQL COPY binary signature".into(),
            ));
        }

        let ext_len = u32::from_be_bytes([
            self.buffer[15],
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
        ]) as usize;
        if self.buffer.len() < HEADER_SIZE + ext_len {
            return Ok(false);
        }

        self.buffer.advance(HEADER_SIZE + ext_len);
        self.header_parsed = true;
        Ok(true)
    }

    /// Calculate the length of the next row, or None if we can't determine yet.
    fn calculate_row_length(&self) -> Result<Option<usize>> {
        let Some(field_count) = self.field_count() else {
            return Ok(None);
        };

        if field_count == -1 {
            return Ok(Some(2));
        }

        if field_count < 0 || field_count as usize != self.column_types.len() {
            return Err(BulkCopyError::Protocol(format!(
                "Column count mismatch: expected {}, got {}",
                self.column_types.len(),
                field_count
            )));
        }

        let mut offset = 2usize;
        for _ in 0..field_count {
            if self.buffer.len() < offset + 4 {
                return Ok(None);
            }

            let field_len = i32::from_be_bytes([
                self.buffer[offset],
                self.buffer[offset + 1],
                self.buffer[offset + 2],
                self.buffer[offset + 3],
            ]);
            offset += 4;

            match field_len {
                -1 => {}
                n if n >= 0 => offset += n as usize,
                n => {
                    return Err(BulkCopyError::Protocol(format!(
                        "Invalid field length {}",
                        n
                    )))
                }
            }
        }

        Ok(Some(offset))
    }

    /// Parse a row after we've verified we have enough data.
    fn parse_row_data(&mut self) -> Result<Vec<Option<PgValue>>> {
        let _field_count = self.buffer.get_i16();
        let mut values = Vec::with_capacity(self.column_types.len());

        for i in 0..self.column_types.len() {
            let field_len = self.buffer.get_i32();
            if field_len == -1 {
                values.push(None);
                continue;
            }
            let data = self.buffer.split_to(field_len as usize);
            values.push(Some(super::decode(self.column_types[i], &data)?));
        }

        Ok(values)
    }
}
