use crate::decoder::{decode_record, record_length, BmpDecoder, DEFAULT_MAX_RECORD_LENGTH};
use crate::types::{BmpRecord, BMP_HEADER_LEN};
use crate::{Error, Result};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use std::io::{self, Read};

/// Async stream of records read from `r`
pub fn from_reader<R: AsyncRead>(r: R) -> FramedRead<R, BmpDecoder> {
    FramedRead::new(r, BmpDecoder::new())
}

/// Lazily decode records from a blocking reader, see [`Records`]
pub fn decode_stream<R: Read>(r: R) -> Records<R> {
    decode_stream_with_max_length(r, DEFAULT_MAX_RECORD_LENGTH)
}

/// As [`decode_stream`], refusing records longer than `max_length`
pub fn decode_stream_with_max_length<R: Read>(r: R, max_length: usize) -> Records<R> {
    Records {
        reader: r,
        max_length,
        done: false,
    }
}

/// Iterator over the records of a blocking reader.
///
/// Each record is read in full, `record_length` bytes, before it is decoded.
/// A record that fails to decode is yielded as an error and iteration moves
/// on to the next one. Running out of input mid-record, an unusable record
/// length, or an I/O error ends the iteration after yielding the error.
#[derive(Debug)]
pub struct Records<R> {
    reader: R,
    max_length: usize,
    done: bool,
}

impl<R: Read> Records<R> {
    /// Hand back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_record(&mut self) -> Result<Option<Bytes>> {
        let mut head = [0u8; BMP_HEADER_LEN];
        let n = read_full(&mut self.reader, &mut head)?;
        if n == 0 {
            return Ok(None);
        }
        if n < BMP_HEADER_LEN {
            return Err(Error::truncated(BMP_HEADER_LEN, n));
        }

        let length = record_length(&head)?;
        if length > self.max_length {
            return Err(Error::RecordTooLarge { length, max: self.max_length });
        }

        let mut buf = BytesMut::with_capacity(length);
        buf.extend_from_slice(&head);
        buf.resize(length, 0);

        let got = read_full(&mut self.reader, &mut buf[BMP_HEADER_LEN..])?;
        if got < length - BMP_HEADER_LEN {
            return Err(Error::truncated(length, BMP_HEADER_LEN + got));
        }

        Ok(Some(buf.freeze()))
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<BmpRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_record() {
            Ok(Some(buf)) => {
                let res = decode_record(buf);
                if let Err(e) = &res {
                    tracing::debug!("skipping undecodable BMP record: {}", e);
                }
                Some(res)
            },
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                tracing::warn!("BMP stream stopped: {}", e);
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// Like read_exact, but reports how much was read before EOF instead of failing
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixtures::record;
    use crate::types::RecordType;

    use std::io::Cursor;

    fn stream(records: &[Vec<u8>]) -> Cursor<Vec<u8>> {
        Cursor::new(records.concat())
    }

    #[test]
    fn empty_input() {
        let mut it = decode_stream(Cursor::new(vec![]));
        assert!(it.next().is_none());
    }

    #[test]
    fn yields_each_record() {
        let input = stream(&[
            record(4, &[0, 2, 0, 2, b'r', b'1']),
            record(5, &[0, 1, 0, 2, 0, 0]),
        ]);
        let types: Vec<_> = decode_stream(input)
            .map(|r| r.unwrap().record_type)
            .collect();
        assert_eq!(types, vec![RecordType::Initiation, RecordType::Termination]);
    }

    #[test]
    fn continues_past_bad_record() {
        let input = stream(&[
            record(8, &[1, 2, 3]),
            record(5, &[0, 1, 0, 0]),
        ]);
        let out: Vec<_> = decode_stream(input).collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(Error::UnknownRecordType(8))));
        assert!(out[1].is_ok());
    }

    #[test]
    fn truncated_tail_ends_stream() {
        let mut bytes = [record(5, &[0, 1, 0, 0]), record(5, &[0, 1, 0, 2, 0, 0])].concat();
        bytes.truncate(bytes.len() - 1);

        let out: Vec<_> = decode_stream(Cursor::new(bytes)).collect();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].as_ref().unwrap_err().is_truncation());
    }

    #[test]
    fn partial_header_ends_stream() {
        let out: Vec<_> = decode_stream(Cursor::new(vec![3, 0, 0])).collect();
        assert_eq!(out.len(), 1);
        assert!(out[0].as_ref().unwrap_err().is_truncation());
    }

    #[test]
    fn oversized_record_ends_stream() {
        let input = stream(&[record(5, &[0, 1, 0, 4, 1, 2, 3, 4]), record(5, &[0, 1, 0, 0])]);
        let out: Vec<_> = decode_stream_with_max_length(input, 10).collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(Error::RecordTooLarge { length: 14, max: 10 })));
    }
}
