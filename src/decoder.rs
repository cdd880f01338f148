use crate::types::*;
use crate::utils::ReadUtils;
use crate::{Error, Result};

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder as DecoderTrait;

use std::convert::TryFrom;

/// Largest record a stream will buffer unless told otherwise
pub const DEFAULT_MAX_RECORD_LENGTH: usize = 1 << 20;

/// Decode the first BMP record in `buf`.
///
/// Only the `record_length` bytes the common header declares are looked at,
/// anything after them is left alone.
pub fn decode_bmp_record(buf: &[u8]) -> Result<BmpRecord> {
    let length = check_header(buf)?;
    if buf.len() < length {
        return Err(Error::truncated(length, buf.len()));
    }

    decode_record(Bytes::copy_from_slice(&buf[..length]))
}

// Validates the common header without consuming anything and returns the
// record length. The type is checked before the length so an unknown record
// type is reported without touching the payload.
fn check_header(src: &[u8]) -> Result<usize> {
    if src.len() < BMP_HEADER_LEN {
        return Err(Error::truncated(BMP_HEADER_LEN, src.len()));
    }

    RecordType::try_from(src[5])?;
    record_length(src)
}

pub(crate) fn record_length(src: &[u8]) -> Result<usize> {
    let length = BigEndian::read_u32(&src[1..5]) as usize;
    if length < BMP_HEADER_LEN {
        return Err(Error::InconsistentLength(format!(
            "record length {} is smaller than the common header", length
        )));
    }

    Ok(length)
}

/// Decode a buffer holding exactly one record, common header included
pub(crate) fn decode_record(mut buf: Bytes) -> Result<BmpRecord> {
    let version = buf.read_u8()?;
    let record_length = buf.read_u32()?;
    let record_type = RecordType::try_from(buf.read_u8()?)?;

    let payload = match record_type {
        RecordType::RouteMonitoring => BmpPayload::RouteMonitoring(RouteMonitoring::decode(&mut buf)?),
        RecordType::StatisticsReport => BmpPayload::StatisticsReport(StatisticsReport::decode(&mut buf)?),
        RecordType::PeerDown => BmpPayload::PeerDownNotification(PeerDownNotification::decode(&mut buf)?),
        RecordType::PeerUp => BmpPayload::PeerUpNotification(PeerUpNotification::decode(&mut buf)?),
        RecordType::Initiation => BmpPayload::InitiationMessage(InitiationMessage::decode(&mut buf)?),
        RecordType::Termination => BmpPayload::TerminationMessage(TerminationMessage::decode(&mut buf)?),
    };

    if buf.has_remaining() {
        return Err(Error::InconsistentLength(format!(
            "{} bytes left over after {} payload", buf.remaining(), record_type
        )));
    }

    tracing::trace!(%record_type, record_length, "decoded BMP record");

    Ok(BmpRecord { version, record_length, record_type, payload })
}

#[derive(Clone, Debug)]
enum DecoderState {
    Head,
    Data(usize)
}

/// Frames BMP records out of a byte stream for `tokio_util::codec::FramedRead`
#[derive(Clone, Debug)]
pub struct BmpDecoder {
    state: DecoderState,
    max_length: usize,
}

impl BmpDecoder {
    /// Decoder with [`DEFAULT_MAX_RECORD_LENGTH`]
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_RECORD_LENGTH)
    }

    /// Decoder refusing records longer than `max_length`
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            state: DecoderState::Head,
            max_length,
        }
    }

    fn decode_length(&mut self, src: &mut BytesMut) -> Result<Option<usize>> {
        if src.len() < BMP_HEADER_LEN {
            return Ok(None);
        }

        let length = record_length(&src[..]).map_err(|e| {
            tracing::warn!("unusable BMP record header: {}", e);
            e
        })?;
        if length > self.max_length {
            tracing::warn!(length, max = self.max_length, "refusing oversized BMP record");
            return Err(Error::RecordTooLarge { length, max: self.max_length });
        }

        // Make room for the rest of the record so the next reads fill it in one go
        src.reserve(length.saturating_sub(src.len()));

        Ok(Some(length))
    }

    fn decode_data(&mut self, length: usize, src: &mut BytesMut) -> Result<Option<BmpRecord>> {
        if src.len() < length {
            return Ok(None);
        }

        // Now we take the record while leaving anything else in the buffer
        let buf = src.split_to(length).freeze();

        decode_record(buf).map(Some)
    }
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderTrait for BmpDecoder {
    type Item = BmpRecord;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BmpRecord>> {
        let length = match self.state {
            DecoderState::Head => match self.decode_length(src)? {
                Some(length) => {
                    self.state = DecoderState::Data(length);
                    length
                },
                None => return Ok(None),
            },
            DecoderState::Data(length) => length,
        };

        match self.decode_data(length, src) {
            Ok(None) => Ok(None),
            res => {
                // The record's bytes are gone from `src` either way, so a bad
                // payload leaves the stream aligned on the next header
                self.state = DecoderState::Head;
                src.reserve(BMP_HEADER_LEN);
                res
            }
        }
    }
}
