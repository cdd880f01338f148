//! BGP messages as they appear embedded in BMP records ([RFC4271](https://tools.ietf.org/html/rfc4271))
//!
//! Only framing is decoded: capabilities and path attribute values are kept
//! as opaque bytes.
use crate::utils::{addr_from_slice, decode_all, Afi, ReadUtils};
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Marker, length and type
pub const BGP_HEADER_LEN: usize = 19;
/// BGP message type of an OPEN
pub const BGP_OPEN: u8 = 1;
/// BGP message type of an UPDATE
pub const BGP_UPDATE: u8 = 2;

// version, my AS, hold time, BGP ID, opt param length
const OPEN_FIXED_LEN: usize = 10;

/// BGP message header
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +                           Marker                              +
/// |                          (16 bytes)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Length               |      Type     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BgpHeader {
    /// Total message length, header included
    pub message_size: u16,
    /// Message type
    pub message_type: u8,
}

impl BgpHeader {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        // marker is not checked
        buf.skip_n(16)?;
        let message_size = buf.read_u16()?;
        let message_type = buf.read_u8()?;

        if (message_size as usize) < BGP_HEADER_LEN {
            return Err(Error::InconsistentLength(format!(
                "BGP message size {} is smaller than its header", message_size
            )));
        }

        Ok(Self { message_size, message_type })
    }

    fn check_type(&self, message_type: u8) -> Result<()> {
        if self.message_type != message_type {
            return Err(Error::UnexpectedMessageType {
                expected: message_type,
                found: self.message_type,
            });
        }

        Ok(())
    }
}

/// Opaque BGP capability
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Capability {
    /// Capability code
    pub code: u8,
    /// Capability value, `len` bytes as declared on the wire
    pub value: Vec<u8>,
}

impl Capability {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let code = buf.read_u8()?;
        let len = buf.read_u8()?;
        let value = buf.read_n_bytes(len as usize)?;

        Ok(Self { code, value })
    }
}

/// OPEN optional parameter, read as a list of capabilities
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BgpOption {
    /// Parameter type
    pub param_type: u8,
    /// Capabilities filling the parameter
    pub capabilities: Vec<Capability>,
}

impl BgpOption {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let param_type = buf.read_u8()?;
        let param_length = buf.read_u8()?;
        let body = buf.split_n(param_length as usize)?;

        let capabilities = decode_all(body, "capabilities", Capability::decode)
            .map_err(|e| match e {
                Error::MalformedSequence(_) => Error::MalformedOption(format!(
                    "capabilities of parameter type {} don't fill its length {}",
                    param_type, param_length
                )),
                e => e,
            })?;

        Ok(Self { param_type, capabilities })
    }
}

/// BGP OPEN message
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BgpOpenMessage {
    /// BGP version (should be 4)
    pub version: u8,
    /// 2 byte sender ASN
    pub my_asn: u16,
    /// Proposed hold time
    pub hold_time: u16,
    /// Sender BGP identifier
    pub bgp_id: Ipv4Addr,
    /// Optional parameters
    pub options: Vec<BgpOption>,
}

impl BgpOpenMessage {
    /// Decode a complete OPEN message, header first
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = BgpHeader::decode(buf)?;
        header.check_type(BGP_OPEN)?;

        let version = buf.read_u8()?;
        let my_asn = buf.read_u16()?;
        let hold_time = buf.read_u16()?;
        let bgp_id = buf.read_ipv4_address()?;
        let opt_length = buf.read_u8()? as usize;

        let options = decode_all(buf.split_n(opt_length)?, "OPEN optional parameters", BgpOption::decode)?;

        let consumed = BGP_HEADER_LEN + OPEN_FIXED_LEN + opt_length;
        if consumed != header.message_size as usize {
            return Err(Error::InconsistentLength(format!(
                "OPEN declares {} bytes but encodes {}", header.message_size, consumed
            )));
        }

        Ok(Self { version, my_asn, hold_time, bgp_id, options })
    }
}

/// Address prefix as carried in withdrawn routes and NLRI
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CidrPrefix {
    /// Family the prefix was decoded under
    pub afi: Afi,
    /// Prefix length in bits
    pub bit_length: u8,
    /// Prefix bytes, zero padded to a full address
    pub prefix: IpAddr,
}

impl CidrPrefix {
    /// Decode one prefix: a length in bits, then just enough bytes to hold it.
    /// Bits past `bit_length` in the last byte are kept as sent.
    pub fn decode(buf: &mut Bytes, afi: Afi) -> Result<Self> {
        let bit_length = buf.read_u8()?;
        let max = afi.max_prefix_len();
        if bit_length > max {
            return Err(Error::MalformedPrefix { bit_length, max });
        }

        let n = byte_len(bit_length);
        buf.has_n_remaining(n)?;

        let mut raw = [0u8; 16];
        let width = max as usize / 8;
        buf.copy_to_slice(&mut raw[..n]);
        let prefix = addr_from_slice(afi, &raw[..width])?;

        Ok(Self { afi, bit_length, prefix })
    }

    /// Bytes this prefix occupies on the wire
    pub fn encoded_len(&self) -> usize {
        1 + byte_len(self.bit_length)
    }

    /// The prefix address
    pub fn addr(&self) -> IpAddr {
        self.prefix
    }
}

impl fmt::Display for CidrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.bit_length)
    }
}

fn byte_len(bit_length: u8) -> usize {
    (bit_length as usize + 7) / 8
}

/// Path attribute with an opaque value
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PathAttribute {
    /// Attribute flags
    pub flags: u8,
    /// Attribute type code
    pub attr_type: u8,
    /// Value length as declared on the wire
    pub length: u16,
    /// Attribute value
    pub value: Vec<u8>,
}

#[allow(missing_docs)]
impl PathAttribute {
    pub const ORIGIN: u8 = 1;
    pub const AS_PATH: u8 = 2;
    pub const NEXT_HOP: u8 = 3;
    pub const MULTI_EXIT_DISC: u8 = 4;
    pub const LOCAL_PREF: u8 = 5;
    pub const ATOMIC_AGGREGATE: u8 = 6;
    pub const AGGREGATOR: u8 = 7;
    pub const COMMUNITIES: u8 = 8;
    pub const MP_REACH_NLRI: u8 = 14;
    pub const MP_UNREACH_NLRI: u8 = 15;
    pub const EXTENDED_COMMUNITIES: u8 = 16;
    pub const AS4_PATH: u8 = 17;
    pub const LARGE_COMMUNITY: u8 = 32;
}

impl PathAttribute {
    /// Flag bit selecting a 2 byte length field
    pub const EXTENDED_LENGTH: u8 = 0x20;

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let flags = buf.read_u8()?;
        let attr_type = buf.read_u8()?;
        let length = match flags & Self::EXTENDED_LENGTH {
            0 => buf.read_u8()? as u16,
            _ => buf.read_u16()?,
        };
        let value = buf.read_n_bytes(length as usize)?;

        Ok(Self { flags, attr_type, length, value })
    }

    /// Optional (as opposed to well-known)
    pub fn is_optional(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Transitive
    pub fn is_transitive(&self) -> bool {
        self.flags & 0x40 != 0
    }

    /// Whether the length was encoded in 2 bytes
    pub fn is_extended_length(&self) -> bool {
        self.flags & Self::EXTENDED_LENGTH != 0
    }

    /// Bytes this attribute occupies on the wire
    pub fn encoded_len(&self) -> usize {
        let len_field = if self.is_extended_length() { 2 } else { 1 };
        2 + len_field + self.value.len()
    }
}

/// BGP UPDATE message
///
/// Withdrawn routes and NLRI are the IPv4 prefixes carried outside of the
/// path attributes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BgpUpdateMessage {
    /// Withdrawn routes
    pub withdrawn: Vec<CidrPrefix>,
    /// Path attributes
    pub path_attributes: Vec<PathAttribute>,
    /// Advertised prefixes
    pub nlri: Vec<CidrPrefix>,
}

impl BgpUpdateMessage {
    /// Decode a complete UPDATE message, header first.
    ///
    /// The NLRI section has no length of its own, it is whatever the message
    /// size leaves after the withdrawn routes and path attributes.
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = BgpHeader::decode(buf)?;
        header.check_type(BGP_UPDATE)?;
        let message_size = header.message_size as usize;

        if message_size < BGP_HEADER_LEN + 4 {
            return Err(Error::InconsistentLength(format!(
                "BGP message size {} can't hold the UPDATE section lengths", message_size
            )));
        }
        if buf.remaining() < message_size - BGP_HEADER_LEN {
            return Err(Error::InconsistentLength(format!(
                "BGP message size {} overruns the {} bytes left in its envelope",
                message_size,
                buf.remaining() + BGP_HEADER_LEN
            )));
        }

        let withdrawn_len = buf.read_u16()? as usize;
        if BGP_HEADER_LEN + 2 + withdrawn_len + 2 > message_size {
            return Err(Error::InconsistentLength(format!(
                "withdrawn routes length {} overruns BGP message size {}",
                withdrawn_len, message_size
            )));
        }
        let withdrawn = decode_all(buf.split_n(withdrawn_len)?, "withdrawn routes", |b| {
            CidrPrefix::decode(b, Afi::Ipv4)
        })?;

        let path_attr_len = buf.read_u16()? as usize;
        let nlri_len = nlri_length(message_size, withdrawn_len, path_attr_len)?;

        let path_attributes = decode_all(buf.split_n(path_attr_len)?, "path attributes", PathAttribute::decode)?;
        let nlri = decode_all(buf.split_n(nlri_len)?, "NLRI", |b| CidrPrefix::decode(b, Afi::Ipv4))?;

        Ok(Self { withdrawn, path_attributes, nlri })
    }
}

/// Length of the NLRI section of an UPDATE of `message_size` bytes
pub fn nlri_length(message_size: usize, withdrawn_len: usize, path_attr_len: usize) -> Result<usize> {
    let preceding = BGP_HEADER_LEN + 2 + withdrawn_len + 2 + path_attr_len;
    message_size.checked_sub(preceding).ok_or_else(|| {
        Error::InconsistentLength(format!(
            "withdrawn ({}) and path attribute ({}) lengths overrun BGP message size {}",
            withdrawn_len, path_attr_len, message_size
        ))
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn prefix_consumes_whole_bytes() {
        for &(bits, expect) in &[(0u8, 1usize), (1, 2), (8, 2), (9, 3), (24, 4), (32, 5)] {
            let mut data = Bytes::from(vec![bits, 10, 20, 30, 40, 99, 99]);
            let before = data.remaining();
            let prefix = CidrPrefix::decode(&mut data, Afi::Ipv4).unwrap();
            assert_eq!(before - data.remaining(), expect, "/{}", bits);
            assert_eq!(prefix.encoded_len(), expect);
        }
    }

    #[test]
    fn prefix_text_form() {
        let mut data = Bytes::from_static(&[24, 192, 168, 1]);
        let prefix = CidrPrefix::decode(&mut data, Afi::Ipv4).unwrap();
        assert_eq!(prefix.to_string(), "192.168.1.0/24");

        // trailing host bits are kept, not rejected
        let mut data = Bytes::from_static(&[23, 10, 0, 1]);
        let prefix = CidrPrefix::decode(&mut data, Afi::Ipv4).unwrap();
        assert_eq!(prefix.to_string(), "10.0.1.0/23");

        let mut data = Bytes::from_static(&[32, 0x20, 0x01, 0x0d, 0xb8]);
        let prefix = CidrPrefix::decode(&mut data, Afi::Ipv6).unwrap();
        assert_eq!(prefix.to_string(), "2001:db8::/32");
    }

    #[test]
    fn prefix_longer_than_family() {
        let mut data = Bytes::from_static(&[33, 1, 2, 3, 4, 5]);
        match CidrPrefix::decode(&mut data, Afi::Ipv4) {
            Err(Error::MalformedPrefix { bit_length, max }) => {
                assert_eq!(bit_length, 33);
                assert_eq!(max, 32);
            }
            other => panic!("expected malformed prefix, got {:?}", other),
        }

        let mut data = Bytes::from(vec![129u8; 20]);
        assert!(matches!(
            CidrPrefix::decode(&mut data, Afi::Ipv6),
            Err(Error::MalformedPrefix { bit_length: 129, max: 128 })
        ));

        let mut data = Bytes::from(vec![128u8; 17]);
        assert!(CidrPrefix::decode(&mut data, Afi::Ipv6).is_ok());
    }

    #[test]
    fn path_attribute_length_width() {
        // 1 byte length
        let mut data = Bytes::from_static(&[0x40, 1, 1, 0, 0xaa]);
        let attr = PathAttribute::decode(&mut data).unwrap();
        assert_eq!(attr.attr_type, PathAttribute::ORIGIN);
        assert_eq!(attr.length, 1);
        assert_eq!(attr.value, vec![0]);
        assert!(!attr.is_extended_length());
        assert!(attr.is_transitive());
        assert_eq!(attr.encoded_len(), 4);
        assert_eq!(data.remaining(), 1);

        // 2 byte length
        let mut buf = BytesMut::new();
        buf.put_u8(0x80 | PathAttribute::EXTENDED_LENGTH);
        buf.put_u8(PathAttribute::COMMUNITIES);
        buf.put_u16(300);
        buf.put_slice(&[7; 300]);
        let mut data = buf.freeze();
        let attr = PathAttribute::decode(&mut data).unwrap();
        assert_eq!(attr.length, 300);
        assert_eq!(attr.value.len(), 300);
        assert!(attr.is_extended_length());
        assert!(attr.is_optional());
        assert_eq!(attr.encoded_len(), 304);
        assert!(!data.has_remaining());
    }

    #[test]
    fn path_attribute_truncated_value() {
        let mut data = Bytes::from_static(&[0x40, 2, 6, 2, 1]);
        assert!(PathAttribute::decode(&mut data).unwrap_err().is_truncation());
    }

    #[test]
    fn open_with_capabilities() {
        let options = [
            2, 8, // capabilities parameter, 8 bytes
            1, 4, 0, 1, 0, 1, // multiprotocol ipv4 unicast
            2, 0, // route refresh
        ];
        let mut data = open_message(65000, [192, 0, 2, 1], &options).freeze();
        let open = BgpOpenMessage::decode(&mut data).unwrap();

        assert_eq!(open.version, 4);
        assert_eq!(open.my_asn, 65000);
        assert_eq!(open.hold_time, 180);
        assert_eq!(open.bgp_id, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(open.options.len(), 1);
        assert_eq!(open.options[0].param_type, 2);
        assert_eq!(
            open.options[0].capabilities,
            vec![
                Capability { code: 1, value: vec![0, 1, 0, 1] },
                Capability { code: 2, value: vec![] },
            ]
        );
        assert!(!data.has_remaining());
    }

    #[test]
    fn open_option_capability_overrun() {
        // capability claims 5 bytes, parameter only holds 3 after its header
        let options = [2, 5, 65, 5, 0, 0, 1];
        let mut data = open_message(65000, [192, 0, 2, 1], &options).freeze();
        assert!(matches!(
            BgpOpenMessage::decode(&mut data),
            Err(Error::MalformedOption(_))
        ));
    }

    #[test]
    fn open_size_mismatch() {
        let mut buf = open_message(65000, [192, 0, 2, 1], &[]);
        // claim one byte more than encoded
        buf[17] += 1;
        buf.put_u8(0);
        assert!(matches!(
            BgpOpenMessage::decode(&mut buf.freeze()),
            Err(Error::InconsistentLength(_))
        ));
    }

    #[test]
    fn open_wrong_type() {
        let mut data = update_message(&[], &[], &[]).freeze();
        assert!(matches!(
            BgpOpenMessage::decode(&mut data),
            Err(Error::UnexpectedMessageType { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn update_sections() {
        let mut data = update_message(
            &[24, 10, 0, 0],
            &[0x40, 1, 1, 0],
            &[24, 192, 168, 1, 16, 172, 16],
        )
        .freeze();
        let update = BgpUpdateMessage::decode(&mut data).unwrap();

        assert_eq!(update.withdrawn.len(), 1);
        assert_eq!(update.withdrawn[0].to_string(), "10.0.0.0/24");
        assert_eq!(update.path_attributes.len(), 1);
        assert_eq!(update.path_attributes[0].attr_type, PathAttribute::ORIGIN);
        assert_eq!(update.nlri.len(), 2);
        assert_eq!(update.nlri[0].to_string(), "192.168.1.0/24");
        assert_eq!(update.nlri[1].to_string(), "172.16.0.0/16");
        assert!(!data.has_remaining());
    }

    #[test]
    fn update_without_withdrawn_or_nlri() {
        let mut data = update_message(&[], &[], &[]).freeze();
        let update = BgpUpdateMessage::decode(&mut data).unwrap();
        assert!(update.withdrawn.is_empty());
        assert!(update.path_attributes.is_empty());
        assert!(update.nlri.is_empty());
    }

    #[test]
    fn update_derived_nlri_length() {
        assert_eq!(nlri_length(30, 2, 3).unwrap(), 30 - (19 + 2 + 2 + 2 + 3));
        assert!(matches!(nlri_length(23, 1, 0), Err(Error::InconsistentLength(_))));
    }

    #[test]
    fn update_negative_nlri_length() {
        let mut buf = update_message(&[], &[0x40, 1, 1, 0], &[]);
        // shrink the declared message size below header + lengths + attributes
        buf[17] -= 2;
        match BgpUpdateMessage::decode(&mut buf.freeze()) {
            Err(Error::InconsistentLength(msg)) => assert!(msg.contains("overrun")),
            other => panic!("expected inconsistent length, got {:?}", other),
        }
    }

    #[test]
    fn update_larger_than_envelope() {
        let mut buf = update_message(&[], &[], &[24, 192, 168, 1]);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            BgpUpdateMessage::decode(&mut buf.freeze()),
            Err(Error::InconsistentLength(_))
        ));
    }

    #[test]
    fn update_partial_withdrawn_prefix() {
        // /24 needs 3 bytes, section only has 2 after the length
        let mut data = update_message(&[24, 10, 0], &[], &[]).freeze();
        assert!(matches!(
            BgpUpdateMessage::decode(&mut data),
            Err(Error::MalformedSequence("withdrawn routes"))
        ));
    }

    #[test]
    fn update_partial_path_attribute() {
        let mut data = update_message(&[], &[0x40, 2, 4, 2, 1], &[]).freeze();
        assert!(matches!(
            BgpUpdateMessage::decode(&mut data),
            Err(Error::MalformedSequence("path attributes"))
        ));
    }
}
