//! Bounds-checked big-endian readers over [`Bytes`].
//!
//! Every read checks the remaining length first and returns
//! [`Error::TruncatedInput`] instead of panicking the way the raw
//! [`Buf`] getters do.
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

impl ReadUtils for Bytes {}

/// Address family of a peer, local address or prefix
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Afi {
    /// IPv4
    Ipv4,
    /// IPv6
    Ipv6,
}

impl Afi {
    /// Longest valid prefix for this family, in bits
    pub fn max_prefix_len(self) -> u8 {
        match self {
            Afi::Ipv4 => 32,
            Afi::Ipv6 => 128,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Afi::Ipv4 => "IPv4",
            Afi::Ipv6 => "IPv6",
        }
    }
}

impl TryFrom<u8> for Afi {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Afi::Ipv4),
            1 => Ok(Afi::Ipv6),
            v => Err(Error::UnknownAddressFamily(v)),
        }
    }
}

impl fmt::Display for Afi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build an address of the given family from exactly 4 or 16 bytes
pub(crate) fn addr_from_slice(afi: Afi, bytes: &[u8]) -> Result<IpAddr> {
    let invalid = || Error::InvalidAddress { family: afi.name(), len: bytes.len() };

    match afi {
        Afi::Ipv4 => <[u8; 4]>::try_from(bytes)
            .map(|b| IpAddr::V4(Ipv4Addr::from(b)))
            .map_err(|_| invalid()),
        Afi::Ipv6 => <[u8; 16]>::try_from(bytes)
            .map(|b| IpAddr::V6(Ipv6Addr::from(b)))
            .map_err(|_| invalid()),
    }
}

pub(crate) trait ReadUtils: Buf {
    #[inline]
    fn has_n_remaining(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::truncated(n, self.remaining()))
        } else {
            Ok(())
        }
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        self.has_n_remaining(1)?;
        Ok(self.get_u8())
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16> {
        self.has_n_remaining(2)?;
        Ok(self.get_u16())
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32> {
        self.has_n_remaining(4)?;
        Ok(self.get_u32())
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64> {
        self.has_n_remaining(8)?;
        Ok(self.get_u64())
    }

    #[inline]
    fn read_u128(&mut self) -> Result<u128> {
        self.has_n_remaining(16)?;
        Ok(self.get_u128())
    }

    fn skip_n(&mut self, n: usize) -> Result<()> {
        self.has_n_remaining(n)?;
        self.advance(n);
        Ok(())
    }

    fn read_n_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.has_n_remaining(n)?;
        let mut out = vec![0; n];
        self.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Split off the next `n` bytes as their own buffer
    fn split_n(&mut self, n: usize) -> Result<Bytes> {
        self.has_n_remaining(n)?;
        Ok(self.copy_to_bytes(n))
    }

    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr> {
        Ok(Ipv4Addr::from(self.read_u32()?))
    }

    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr> {
        Ok(Ipv6Addr::from(self.read_u128()?))
    }

    /// IPv4 address carried in the last 4 bytes of a 16 byte field.
    /// The leading 12 bytes are skipped without checking them.
    fn read_ipv4_padded(&mut self) -> Result<Ipv4Addr> {
        self.has_n_remaining(16)?;
        self.advance(12);
        self.read_ipv4_address()
    }

    /// 16 byte address field, interpreted per `afi`
    fn read_address16(&mut self, afi: Afi) -> Result<IpAddr> {
        match afi {
            Afi::Ipv4 => self.read_ipv4_padded().map(IpAddr::V4),
            Afi::Ipv6 => self.read_ipv6_address().map(IpAddr::V6),
        }
    }
}

/// Decode `buf` to the end as a run of elements.
///
/// Running out of bytes part way through an element means the section's
/// length doesn't cover a whole number of elements, reported against
/// `section`.
pub(crate) fn decode_all<T, F>(mut buf: Bytes, section: &'static str, mut decode: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Bytes) -> Result<T>,
{
    let mut out = vec![];
    while buf.has_remaining() {
        match decode(&mut buf) {
            Ok(item) => out.push(item),
            Err(e) if e.is_truncation() => return Err(Error::MalformedSequence(section)),
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}
