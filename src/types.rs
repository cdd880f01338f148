use crate::bgp::{BgpOpenMessage, BgpUpdateMessage};
use crate::utils::{decode_all, Afi, ReadUtils};
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use serde_derive::Serialize;

use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Version, record length and record type
pub const BMP_HEADER_LEN: usize = 6;
/// Size of the per-peer header on the wire
pub const PER_PEER_HEADER_LEN: usize = 42;

/// There are a few different types of BMP message, refer to RFC7854 for details. This enum
/// encapsulates the different types
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum BmpPayload {
    /// RouteMonitoring messages carry a single BGP UPDATE from the monitored peer
    RouteMonitoring(RouteMonitoring),
    /// Periodic counters for a peer
    StatisticsReport(StatisticsReport),
    /// A peering session went down
    PeerDownNotification(PeerDownNotification),
    /// PeerUp messages are sent in bulk when a session is initially established, then over the life
    /// of the session as peers change status
    PeerUpNotification(PeerUpNotification),
    /// Initiation message, this is sent once at the start of a BMP session to advertise speaker
    /// information
    InitiationMessage(InitiationMessage),
    /// Sent by the speaker just before it closes the BMP session
    TerminationMessage(TerminationMessage),
}

impl BmpPayload {
    /// The record type this payload is carried under
    pub fn record_type(&self) -> RecordType {
        match self {
            BmpPayload::RouteMonitoring(_) => RecordType::RouteMonitoring,
            BmpPayload::StatisticsReport(_) => RecordType::StatisticsReport,
            BmpPayload::PeerDownNotification(_) => RecordType::PeerDown,
            BmpPayload::PeerUpNotification(_) => RecordType::PeerUp,
            BmpPayload::InitiationMessage(_) => RecordType::Initiation,
            BmpPayload::TerminationMessage(_) => RecordType::Termination,
        }
    }

    /// Per-peer header, for the payloads that have one
    pub fn peer_header(&self) -> Option<&PeerHeader> {
        match self {
            BmpPayload::RouteMonitoring(m) => Some(&m.header),
            BmpPayload::StatisticsReport(m) => Some(&m.header),
            BmpPayload::PeerDownNotification(m) => Some(&m.header),
            BmpPayload::PeerUpNotification(m) => Some(&m.header),
            BmpPayload::InitiationMessage(_) | BmpPayload::TerminationMessage(_) => None,
        }
    }
}

/// BMP Message Types (RFC7854 Section 10.1)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[repr(u8)]
pub enum RecordType {
    /// Route Monitoring
    RouteMonitoring = 0,
    /// Statistics Report
    StatisticsReport = 1,
    /// Peer Down
    PeerDown = 2,
    /// Peer Up
    PeerUp = 3,
    /// Initiation
    Initiation = 4,
    /// Termination
    Termination = 5,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordType::RouteMonitoring),
            1 => Ok(RecordType::StatisticsReport),
            2 => Ok(RecordType::PeerDown),
            3 => Ok(RecordType::PeerUp),
            4 => Ok(RecordType::Initiation),
            5 => Ok(RecordType::Termination),

            v => Err(Error::UnknownRecordType(v)),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::RouteMonitoring => write!(f, "route_monitoring"),
            RecordType::StatisticsReport => write!(f, "statistics_report"),
            RecordType::PeerUp => write!(f, "peer_up"),
            RecordType::PeerDown => write!(f, "peer_down"),
            RecordType::Initiation => write!(f, "initiation"),
            RecordType::Termination => write!(f, "termination"),
        }
    }
}

/// BMP Peer Types (RFC7854 Section 10.2)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum PeerType {
    /// Global Instance Peer
    GlobalInstance,
    /// RD Instance Peer
    RdInstance,
    /// Local Instance Peer
    LocalInstance,
    /// Anything else, kept as sent
    Other(u8),
}

impl From<u8> for PeerType {
    fn from(value: u8) -> Self {
        match value {
            0 => PeerType::GlobalInstance,
            1 => PeerType::RdInstance,
            2 => PeerType::LocalInstance,
            v => PeerType::Other(v),
        }
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PeerType::GlobalInstance => write!(f, "global"),
            PeerType::RdInstance => write!(f, "rd"),
            PeerType::LocalInstance => write!(f, "local"),
            PeerType::Other(v) => write!(f, "{}", v),
        }
    }
}

/// BMP Peer Flags (RFC7854 Section 10.3)
///
/// Only the top two bits are interpreted, the rest are carried as `reserved`
/// and never checked.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct PeerFlags {
    /// Address family of the peer (and local) address
    pub afi: Afi,
    /// Whether the routes reflect post-policy state
    pub installed: bool,
    /// Low 6 bits
    pub reserved: u8,
}

impl PeerFlags {
    fn decode(value: u8) -> Result<Self> {
        let afi = Afi::try_from(value >> 7)?;
        let installed = value & 0b0100_0000 != 0;
        let reserved = value & 0b0011_1111;

        Ok(Self { afi, installed, reserved })
    }

    /// Peer address is IPv6
    pub fn is_ipv6(&self) -> bool {
        self.afi == Afi::Ipv6
    }
}

/// Message container
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BmpRecord {
    /// BMP version (should be 3)
    pub version: u8,
    /// Record length, common header included
    pub record_length: u32,
    /// Message type
    pub record_type: RecordType,
    /// Message data
    pub payload: BmpPayload,
}

/// Per-Peer Header
///
/// The per-peer header follows the common header for most BMP messages.
/// The rest of the data in a BMP message is dependent on the RecordType
/// field in the common header.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PeerHeader {
    /// Peer Type
    pub peer_type: PeerType,
    /// Peer Flags
    pub peer_flags: PeerFlags,
    /// Route distinguisher, meaning depends on PeerType
    pub route_distinguisher: u64,
    /// Peer address (TCP address used in BGP session)
    pub peer_addr: IpAddr,
    /// Peer ASN
    pub peer_asn: u32,
    /// Peer BGP Router ID
    pub peer_bgp_id: Ipv4Addr,
    /// Timestamp (seconds since epoch)
    pub timestamp_sec: u32,
    /// Microseconds, to be added to `timestamp_sec`
    pub timestamp_usec: u32,
}

impl PeerHeader {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        buf.has_n_remaining(PER_PEER_HEADER_LEN)?;

        let peer_type = PeerType::from(buf.read_u8()?);
        let peer_flags = PeerFlags::decode(buf.read_u8()?)?;
        let route_distinguisher = buf.read_u64()?;
        let peer_addr = buf.read_address16(peer_flags.afi)?;
        let peer_asn = buf.read_u32()?;
        let peer_bgp_id = buf.read_ipv4_address()?;
        let timestamp_sec = buf.read_u32()?;
        let timestamp_usec = buf.read_u32()?;

        Ok(Self {
            peer_type,
            peer_flags,
            route_distinguisher,
            peer_addr,
            peer_asn,
            peer_bgp_id,
            timestamp_sec,
            timestamp_usec,
        })
    }

    /// Timestamp as fractional seconds since epoch
    pub fn timestamp(&self) -> f64 {
        self.timestamp_sec as f64 + self.timestamp_usec as f64 / 1_000_000.0
    }
}

/// Information TLV
///
/// Used by the Initiation, Termination and Peer Up messages.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InformationTlv {
    /// TLV message type
    pub info_type: u16,
    /// TLV message value
    pub info: Vec<u8>,
}

impl InformationTlv {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let info_type = buf.read_u16()?;
        let len = buf.read_u16()? as usize;
        let info = buf.read_n_bytes(len)?;

        Ok(Self { info_type, info })
    }

    /// Value as text, invalid UTF-8 replaced
    pub fn info_str(&self) -> String {
        String::from_utf8_lossy(&self.info).into_owned()
    }
}

/// Route Monitoring
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RouteMonitoring {
    /// Per-peer header
    pub header: PeerHeader,
    /// Embedded BGP UPDATE
    pub update: BgpUpdateMessage,
}

impl RouteMonitoring {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = PeerHeader::decode(buf)?;
        let update = BgpUpdateMessage::decode(buf)?;

        Ok(Self { header, update })
    }
}

/// Statistics value, its width picked by the declared size
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum StatValue {
    /// 4 byte counter
    Counter(u32),
    /// 8 byte gauge
    Gauge(u64),
}

impl StatValue {
    /// Value widened to 64 bits
    pub fn as_u64(&self) -> u64 {
        match *self {
            StatValue::Counter(v) => v as u64,
            StatValue::Gauge(v) => v,
        }
    }
}

/// Single statistic out of a Statistics Report
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatEntry {
    /// Stat type
    pub stat_type: u16,
    /// Declared size, 4 or 8
    pub size: u16,
    /// Value
    pub value: StatValue,
}

impl StatEntry {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let stat_type = buf.read_u16()?;
        let size = buf.read_u16()?;
        let value = match size {
            4 => StatValue::Counter(buf.read_u32()?),
            8 => StatValue::Gauge(buf.read_u64()?),
            v => return Err(Error::InvalidStatsSize(v)),
        };

        Ok(Self { stat_type, size, value })
    }

    /// Name of the RFC7854 stat types, if this is one
    pub fn name(&self) -> Option<&'static str> {
        match self.stat_type {
            0 => Some("rejected_prefixes"),
            1 => Some("duplicate_prefix_advertisements"),
            2 => Some("duplicate_withdraws"),
            3 => Some("cluster_list_loop_updates"),
            4 => Some("as_path_loop_updates"),
            5 => Some("originator_id_updates"),
            6 => Some("as_confed_loop_updates"),
            7 => Some("adj_rib_in_routes"),
            8 => Some("loc_rib_routes"),
            _ => None,
        }
    }
}

/// Statistics Report
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatisticsReport {
    /// Per-peer header
    pub header: PeerHeader,
    /// Counters, as many as the report's count declares
    pub stats: Vec<StatEntry>,
}

impl StatisticsReport {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = PeerHeader::decode(buf)?;
        let count = buf.read_u32()?;

        let mut stats = vec![];
        for _ in 0..count {
            stats.push(StatEntry::decode(buf)?);
        }

        Ok(Self { header, stats })
    }
}

/// Peer Down Notification
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PeerDownNotification {
    /// Per-peer header
    pub header: PeerHeader,
    /// Reason code
    pub reason: u8,
    /// Rest of the record, present for reasons 0 through 3
    pub data: Option<Vec<u8>>,
}

impl PeerDownNotification {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = PeerHeader::decode(buf)?;
        let reason = buf.read_u8()?;

        let data = if reason <= 3 {
            let n = buf.remaining();
            Some(buf.read_n_bytes(n)?)
        } else {
            None
        };

        Ok(Self { header, reason, data })
    }
}

/// Peer Up Notification
///
/// The Peer Up message is used to indicate that a peering session has
/// come up (i.e., has transitioned into the Established state).
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PeerUpNotification {
    /// Per-peer header
    pub header: PeerHeader,
    /// Local IP address used in BGP TCP session
    pub local_addr: IpAddr,
    /// Local TCP port
    pub local_port: u16,
    /// Remote TCP port
    pub remote_port: u16,
    /// BGP OPEN message sent by the BMP speaker
    pub sent_open: BgpOpenMessage,
    /// BGP OPEN message received by the BMP speaker
    pub received_open: BgpOpenMessage,
    /// Information TLVs
    pub information: Vec<InformationTlv>,
}

impl PeerUpNotification {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = PeerHeader::decode(buf)?;
        let local_addr = buf.read_address16(header.peer_flags.afi)?;
        let local_port = buf.read_u16()?;
        let remote_port = buf.read_u16()?;

        let sent_open = BgpOpenMessage::decode(buf)?;
        let received_open = BgpOpenMessage::decode(buf)?;

        let n = buf.remaining();
        let rest = buf.copy_to_bytes(n);
        let information = decode_all(rest, "peer up information", InformationTlv::decode)?;

        Ok(Self {
            header,
            local_addr,
            local_port,
            remote_port,
            sent_open,
            received_open,
            information,
        })
    }
}

/// Initiation Message
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InitiationMessage {
    /// Information TLVs, filling the record
    pub tlvs: Vec<InformationTlv>,
}

impl InitiationMessage {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let n = buf.remaining();
        let rest = buf.copy_to_bytes(n);
        let tlvs = decode_all(rest, "initiation information", InformationTlv::decode)?;

        Ok(Self { tlvs })
    }
}

/// Termination Message
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TerminationMessage {
    /// The single information TLV
    pub tlv: InformationTlv,
}

impl TerminationMessage {
    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self> {
        let tlv = InformationTlv::decode(buf)?;

        Ok(Self { tlv })
    }
}
