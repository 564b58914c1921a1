//! DNS message parsing and construction.
//!
//! Only the pieces the proxy needs are decoded: the question section of
//! incoming queries, and the A/AAAA/NS/PTR records of upstream replies.
//! Everything else is skipped over by length.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 12;

/// TTL written into synthesized answers. The cached record is not
/// re-verified against upstream, so clients are told to come back soon.
pub const SYNTHETIC_TTL: u32 = 60;

const POINTER_MASK: u8 = 0xC0;
const CLASS_IN: u16 = 1;
/// Standard response, recursion desired + available, no error.
const RESPONSE_FLAGS: u16 = 0x8180;

/// Record types the proxy understands and caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Ns,
    Ptr,
    Aaaa,
}

impl RecordType {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(RecordType::A),
            2 => Some(RecordType::Ns),
            12 => Some(RecordType::Ptr),
            28 => Some(RecordType::Aaaa),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Ptr => 12,
            RecordType::Aaaa => 28,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Ns => write!(f, "NS"),
            RecordType::Ptr => write!(f, "PTR"),
            RecordType::Aaaa => write!(f, "AAAA"),
        }
    }
}

/// A DNS question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// The question's type, if it is one the proxy caches.
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_code(self.qtype)
    }
}

/// Decoded value of a supported resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Ptr(String),
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Ptr(_) => RecordType::Ptr,
        }
    }

    /// Parse a value from its textual form (dotted-decimal, colon-hex, or a
    /// domain name). Returns `None` if the text does not fit `rtype`.
    pub fn parse(rtype: RecordType, value: &str) -> Option<Self> {
        match rtype {
            RecordType::A => value.parse().ok().map(RecordData::A),
            RecordType::Aaaa => value.parse().ok().map(RecordData::Aaaa),
            RecordType::Ns if !value.is_empty() => Some(RecordData::Ns(value.to_string())),
            RecordType::Ptr if !value.is_empty() => Some(RecordData::Ptr(value.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(addr) => addr.fmt(f),
            RecordData::Aaaa(addr) => addr.fmt(f),
            RecordData::Ns(name) | RecordData::Ptr(name) => f.write_str(name),
        }
    }
}

/// A DNS resource record learned from an upstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub data: RecordData,
    pub ttl: u32,
}

/// Read the 16-bit transaction ID of a message.
pub fn transaction_id(data: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*data.first()?, *data.get(1)?]))
}

/// Parse the question section of a DNS message.
pub fn parse_questions(data: &[u8]) -> Result<Vec<DnsQuestion>> {
    read_questions(data).map(|(questions, _)| questions)
}

/// Parse every supported record in the answer, authority and additional
/// sections of a DNS response.
///
/// Records of other types are skipped. Records whose value cannot be
/// decoded (wrong rdata length, empty name) are dropped.
pub fn parse_records(data: &[u8]) -> Result<Vec<DnsRecord>> {
    let (_, end) = read_questions(data)?;
    let total = [6, 8, 10]
        .iter()
        .map(|&i| u16::from_be_bytes([data[i], data[i + 1]]) as usize)
        .sum::<usize>();

    let mut reader = Reader::new(data, end);
    let mut records = Vec::new();

    for _ in 0..total {
        let name = reader.name()?;
        let rtype = reader.u16()?;
        let _class = reader.u16()?;
        let ttl = reader.u32()?;
        let rdlength = reader.u16()? as usize;
        let rdata_start = reader.pos;
        let rdata = reader.bytes(rdlength)?;

        let Some(rtype) = RecordType::from_code(rtype) else {
            continue;
        };
        if let Some(value) = decode_rdata(data, rtype, rdata_start, rdata) {
            records.push(DnsRecord {
                name,
                data: value,
                ttl,
            });
        }
    }

    Ok(records)
}

/// Build a single-answer response to `query` from a cached IPv4 address.
///
/// The transaction ID and question section are copied from the query
/// verbatim; the answer's owner name points back at the first question.
pub fn synthesize_answer(query: &[u8], addr: Ipv4Addr) -> Result<Vec<u8>> {
    let (questions, end) = read_questions(query)?;
    if questions.is_empty() {
        return Err(Error::MalformedPacket("query has no question"));
    }

    let mut data = Vec::with_capacity(end + 16);

    // Header
    data.extend_from_slice(&query[..2]);
    data.extend_from_slice(&RESPONSE_FLAGS.to_be_bytes());
    data.extend_from_slice(&query[4..6]); // QDCOUNT
    data.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    data.extend_from_slice(&query[HEADER_LEN..end]);

    // Answer
    data.extend_from_slice(&[POINTER_MASK, HEADER_LEN as u8]);
    data.extend_from_slice(&RecordType::A.code().to_be_bytes());
    data.extend_from_slice(&CLASS_IN.to_be_bytes());
    data.extend_from_slice(&SYNTHETIC_TTL.to_be_bytes());
    data.extend_from_slice(&4u16.to_be_bytes());
    data.extend_from_slice(&addr.octets());

    Ok(data)
}

/// Parse the question section, returning the questions and the offset just
/// past the section.
fn read_questions(data: &[u8]) -> Result<(Vec<DnsQuestion>, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::MalformedPacket("shorter than DNS header"));
    }

    let qdcount = u16::from_be_bytes([data[4], data[5]]);
    let mut reader = Reader::new(data, HEADER_LEN);
    let mut questions = Vec::with_capacity(qdcount.min(8) as usize);

    for _ in 0..qdcount {
        let name = reader.name()?;
        let qtype = reader.u16()?;
        let qclass = reader.u16()?;
        questions.push(DnsQuestion {
            name,
            qtype,
            qclass,
        });
    }

    Ok((questions, reader.pos))
}

fn decode_rdata(data: &[u8], rtype: RecordType, start: usize, rdata: &[u8]) -> Option<RecordData> {
    match rtype {
        RecordType::A => <[u8; 4]>::try_from(rdata)
            .ok()
            .map(|octets| RecordData::A(Ipv4Addr::from(octets))),
        RecordType::Aaaa => <[u8; 16]>::try_from(rdata)
            .ok()
            .map(|octets| RecordData::Aaaa(Ipv6Addr::from(octets))),
        RecordType::Ns | RecordType::Ptr => {
            let (name, _) = read_name(data, start).ok()?;
            if name.is_empty() {
                return None;
            }
            Some(if rtype == RecordType::Ns {
                RecordData::Ns(name)
            } else {
                RecordData::Ptr(name)
            })
        }
    }
}

/// Decode a (possibly compressed) domain name starting at `start`.
///
/// Returns the name and the offset where the enclosing record continues:
/// just past the first compression pointer if one was followed, otherwise
/// just past the terminating zero label. Every pointer must land strictly
/// before the previous jump target, which rules out loops.
fn read_name(data: &[u8], start: usize) -> Result<(String, usize)> {
    let mut labels: Vec<&str> = Vec::new();
    let mut pos = start;
    let mut resume = None;
    let mut last_target = None;

    loop {
        let len = *data
            .get(pos)
            .ok_or(Error::MalformedPacket("name runs past end of buffer"))?;

        match len & POINTER_MASK {
            0x00 => {
                pos += 1;
                if len == 0 {
                    break;
                }
                let end = pos + len as usize;
                let label = data
                    .get(pos..end)
                    .ok_or(Error::MalformedPacket("label runs past end of buffer"))?;
                let label = std::str::from_utf8(label)
                    .map_err(|_| Error::MalformedPacket("label is not valid UTF-8"))?;
                labels.push(label);
                pos = end;
            }
            POINTER_MASK => {
                let low = *data
                    .get(pos + 1)
                    .ok_or(Error::MalformedPacket("truncated compression pointer"))?;
                let target = (((len & !POINTER_MASK) as usize) << 8) | low as usize;
                if target >= last_target.unwrap_or(pos) {
                    return Err(Error::MalformedPacket("compression pointer does not point backwards"));
                }
                if resume.is_none() {
                    resume = Some(pos + 2);
                }
                last_target = Some(target);
                pos = target;
            }
            _ => return Err(Error::MalformedPacket("reserved label type")),
        }
    }

    Ok((labels.join("."), resume.unwrap_or(pos)))
}

/// Bounds-checked cursor over a message buffer.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or(Error::MalformedPacket("record runs past end of buffer"))?;
        self.pos += len;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn name(&mut self) -> Result<String> {
        let (name, next) = read_name(self.data, self.pos)?;
        self.pos = next;
        Ok(name)
    }
}
