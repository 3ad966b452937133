//! Segment framing, checksum, and simulated loss/corruption.
//!
//! Wire format: `!& <header><payload> !#`. The recognizer below is a direct
//! generalization of `snp_recvseg`'s four-state scanner from the original C
//! reference (`common/seg.c`): `Idle`/`START1`, `SawStartBang`/`START2`,
//! `InSegment`/`RECV`, `SawEndBang`/`STOP1`.

use std::io::{Read, Write};

use rand::Rng;

use crate::config::Config;
use crate::err::Error;

pub const HEADER_LEN: usize = 18;
const START_MARKER: [u8; 2] = *b"!&";
const END_MARKER: [u8; 2] = *b"!#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SegmentType {
    Syn = 0,
    SynAck = 1,
    Fin = 2,
    FinAck = 3,
    Data = 4,
    DataAck = 5,
}

impl SegmentType {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => SegmentType::Syn,
            1 => SegmentType::SynAck,
            2 => SegmentType::Fin,
            3 => SegmentType::FinAck,
            4 => SegmentType::Data,
            5 => SegmentType::DataAck,
            _ => return None,
        })
    }
}

/// Fixed 18-byte segment header: src_port, dest_port, seq_num, ack_num,
/// length, checksum, type, in host (native) byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub src_port: u16,
    pub dest_port: u16,
    pub seq_num: u32,
    pub ack_num: u32,
    pub length: u16,
    pub checksum: u16,
    pub segment_type: SegmentType,
}

impl SegmentHeader {
    fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.src_port.to_ne_bytes());
        buf[2..4].copy_from_slice(&self.dest_port.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.seq_num.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.ack_num.to_ne_bytes());
        buf[12..14].copy_from_slice(&self.length.to_ne_bytes());
        buf[14..16].copy_from_slice(&self.checksum.to_ne_bytes());
        buf[16..18].copy_from_slice(&(self.segment_type as u16).to_ne_bytes());
    }

    fn read_from(buf: &[u8]) -> Option<Self> {
        let segment_type = SegmentType::from_u16(u16::from_ne_bytes(buf[16..18].try_into().unwrap()))?;
        Some(SegmentHeader {
            src_port: u16::from_ne_bytes(buf[0..2].try_into().unwrap()),
            dest_port: u16::from_ne_bytes(buf[2..4].try_into().unwrap()),
            seq_num: u32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            ack_num: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            length: u16::from_ne_bytes(buf[12..14].try_into().unwrap()),
            checksum: u16::from_ne_bytes(buf[14..16].try_into().unwrap()),
            segment_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: SegmentHeader,
    pub payload: Vec<u8>,
}

/// One's-complement 16-bit sum over `buf`, which must have even length.
fn fold_checksum(buf: &[u8]) -> u16 {
    debug_assert!(buf.len() % 2 == 0);
    let mut sum: u32 = 0;
    for word in buf.chunks_exact(2) {
        sum += u16::from_ne_bytes([word[0], word[1]]) as u32;
        if sum & 0x1_0000 != 0 {
            sum = (sum & 0xFFFF) + 1;
        }
    }
    sum as u16
}

fn padded_even(buf: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    if buf.len() % 2 == 1 {
        let mut padded = Vec::with_capacity(buf.len() + 1);
        padded.extend_from_slice(buf);
        padded.push(0);
        std::borrow::Cow::Owned(padded)
    } else {
        std::borrow::Cow::Borrowed(buf)
    }
}

/// Checksum field of `header` is ignored and recomputed; returns the wire
/// bytes (header + payload, exactly `payload.len()` data bytes — the even
/// length padding used for the checksum computation is never transmitted).
pub fn encode(mut header: SegmentHeader, payload: &[u8]) -> Vec<u8> {
    header.length = payload.len() as u16;
    header.checksum = 0;

    let mut scratch = vec![0u8; HEADER_LEN + payload.len()];
    header.write_to(&mut scratch[0..HEADER_LEN]);
    scratch[HEADER_LEN..].copy_from_slice(payload);

    let sum = fold_checksum(&padded_even(&scratch));
    header.checksum = !sum;

    header.write_to(&mut scratch[0..HEADER_LEN]);
    scratch
}

/// `true` if `raw` (header + payload, as received, checksum field intact)
/// passes validation: the one's-complement sum over the even-padded buffer
/// folds to `0xFFFF`.
fn validate(raw: &[u8]) -> bool {
    fold_checksum(&padded_even(raw)) == 0xFFFF
}

pub fn send_segment<W: Write>(writer: &mut W, header: SegmentHeader, payload: &[u8]) -> Result<(), Error> {
    let wire = encode(header, payload);
    writer.write_all(&START_MARKER)?;
    writer.write_all(&wire)?;
    writer.write_all(&END_MARKER)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecognizerState {
    Idle,
    SawStartBang,
    InSegment,
    SawEndBang,
}

/// With probability `cfg.pkt_loss_rate`, either drops `raw` (returns `true`)
/// or flips a single random bit within its bytes (returns `false`), mirroring
/// `seglost()` in the original C reference.
fn maybe_corrupt(raw: &mut [u8], cfg: &Config, rng: &mut impl Rng) -> bool {
    if !rng.gen_bool(cfg.pkt_loss_rate.clamp(0.0, 1.0)) {
        return false;
    }
    if rng.gen_bool(0.5) {
        return true;
    }
    if raw.is_empty() {
        return false;
    }
    let bit = rng.gen_range(0..raw.len() * 8);
    raw[bit / 8] ^= 1 << (bit % 8);
    false
}

/// Reads bytes one at a time from `reader` until a framed, simulated-fault
/// survivor, checksum-valid segment is assembled, exactly as `snp_recvseg`
/// loops internally past dropped/corrupt segments.
pub fn recv_segment<R: Read>(reader: &mut R, cfg: &Config, rng: &mut impl Rng) -> Result<Segment, Error> {
    loop {
        let mut raw = Vec::new();
        let mut state = RecognizerState::Idle;
        let mut byte = [0u8; 1];

        loop {
            reader.read_exact(&mut byte)?;
            let c = byte[0];

            match state {
                RecognizerState::Idle => {
                    if c == b'!' {
                        state = RecognizerState::SawStartBang;
                    }
                }
                RecognizerState::SawStartBang => {
                    state = if c == b'&' {
                        raw.clear();
                        RecognizerState::InSegment
                    } else {
                        RecognizerState::Idle
                    };
                }
                RecognizerState::InSegment => {
                    if c == b'!' {
                        state = RecognizerState::SawEndBang;
                    } else {
                        raw.push(c);
                    }
                }
                RecognizerState::SawEndBang => {
                    if c == b'#' {
                        break;
                    }
                    if c == b'!' {
                        // The pending `!` wasn't the start of the end marker after
                        // all; it's data. The new `!` becomes the pending byte and
                        // might still start the real terminator.
                        raw.push(b'!');
                    } else {
                        raw.push(b'!');
                        raw.push(c);
                        state = RecognizerState::InSegment;
                    }
                }
            }
        }

        if raw.len() < HEADER_LEN {
            continue;
        }

        if maybe_corrupt(&mut raw, cfg, rng) {
            log::debug!("segment lost in transit");
            continue;
        }

        if !validate(&raw) {
            log::debug!("checksum error, dropping segment");
            continue;
        }

        let header = match SegmentHeader::read_from(&raw[0..HEADER_LEN]) {
            Some(h) => h,
            None => continue,
        };

        if HEADER_LEN + header.length as usize != raw.len() {
            continue;
        }

        let payload = raw[HEADER_LEN..].to_vec();
        return Ok(Segment { header, payload });
    }
}
