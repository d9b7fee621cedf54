//! Wire framing for data delivery.
//!
//! Control frames (`resume`, `init_begin`, `init_complete`, `heartbeat`,
//! `error`, ...) are always JSON text. Data frames (`history`, `delta`,
//! `live`) are JSON text under the `"text"` wire format and a compact
//! big-endian binary encoding under `"binary"` — mirroring the reference
//! server's `_send`/`_encode_samples_binary`, and written in the
//! checksum-free, hand-rolled-struct style of [`crate::edge::wire`]'s
//! `EdgeTick` codec.

use serde::Serialize;
use serde_json::{json, Value};

use super::error::WireError;
use super::sample::{Payload, PayloadKind, Sample};

/// Negotiated wire format for data frames. Control frames are always text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Text,
    Binary,
}

/// The three data-frame kinds, also the binary frame's leading code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataFrameKind {
    History = 1,
    Delta = 2,
    Live = 3,
}

impl DataFrameKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Delta => "delta",
            Self::Live => "live",
        }
    }
}

fn payload_to_json(payload: &Payload) -> Value {
    match payload {
        Payload::Tick { price, volume } => json!({ "price": price, "volume": volume }),
        Payload::Scalar { value } => json!({ "value": *value }),
        Payload::Ohlc { o, h, l, c } => json!({ "o": o, "h": h, "l": l, "c": c }),
        Payload::Signal { strategy, side, desired_qty, price, reason } => json!({
            "strategy": strategy,
            "side": if matches!(side, super::sample::Side::Long) { "long" } else { "short" },
            "desired_qty": desired_qty,
            "price": price,
            "reason": reason,
        }),
        Payload::Marker { strategy, side, tag, price, qty } => json!({
            "strategy": strategy,
            "side": if matches!(side, super::sample::Side::Long) { "long" } else { "short" },
            "tag": tag,
            "price": price,
            "qty": qty,
        }),
    }
}

fn sample_to_json(sample: &Sample) -> Value {
    json!({
        "seq": sample.seq,
        "series_seq": sample.series_seq,
        "t_ms": sample.t_ms,
        "series_id": sample.series_id,
        "payload": payload_to_json(&sample.payload),
    })
}

/// Builds the JSON text form of a data frame: `{"type": "...", "samples": [...]}`.
pub fn data_frame_json(kind: DataFrameKind, samples: &[std::sync::Arc<Sample>]) -> Value {
    json!({
        "type": kind.as_str(),
        "samples": samples.iter().map(|s| sample_to_json(s)).collect::<Vec<_>>(),
    })
}

/// Serializes any JSON-able control/data value to the compact text form the
/// reference server writes: `json.dumps(obj, separators=(",", ":"))`.
pub fn to_text(value: &impl Serialize) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

fn truncate_to_255_bytes(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    if bytes.len() <= 255 {
        bytes
    } else {
        // Truncate on a char boundary at or before 255 bytes.
        let mut end = 255;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &bytes[..end]
    }
}

fn push_str255(buf: &mut Vec<u8>, s: &str) {
    let bytes = truncate_to_255_bytes(s);
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

/// Encodes a batch of samples as a compact binary data frame. Returns an
/// empty vector for an empty batch — there is nothing useful to send.
pub fn encode_samples_binary(kind: DataFrameKind, samples: &[std::sync::Arc<Sample>]) -> Vec<u8> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut buf = Vec::with_capacity(5 + samples.len() * 32);
    buf.push(kind as u8);
    buf.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for s in samples {
        buf.extend_from_slice(&(s.seq as f64).to_be_bytes());
        buf.extend_from_slice(&(s.series_seq as f64).to_be_bytes());
        buf.extend_from_slice(&(s.t_ms as f64).to_be_bytes());
        push_str255(&mut buf, &s.series_id);
        let kind = s.kind();
        buf.push(kind as u8);
        match (&kind, &s.payload) {
            (PayloadKind::Tick, Payload::Tick { price, volume }) => {
                buf.extend_from_slice(&price.to_be_bytes());
                buf.extend_from_slice(&volume.to_be_bytes());
            }
            (PayloadKind::Scalar | PayloadKind::Pnl, Payload::Scalar { value }) => {
                let v = value.unwrap_or(f64::NAN);
                buf.extend_from_slice(&v.to_be_bytes());
            }
            (PayloadKind::Ohlc, Payload::Ohlc { o, h, l, c }) => {
                buf.extend_from_slice(&o.to_be_bytes());
                buf.extend_from_slice(&h.to_be_bytes());
                buf.extend_from_slice(&l.to_be_bytes());
                buf.extend_from_slice(&c.to_be_bytes());
            }
            (
                PayloadKind::Signal,
                Payload::Signal { strategy, side, desired_qty, price, reason },
            ) => {
                push_str255(&mut buf, strategy);
                buf.push(side.as_byte());
                buf.extend_from_slice(&(*desired_qty as i32).to_be_bytes());
                buf.extend_from_slice(&price.to_be_bytes());
                push_str255(&mut buf, reason);
            }
            (PayloadKind::Marker, Payload::Marker { strategy, side, tag, price, qty }) => {
                push_str255(&mut buf, strategy);
                buf.push(side.as_byte());
                push_str255(&mut buf, tag);
                buf.extend_from_slice(&price.to_be_bytes());
                buf.extend_from_slice(&(*qty as i32).to_be_bytes());
            }
            // classify() and the Payload variant are always in agreement for
            // well-formed producers; this arm only guards against a future
            // payload/classifier mismatch.
            _ => unreachable!("payload kind {:?} does not match payload shape", kind),
        }
    }
    buf
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.remaining() < n {
            Err(WireError::TooShort { need: n, have: self.remaining() })
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        self.need(4)?;
        let v = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn f64(&mut self) -> Result<f64, WireError> {
        self.need(8)?;
        let v = f64::from_be_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn str255(&mut self, field: &'static str) -> Result<String, WireError> {
        let len = self.u8()? as usize;
        self.need(len)?;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| WireError::Utf8(field))
    }
}

/// A decoded binary data frame: its kind and the samples it carried.
/// `seq`/`series_seq`/`t_ms` round-trip through `f64` as the reference
/// encoding does, then are rounded back to integers.
pub struct DecodedFrame {
    pub kind: DataFrameKind,
    pub samples: Vec<Sample>,
}

/// Decodes a binary data frame produced by [`encode_samples_binary`]. Used
/// by tests to assert the codec round-trips; the server itself only ever
/// encodes, since clients do not upload sample data.
pub fn decode_samples_binary(buf: &[u8]) -> Result<DecodedFrame, WireError> {
    let mut c = Cursor::new(buf);
    let kind = match c.u8()? {
        1 => DataFrameKind::History,
        2 => DataFrameKind::Delta,
        3 => DataFrameKind::Live,
        other => return Err(WireError::UnknownFrameCode(other)),
    };
    let count = c.u32()? as usize;
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let seq = c.f64()? as u64;
        let series_seq = c.f64()? as u64;
        let t_ms = c.f64()? as i64;
        let series_id = c.str255("series_id")?;
        let payload_kind = c.u8()?;
        let payload = match payload_kind {
            1 => Payload::Tick { price: c.f64()?, volume: c.f64()? },
            2 | 6 => {
                let v = c.f64()?;
                Payload::Scalar { value: if v.is_nan() { None } else { Some(v) } }
            }
            3 => Payload::Ohlc { o: c.f64()?, h: c.f64()?, l: c.f64()?, c: c.f64()? },
            4 => {
                let strategy = c.str255("strategy")?;
                let side = super::sample::Side::from_byte(c.u8()?)
                    .unwrap_or(super::sample::Side::Long);
                let desired_qty = c.i32()? as i64;
                let price = c.f64()?;
                let reason = c.str255("reason")?;
                Payload::Signal { strategy, side, desired_qty, price, reason }
            }
            5 => {
                let strategy = c.str255("strategy")?;
                let side = super::sample::Side::from_byte(c.u8()?)
                    .unwrap_or(super::sample::Side::Long);
                let tag = c.str255("tag")?;
                let price = c.f64()?;
                let qty = c.i32()? as i64;
                Payload::Marker { strategy, side, tag, price, qty }
            }
            other => return Err(WireError::UnknownPayloadKind(other)),
        };
        samples.push(Sample { seq, series_seq, series_id, t_ms, payload });
    }
    Ok(DecodedFrame { kind, samples })
}
