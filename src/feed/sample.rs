//! The sample record and its payload shapes.
//!
//! A [`Sample`] is the unit of data the ring stores and the session
//! delivers. Its wire "kind" is not a tag carried on the value itself; it is
//! derived from the series id and payload shape by [`classify`], mirroring
//! how the reference producer named series and left the kind implicit.

use serde::{Deserialize, Serialize};

/// Long/short direction carried by strategy signals and markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_byte(self) -> u8 {
        match self {
            Side::Long => b'L',
            Side::Short => b'S',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'L' => Some(Side::Long),
            b'S' => Some(Side::Short),
            _ => None,
        }
    }
}

/// Payload of a sample. The variant carries the shape; the wire *kind* byte
/// is a function of both this shape and the series id (see [`classify`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Tick {
        price: f64,
        volume: f64,
    },
    /// Bare scalar value. Also backs the "pnl" wire kind: the reference
    /// producer encodes both as `{"value": ...}` and relies on series id
    /// naming, not payload shape, to tell them apart.
    Scalar {
        value: Option<f64>,
    },
    Ohlc {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
    },
    Signal {
        strategy: String,
        side: Side,
        desired_qty: i64,
        price: f64,
        reason: String,
    },
    Marker {
        strategy: String,
        side: Side,
        tag: String,
        price: f64,
        qty: i64,
    },
}

/// The six wire-level payload kinds. Values match the binary frame's
/// `payload_kind` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    Tick = 1,
    Scalar = 2,
    Ohlc = 3,
    Signal = 4,
    Marker = 5,
    Pnl = 6,
}

impl PayloadKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Tick),
            2 => Some(Self::Scalar),
            3 => Some(Self::Ohlc),
            4 => Some(Self::Signal),
            5 => Some(Self::Marker),
            6 => Some(Self::Pnl),
            _ => None,
        }
    }
}

/// Classifies a sample's wire kind from its series id and payload shape.
///
/// Precedence (first match wins):
/// 1. series id ends with `:ticks` -> tick
/// 2. series id contains `:ohlc_time:` -> ohlc
/// 3. series id contains `:strategy:`, then by suffix: `:signals` -> signal,
///    `:markers` -> marker, `:pnl` -> pnl
/// 4. payload is a bare scalar -> scalar
/// 5. otherwise -> tick
pub fn classify(series_id: &str, payload: &Payload) -> PayloadKind {
    if series_id.ends_with(":ticks") {
        return PayloadKind::Tick;
    }
    if series_id.contains(":ohlc_time:") {
        return PayloadKind::Ohlc;
    }
    if series_id.contains(":strategy:") {
        if series_id.ends_with(":signals") {
            return PayloadKind::Signal;
        }
        if series_id.ends_with(":markers") {
            return PayloadKind::Marker;
        }
        if series_id.ends_with(":pnl") {
            return PayloadKind::Pnl;
        }
    }
    if matches!(payload, Payload::Scalar { .. }) {
        return PayloadKind::Scalar;
    }
    PayloadKind::Tick
}

/// A sample as produced by an adapter, before the ring assigns it sequence
/// numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInput {
    pub series_id: String,
    pub t_ms: i64,
    pub payload: Payload,
}

/// A sample as stored in the ring: carries the global and per-series
/// sequence numbers the ring assigned on append.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub seq: u64,
    pub series_seq: u64,
    pub series_id: String,
    pub t_ms: i64,
    pub payload: Payload,
}

impl Sample {
    pub fn kind(&self) -> PayloadKind {
        classify(&self.series_id, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_ticks_suffix() {
        let p = Payload::Scalar { value: Some(1.0) };
        assert_eq!(classify("exch:BTCUSD:ticks", &p), PayloadKind::Tick);
    }

    #[test]
    fn classify_ohlc_by_substring() {
        let p = Payload::Ohlc { o: 1.0, h: 2.0, l: 0.5, c: 1.5 };
        assert_eq!(classify("exch:BTCUSD:ohlc_time:1m", &p), PayloadKind::Ohlc);
    }

    #[test]
    fn classify_strategy_suffixes() {
        let v = Payload::Scalar { value: Some(0.0) };
        assert_eq!(classify("strat:x:strategy:signals", &v), PayloadKind::Signal);
        assert_eq!(classify("strat:x:strategy:markers", &v), PayloadKind::Marker);
        assert_eq!(classify("strat:x:strategy:pnl", &v), PayloadKind::Pnl);
    }

    #[test]
    fn classify_scalar_fallback() {
        let v = Payload::Scalar { value: Some(42.0) };
        assert_eq!(classify("indicator:sma20", &v), PayloadKind::Scalar);
    }

    #[test]
    fn classify_default_fallback_is_tick() {
        let v = Payload::Tick { price: 1.0, volume: 1.0 };
        assert_eq!(classify("some:unrecognized:name", &v), PayloadKind::Tick);
    }

    #[test]
    fn side_byte_roundtrip() {
        assert_eq!(Side::from_byte(Side::Long.as_byte()), Some(Side::Long));
        assert_eq!(Side::from_byte(Side::Short.as_byte()), Some(Side::Short));
        assert_eq!(Side::from_byte(b'?'), None);
    }
}
