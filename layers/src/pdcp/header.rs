//! PDCP Data PDU Header and COUNT Arithmetic
//!
//! Header layouts follow 3GPP TS 38.323 section 6.2.2:
//!
//! ```text
//! 12-bit SN:  | D/C | R R R | SN (4 MSB) |  SN (8 LSB)  |
//! 18-bit SN:  | D/C | R R R R R | SN (2 MSB) | SN | SN (8 LSB) |
//! ```
//!
//! On SRBs the D/C position is reserved and always zero.

use crate::LayerError;
use bytes::{BufMut, BytesMut};
use common::types::SnLength;

/// D/C bit in the first header octet of a DRB PDU
pub const DC_BIT: u8 = 0x80;

/// PDCP PDU types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdcpPduType {
    /// Data PDU
    Data,
    /// Control PDU (status report, ROHC feedback)
    Control,
}

/// PDCP header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdcpHeader {
    /// PDU type
    pub pdu_type: PdcpPduType,
    /// Sequence number
    pub sn: u32,
}

impl PdcpHeader {
    /// Header of a data PDU
    pub fn data(sn: u32) -> Self {
        Self {
            pdu_type: PdcpPduType::Data,
            sn,
        }
    }

    /// Append the header to `buf`. `drb` selects whether the D/C bit is used.
    pub fn write(&self, sn_len: SnLength, drb: bool, buf: &mut BytesMut) {
        let start = buf.len();
        pack_sn(self.sn, sn_len, buf);
        if drb && self.pdu_type == PdcpPduType::Data {
            buf[start] |= DC_BIT;
        }
    }

    /// Parse the header at the start of `data`
    pub fn parse(data: &[u8], sn_len: SnLength, drb: bool) -> Result<Self, LayerError> {
        let first = *data
            .first()
            .ok_or_else(|| LayerError::InvalidPdu("empty PDU".to_string()))?;

        if drb && first & DC_BIT == 0 {
            return Ok(Self {
                pdu_type: PdcpPduType::Control,
                sn: 0,
            });
        }

        Ok(Self::data(unpack_sn(data, sn_len)?))
    }
}

/// Append the SN field. Control and reserved bits are left zero.
pub fn pack_sn(sn: u32, sn_len: SnLength, buf: &mut BytesMut) {
    let sn = sn & sn_len.sn_mask();
    match sn_len {
        SnLength::Len12 => buf.put_u16(sn as u16),
        SnLength::Len18 => {
            buf.put_u8((sn >> 16) as u8);
            buf.put_u16(sn as u16);
        }
    }
}

/// Read the SN field, ignoring control and reserved bits
pub fn unpack_sn(data: &[u8], sn_len: SnLength) -> Result<u32, LayerError> {
    if data.len() < sn_len.header_len() {
        return Err(LayerError::InvalidPdu(format!(
            "{} bytes is shorter than a {}-bit SN header",
            data.len(),
            sn_len.bits()
        )));
    }

    let raw = match sn_len {
        SnLength::Len12 => u32::from(data[0]) << 8 | u32::from(data[1]),
        SnLength::Len18 => u32::from(data[0]) << 16 | u32::from(data[1]) << 8 | u32::from(data[2]),
    };
    Ok(raw & sn_len.sn_mask())
}

/// HFN part of a COUNT
pub fn hfn_of(count: u32, sn_len: SnLength) -> u32 {
    count >> sn_len.bits()
}

/// SN part of a COUNT
pub fn sn_of(count: u32, sn_len: SnLength) -> u32 {
    count & sn_len.sn_mask()
}

/// Build a COUNT from HFN and SN, modulo 2^32
pub fn make_count(hfn: u32, sn: u32, sn_len: SnLength) -> u32 {
    hfn.wrapping_shl(sn_len.bits()) | (sn & sn_len.sn_mask())
}

/// Serial comparison of two COUNT values modulo 2^32
pub fn count_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Recover the full COUNT of a received SN relative to RX_DELIV
/// (TS 38.323 section 5.2.2.1).
///
/// The result always lies in `[rx_deliv - window, rx_deliv + window)`.
pub fn derive_count(received_sn: u32, rx_deliv: u32, sn_len: SnLength) -> u32 {
    let window = i64::from(sn_len.window_size());
    let rx_hfn = hfn_of(rx_deliv, sn_len);
    let cur_sn = i64::from(sn_of(rx_deliv, sn_len));
    let rcvd = i64::from(received_sn & sn_len.sn_mask());

    let hfn = if rcvd < cur_sn - window {
        rx_hfn.wrapping_add(1)
    } else if rcvd >= cur_sn + window {
        rx_hfn.wrapping_sub(1)
    } else {
        rx_hfn
    };

    make_count(hfn, received_sn, sn_len)
}
