//! Fixed header carried in front of every cyclic frame.
//!
//! Layout, little-endian, 16 bytes:
//!
//! | offset | field        | type  |
//! |--------|--------------|-------|
//! | 0      | `msg_id`     | `u16` |
//! | 2      | `len`        | `u16` |
//! | 4      | `src_id`     | `u16` |
//! | 6      | reserved     | `u16` |
//! | 8      | `sched_time` | `u64` |
//!
//! `len` is the payload length and `sched_time` the sender's scheduled time
//! for the period the frame belongs to.

use crate::error::FrameError;

/// Size of the encoded header.
pub const HEADER_LEN: usize = 16;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Application message id.
    pub msg_id: u16,
    /// Payload length in bytes.
    pub len: u16,
    /// Id of the sending task.
    pub src_id: u16,
    /// Scheduled time of the sending period, in nanoseconds.
    pub sched_time: u64,
}

impl FrameHeader {
    /// Header for `payload_len` bytes of payload.
    ///
    /// # Errors
    ///
    /// [`FrameError::PayloadTooLarge`] when the length does not fit `u16`.
    pub fn new(msg_id: u16, src_id: u16, sched_time: u64, payload_len: usize) -> Result<Self, FrameError> {
        let len = u16::try_from(payload_len)
            .ok()
            .ok_or(FrameError::PayloadTooLarge(payload_len))?;
        Ok(Self {
            msg_id,
            len,
            src_id,
            sched_time,
        })
    }

    /// Wire representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0_u8; HEADER_LEN];
        let fields = self
            .msg_id
            .to_le_bytes()
            .into_iter()
            .chain(self.len.to_le_bytes())
            .chain(self.src_id.to_le_bytes())
            .chain([0, 0])
            .chain(self.sched_time.to_le_bytes());
        for (dst, src) in out.iter_mut().zip(fields) {
            *dst = src;
        }
        out
    }

    /// Split `frame` into its header and the payload the header announces.
    ///
    /// Bytes after the announced payload are ignored.
    ///
    /// # Errors
    ///
    /// [`FrameError::TooShort`] or [`FrameError::Truncated`].
    pub fn decode(frame: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        let (head, rest) = frame
            .split_first_chunk::<HEADER_LEN>()
            .ok_or(FrameError::TooShort(frame.len()))?;
        let [m0, m1, l0, l1, s0, s1, _, _, time @ ..] = *head;
        let header = Self {
            msg_id: u16::from_le_bytes([m0, m1]),
            len: u16::from_le_bytes([l0, l1]),
            src_id: u16::from_le_bytes([s0, s1]),
            sched_time: u64::from_le_bytes(time),
        };
        let announced = usize::from(header.len);
        let payload = rest.get(..announced).ok_or(FrameError::Truncated {
            announced,
            available: rest.len(),
        })?;
        Ok((header, payload))
    }

    /// Write header and payload into `buf`, returning the frame length.
    ///
    /// # Errors
    ///
    /// [`FrameError::Truncated`] when `buf` cannot hold both.
    pub fn encode_into(&self, payload: &[u8], buf: &mut [u8]) -> Result<usize, FrameError> {
        let total = HEADER_LEN + payload.len();
        let available = buf.len().saturating_sub(HEADER_LEN);
        let out = buf.get_mut(..total).ok_or(FrameError::Truncated {
            announced: payload.len(),
            available,
        })?;
        let (head, body) = out.split_at_mut(HEADER_LEN);
        head.copy_from_slice(&self.to_bytes());
        body.copy_from_slice(payload);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_little_endian() -> Result<(), FrameError> {
        let header = FrameHeader::new(0x0102, 0x0304, 0x1122_3344_5566_7788, 5)?;
        let bytes = header.to_bytes();
        assert_eq!(
            bytes,
            [
                0x02, 0x01, 0x05, 0x00, 0x04, 0x03, 0x00, 0x00, 0x88, 0x77, 0x66, 0x55, 0x44,
                0x33, 0x22, 0x11
            ]
        );
        Ok(())
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() -> Result<(), FrameError> {
        let header = FrameHeader::new(7, 1, 42, 3)?;
        let mut buf = [0xEE_u8; 32];
        let len = header.encode_into(&[1, 2, 3], &mut buf)?;
        assert_eq!(len, HEADER_LEN + 3);

        let (decoded, payload) = FrameHeader::decode(&buf)?;
        assert_eq!(decoded, header);
        assert_eq!(payload, &[1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_decode_rejects_short_and_truncated() {
        assert_eq!(FrameHeader::decode(&[0; 10]), Err(FrameError::TooShort(10)));

        let header = FrameHeader {
            msg_id: 0,
            len: 4,
            src_id: 0,
            sched_time: 0,
        };
        let mut frame = header.to_bytes().to_vec();
        frame.extend_from_slice(&[0, 0]);
        assert_eq!(
            FrameHeader::decode(&frame),
            Err(FrameError::Truncated {
                announced: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_encode_into_small_buffer() -> Result<(), FrameError> {
        let header = FrameHeader::new(1, 1, 1, 8)?;
        let mut buf = [0_u8; HEADER_LEN + 4];
        assert!(header.encode_into(&[0; 8], &mut buf).is_err());
        Ok(())
    }

    #[test]
    fn test_payload_too_large() {
        assert_eq!(
            FrameHeader::new(0, 0, 0, 70_000),
            Err(FrameError::PayloadTooLarge(70_000))
        );
    }
}
