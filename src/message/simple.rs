use super::Message;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;

/// A message containing a single `i32` value.
///
/// The original protocol defines `SimpleMessage` as generic over a handful
/// of primitive types via runtime reflection; since the wire format only
/// ever actually uses the 4-byte signed-integer case (control codes), this
/// is that one concrete variant rather than a reflective generic (see
/// `Error::UnsupportedSimpleType`, which exists for API symmetry with the
/// original but can never be constructed by this type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleMessage {
    data: [u8; 4],
}

impl SimpleMessage {
    pub fn new(value: i32) -> Self {
        let mut msg = Self { data: [0; 4] };
        msg.set_value(value);
        msg
    }

    pub fn value(&self) -> i32 {
        Cursor::new(&self.data[..]).get_i32_le()
    }

    pub fn set_value(&mut self, value: i32) {
        let mut buf = &mut self.data[..];
        buf.put_i32_le(value);
    }
}

impl Default for SimpleMessage {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Message for SimpleMessage {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The interaction a client is requesting of a skeleton-detection service.
///
/// This picks the simple `{0, 1, 2}` enum scheme over the alternatives the
/// source exhibited (negative codes for "non-blocking end_detection",
/// `frame_idx + 1` tokens): see SPEC_FULL.md §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum ControlCode {
    BeginDetection = 0,
    EndDetection = 1,
    SetCalibration = 2,
}

/// `ControlMessage` is a `SimpleMessage` whose value is a [`ControlCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage(SimpleMessage);

impl ControlMessage {
    pub fn new(code: ControlCode) -> Self {
        Self(SimpleMessage::new(code.into()))
    }

    pub fn begin_detection() -> Self {
        Self::new(ControlCode::BeginDetection)
    }

    pub fn end_detection() -> Self {
        Self::new(ControlCode::EndDetection)
    }

    pub fn set_calibration() -> Self {
        Self::new(ControlCode::SetCalibration)
    }

    /// The control code carried by this message, if it's one we recognise.
    pub fn code(&self) -> Option<ControlCode> {
        ControlCode::try_from(self.0.value()).ok()
    }
}

impl Default for ControlMessage {
    fn default() -> Self {
        Self::new(ControlCode::BeginDetection)
    }
}

impl Message for ControlMessage {
    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.0.as_bytes_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_message_round_trips_value() {
        let msg = SimpleMessage::new(-12345);
        assert_eq!(msg.value(), -12345);
        assert_eq!(msg.size(), 4);
    }

    #[test]
    fn control_codes_round_trip() {
        for code in [
            ControlCode::BeginDetection,
            ControlCode::EndDetection,
            ControlCode::SetCalibration,
        ] {
            let msg = ControlMessage::new(code);
            assert_eq!(msg.code(), Some(code));
        }
    }

    #[test]
    fn unrecognised_code_is_none() {
        let mut msg = ControlMessage::begin_detection();
        msg.0.set_value(99);
        assert_eq!(msg.code(), None);
    }
}
