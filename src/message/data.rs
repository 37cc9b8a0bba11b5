use super::Message;

/// A variable-length blob of raw bytes of an unspecified type (used to carry
/// the serialised skeleton data in the skeleton-detection protocol).
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    data: Vec<u8>,
}

impl DataMessage {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { data: bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Message for DataMessage {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
