//! Binary codec for application payloads.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Largest encoded payload accepted in either direction.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

fn payload_bincode() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_PAYLOAD_LEN as u64)
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    payload_bincode().serialize(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    payload_bincode().deserialize(bytes)
}
