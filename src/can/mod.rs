//! CAN decoding: dictionary snapshots, bit-exact signal extraction, and the
//! per-channel consumer worker.

pub mod consumer;
pub mod decoder;
pub mod dictionary;
pub mod format;

#[cfg(feature = "can")]
pub mod identifier;

pub use decoder::{decode_frame, DecoderCounters};
pub use dictionary::{CollectPolicy, DecoderDictionary, DictionarySlot, Lookup, MethodEntry};
pub use format::{CanMessageFormat, CanSignalFormat, Endianness, Signedness};

#[cfg(feature = "can")]
pub use identifier::to_embedded_id;
