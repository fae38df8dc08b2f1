//! Converts the engine's internal `u32` frame id convention (extended flag
//! in bit 31, matching Linux SocketCAN and [`crate::can::dictionary::EXTENDED_ID_MASK`])
//! to the `embedded-can` ecosystem's [`embedded_can::Id`], for callers that
//! hand frames to an `embedded-hal`-style bus driver rather than a socket.

use embedded_can::{ExtendedId, Id, StandardId};

use crate::can::dictionary::EXTENDED_ID_MASK;

/// `None` if the masked id doesn't fit the target identifier width (standard
/// ids are 11 bits, extended ids are 29 bits). Callers treat this the same
/// as any other malformed-frame condition and drop the frame.
pub fn to_embedded_id(frame_id: u32) -> Option<Id> {
    let extended = frame_id & !EXTENDED_ID_MASK != 0;
    let masked = frame_id & EXTENDED_ID_MASK;
    if extended {
        ExtendedId::new(masked).map(Id::Extended)
    } else {
        u16::try_from(masked)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    }
}
