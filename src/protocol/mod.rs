//! Wire-level protocol pieces: time arithmetic, PDUs and BMCA.

pub mod bmca;
pub mod message;
pub mod time;
