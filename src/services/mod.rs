//! Service layer
//!
//! Infrastructure concerns (decoding, encoding, writing files) kept apart
//! from the pipeline state machine.

pub mod codec;
pub mod output;

pub use codec::{ImageCodec, ImageSource};
pub use output::{StickerWriter, STICKER_FILE_PREFIX};
