//! Audio chunk decoding, resequencing, and gapless playback

pub mod decode;
pub mod playback;
pub mod sequence;
