pub mod chunker;
pub mod framer;
pub mod gain;
pub mod ring_buffer;

pub use chunker::{ChunkerControl, FrameChunker};
pub use framer::{AudioFrame, FrameAssembler, FramerConfig};
pub use gain::{AgcConfig, GainController};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
