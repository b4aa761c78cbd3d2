//! Frame-level encoding and decoding over async streams.

mod framed;

pub use framed::FrameCodec;
