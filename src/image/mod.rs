pub mod annotate;
pub mod codec;
pub mod transforms;

pub use annotate::Annotator;
pub use codec::{ImageCodec, PixelBuffer};
pub use transforms::{ImageTransforms, Letterbox};
