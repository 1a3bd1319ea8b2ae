pub mod blocks;
pub mod decoder;
pub mod encoder;
pub mod flownet;
pub mod head;
pub mod loss;
pub mod rednet;
pub mod target;

pub use decoder::{Decoder, DecoderOutput};
pub use encoder::{DualStreamEncoder, EncoderTower, FusedFeatures};
pub use flownet::{FlowNetS, FlowNetSConfig, FlowOutput, MultiScaleEpe};
pub use head::{SegmentationHead, SegmentationOutput};
pub use loss::{pixel_cross_entropy, SegmentationLoss};
pub use rednet::{RgbdSegNet, RgbdSegNetConfig};
pub use target::{downsample_targets, LabelResample, TargetPyramid};
