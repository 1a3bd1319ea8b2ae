pub mod conv;
pub mod residual;
pub mod stage;
pub mod upsample;

pub use conv::{conv_unit, ConvUnit};
pub use residual::{ResidualBlock, ResidualKind};
pub use stage::{decoder_input_width, decoder_stage, encoder_stage, Stage};
pub use upsample::{bilinear_deconv, bilinear_weight, upsample_unit, UpsampleUnit};
