mod backbone;
mod decoder;
mod fcn;

pub use backbone::{
    BACKBONE_WEIGHTS, BackboneError, EncoderFeatures, VggBlock, VggBlockConfig, VggEncoder,
    VggEncoderConfig,
};
pub use decoder::{FcnDecoder, FcnDecoderConfig};
pub use fcn::{FcnModel, FcnModelConfig};
