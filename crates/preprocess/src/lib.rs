pub mod cpu;

use ndarray::{Array, IxDyn};

pub use cpu::CpuPreProcessor;

/// Square input used by Ultralytics YOLO exports unless configured otherwise.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Result of preprocessing including the letterbox parameters needed to map
/// model coordinates back onto the source image.
#[derive(Debug)]
pub struct PreprocessResult {
    /// NCHW tensor, shape `[1, 3, input_h, input_w]`, values in `[0, 1]`
    pub tensor: Array<f32, IxDyn>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// X offset from letterboxing (in pixels)
    pub offset_x: f32,
    /// Y offset from letterboxing (in pixels)
    pub offset_y: f32,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an image for inference
    ///
    /// # Arguments
    /// * `pixels` - RGB pixel data in HWC format
    /// * `width` - Image width
    /// * `height` - Image height
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;
}
