use crate::config::DEFAULT_INPUT_SIZE;
use common::{span, span_debug};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use lifecycle::{Rect, Region};
use ndarray::Array3;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One region of a frame, resized and normalized to the model input.
///
/// `tensor` is CHW. `source_size` is the size of the pixels actually cut from
/// the frame, which is zero when the requested location misses the frame.
#[derive(Debug, Clone)]
pub struct CropTensor {
    pub tensor: Array3<f32>,
    pub source_size: (u32, u32),
}

impl Region for CropTensor {
    fn dimensions(&self) -> (u32, u32) {
        self.source_size
    }
}

pub struct PreProcessor {
    pub input_size: (u32, u32),
    resizer: Resizer,
    crop_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            resizer: Resizer::new(),
            crop_buffer: Vec::new(),
        }
    }

    /// Cut `location` out of `frame` and prepare it for the model.
    ///
    /// The location is clipped to the frame. Whether the location itself is
    /// acceptable is left to the lifecycle manager.
    pub fn crop(&mut self, frame: &RgbImage, location: Rect) -> anyhow::Result<CropTensor> {
        let _s = span!("crop_region");

        let Some((x, y, width, height)) = clip(location, frame.width(), frame.height()) else {
            tracing::trace!(%location, "Region misses frame");
            return Ok(CropTensor {
                tensor: Array3::zeros((3, self.input_size.1 as usize, self.input_size.0 as usize)),
                source_size: (0, 0),
            });
        };

        self.copy_region(frame, x, y, width, height);
        let resized = self.resize(width, height)?;
        let tensor = Self::normalize(&resized)?;

        Ok(CropTensor {
            tensor,
            source_size: (width, height),
        })
    }

    fn copy_region(&mut self, frame: &RgbImage, x: u32, y: u32, width: u32, height: u32) {
        let stride = frame.width() as usize * 3;
        let row_bytes = width as usize * 3;
        let pixels = frame.as_raw();

        self.crop_buffer.clear();
        self.crop_buffer.reserve(row_bytes * height as usize);
        for row in y..y + height {
            let start = row as usize * stride + x as usize * 3;
            self.crop_buffer
                .extend_from_slice(&pixels[start..start + row_bytes]);
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<Image<'static>> {
        let _s = span_debug!("resize");

        let src = Image::from_slice_u8(width, height, &mut self.crop_buffer, PixelType::U8x3)?;
        let mut resized = Image::new(self.input_size.0, self.input_size.1, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        Ok(resized)
    }

    fn normalize(image: &Image) -> anyhow::Result<Array3<f32>> {
        let _s = span_debug!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            for c in 0..3 {
                let value = px[c] as f32 / 255.0;
                output[i + c * spatial] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        Ok(Array3::from_shape_vec((3, height, width), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

/// Intersection of `rect` with a `width`x`height` frame as `(x, y, w, h)`.
fn clip(rect: Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let left = (rect.x as i64).max(0);
    let top = (rect.y as i64).max(0);
    let right = rect.right().min(width as i64);
    let bottom = rect.bottom().min(height as i64);

    if right <= left || bottom <= top {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}
