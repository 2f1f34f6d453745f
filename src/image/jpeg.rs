use std::str::FromStr;

use anyhow::{anyhow, bail};
use image::ImageBuffer;

use crate::config::CONFIG;

use super::Image;

/// Software JPEG decoders that can be used to decode webcam frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegBackend {
    /// Uses the `jpeg-decoder` crate (through `image`), a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

impl Default for JpegBackend {
    fn default() -> Self {
        Self::JpegDecoder
    }
}

impl FromStr for JpegBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg-decoder" => Ok(Self::JpegDecoder),
            "zune-jpeg" => Ok(Self::ZuneJpeg),
            _ => bail!("unknown JPEG backend '{s}' (expected 'jpeg-decoder' or 'zune-jpeg')"),
        }
    }
}

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    decode_with(CONFIG.jpeg_backend, data)
}

fn decode_with(backend: JpegBackend, data: &[u8]) -> anyhow::Result<Image> {
    let buf = match backend {
        JpegBackend::JpegDecoder => {
            image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8()
        }
        JpegBackend::ZuneJpeg => {
            use zune_jpeg::zune_core::colorspace::ColorSpace;
            use zune_jpeg::zune_core::options::DecoderOptions;

            let mut decomp = zune_jpeg::JpegDecoder::new_with_options(
                DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
                data,
            );
            decomp.decode_headers()?;
            let colorspace = decomp
                .get_output_colorspace()
                .ok_or_else(|| anyhow!("JPEG headers lack a colorspace"))?;
            if colorspace != ColorSpace::RGBA {
                bail!("unsupported colorspace {colorspace:?} (expected RGBA)");
            }

            let size = decomp
                .output_buffer_size()
                .ok_or_else(|| anyhow!("JPEG headers lack image dimensions"))?;
            let mut buf = vec![0; size];
            decomp.decode_into(&mut buf)?;
            let (width, height) = decomp
                .dimensions()
                .ok_or_else(|| anyhow!("JPEG headers lack image dimensions"))?;
            ImageBuffer::from_raw(width.into(), height.into(), buf)
                .ok_or_else(|| anyhow!("decoded JPEG buffer does not match {width}x{height}"))?
        }
    };

    Ok(Image { buf })
}

#[cfg(test)]
mod tests {
    use image::{codecs::jpeg::JpegEncoder, ColorType};

    use super::*;

    fn encode_gray(width: u32, height: u32, value: u8) -> Vec<u8> {
        let pixels = vec![value; (width * height * 3) as usize];
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 95)
            .encode(&pixels, width, height, ColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn parse_backend() {
        assert_eq!(
            "zune-jpeg".parse::<JpegBackend>().unwrap(),
            JpegBackend::ZuneJpeg
        );
        assert_eq!(
            "jpeg-decoder".parse::<JpegBackend>().unwrap(),
            JpegBackend::JpegDecoder
        );
        assert!("mozjpeg".parse::<JpegBackend>().is_err());
    }

    #[test]
    fn backends_agree() {
        let jpeg = encode_gray(16, 8, 128);
        for backend in [JpegBackend::JpegDecoder, JpegBackend::ZuneJpeg] {
            let image = decode_with(backend, &jpeg).unwrap();
            assert_eq!((image.width(), image.height()), (16, 8), "{backend:?}");

            let color = image.get(3, 3);
            assert!(color.r().abs_diff(128) <= 2, "{backend:?}: {color:?}");
            assert_eq!(color.a(), 255);
        }
    }

    #[test]
    fn garbage_is_an_error() {
        for backend in [JpegBackend::JpegDecoder, JpegBackend::ZuneJpeg] {
            assert!(decode_with(backend, b"not a jpeg").is_err(), "{backend:?}");
        }
    }
}
