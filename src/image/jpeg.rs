use std::{
    env::{self, VarError},
    process,
    sync::OnceLock,
};

use anyhow::{anyhow, bail};
use image::ImageBuffer;

use super::Image;

/// Software JPEG decoders we can use.
///
/// Webcams in MJPEG mode hand us one JPEG per frame, so decode speed matters.
#[derive(Debug, Clone, Copy)]
enum JpegBackend {
    /// Uses `jpeg-decoder` through the `image` crate. Robust, but slow.
    JpegDecoder,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::ZuneJpeg;

const BACKEND_VAR: &str = "OGLE_JPEG_BACKEND";

fn backend() -> JpegBackend {
    static BACKEND: OnceLock<JpegBackend> = OnceLock::new();

    *BACKEND.get_or_init(|| {
        let backend = match env::var(BACKEND_VAR) {
            Ok(v) if v == "zune-jpeg" => JpegBackend::ZuneJpeg,
            Ok(v) if v == "jpeg-decoder" => JpegBackend::JpegDecoder,
            Ok(v) => {
                eprintln!("invalid value set for `{BACKEND_VAR}` variable: '{v}'; exiting");
                process::exit(1);
            }
            Err(VarError::NotPresent) => DEFAULT_BACKEND,
            Err(VarError::NotUnicode(s)) => {
                eprintln!(
                    "invalid value set for `{BACKEND_VAR}` variable: {}; exiting",
                    s.to_string_lossy()
                );
                process::exit(1);
            }
        };
        log::debug!("using JPEG decode backend: {:?}", backend);
        backend
    })
}

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match backend() {
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
            match decomp.get_output_colorspace() {
                Some(ColorSpace::RGBA) => {}
                other => bail!("unsupported colorspace {other:?} (expected RGBA)"),
            }

            let size = decomp
                .output_buffer_size()
                .ok_or_else(|| anyhow!("JPEG headers decoded, but output size is unknown"))?;
            let mut buf = vec![0; size];
            decomp.decode_into(&mut buf)?;
            let (width, height) = decomp
                .dimensions()
                .ok_or_else(|| anyhow!("JPEG headers decoded, but dimensions are unknown"))?;
            ImageBuffer::from_raw(width.into(), height.into(), buf)
                .ok_or_else(|| anyhow!("decoded JPEG does not match its {width}x{height} size"))?
        }
    };

    Ok(Image { buf })
}
