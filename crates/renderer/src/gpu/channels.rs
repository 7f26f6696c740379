use std::path::Path;

use anyhow::{Context, Result};
use glow::HasContext;
use image::imageops::flip_vertical_in_place;

use crate::error::RenderError;
use crate::types::{ChannelBindings, ChannelSource, CHANNEL_COUNT};

/// Opaque black, bound wherever a channel has no usable image.
const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];

/// Decoded channel image in GL row order (bottom row first).
struct ChannelImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

/// The four channel textures bound to `iChannel0..3`.
#[derive(Debug)]
pub(crate) struct ChannelTextures {
    textures: [glow::Texture; CHANNEL_COUNT],
}

impl ChannelTextures {
    /// Decodes and uploads every slot, substituting a 1×1 black texture for
    /// empty, missing, or undecodable channels.
    ///
    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn load(gl: &glow::Context, bindings: &ChannelBindings) -> Result<Self, RenderError> {
        let mut textures = Vec::with_capacity(CHANNEL_COUNT);
        for (index, binding) in bindings.slots().iter().enumerate() {
            let image = match binding {
                Some(ChannelSource::Texture { path }) => match decode_channel(index, path) {
                    Ok(image) => image,
                    Err(error) => {
                        tracing::warn!(
                            channel = index,
                            path = %path.display(),
                            error = %error,
                            "failed to load texture channel; using placeholder"
                        );
                        placeholder()
                    }
                },
                None => placeholder(),
            };
            match upload(gl, &image) {
                Ok(texture) => textures.push(texture),
                Err(error) => {
                    for texture in textures {
                        gl.delete_texture(texture);
                    }
                    return Err(error);
                }
            }
        }
        let textures = textures
            .try_into()
            .map_err(|_| RenderError::gl("load_channels", "channel count mismatch"))?;
        Ok(Self { textures })
    }

    /// Binds each texture to the unit matching its channel index.
    ///
    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn bind(&self, gl: &glow::Context) {
        for (unit, texture) in self.textures.iter().enumerate() {
            gl.active_texture(glow::TEXTURE0 + unit as u32);
            gl.bind_texture(glow::TEXTURE_2D, Some(*texture));
        }
        gl.active_texture(glow::TEXTURE0);
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn delete(self, gl: &glow::Context) {
        for texture in self.textures {
            gl.delete_texture(texture);
        }
    }
}

fn placeholder() -> ChannelImage {
    ChannelImage {
        width: 1,
        height: 1,
        rgba: PLACEHOLDER_PIXEL.to_vec(),
    }
}

fn decode_channel(index: usize, path: &Path) -> Result<ChannelImage> {
    let image = image::ImageReader::open(path)
        .with_context(|| {
            format!(
                "failed to open texture for channel {} at {}",
                index,
                path.display()
            )
        })?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff image format of {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode texture at {}", path.display()))?;
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    Ok(ChannelImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

unsafe fn upload(gl: &glow::Context, image: &ChannelImage) -> Result<glow::Texture, RenderError> {
    let texture = gl
        .create_texture()
        .map_err(|message| RenderError::gl("create_texture", message))?;
    gl.bind_texture(glow::TEXTURE_2D, Some(texture));
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::REPEAT as i32);
    gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA8 as i32,
        image.width as i32,
        image.height as i32,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        Some(image.rgba.as_slice()),
    );
    gl.bind_texture(glow::TEXTURE_2D, None);
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_extensionless_images_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.channel0");
        let mut pixels = image::RgbaImage::new(2, 2);
        pixels.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        pixels
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_channel(0, &path).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 2));
        // Row order is flipped, so the top-left red pixel ends up in the last row.
        assert_eq!(&decoded.rgba[8..12], &[255, 0, 0, 255]);
        assert_eq!(&decoded.rgba[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn garbage_files_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.channel1");
        std::fs::write(&path, b"definitely not an image").unwrap();
        assert!(decode_channel(1, &path).is_err());
        assert!(decode_channel(2, &dir.path().join("missing.channel2")).is_err());
    }

    #[test]
    fn placeholder_is_opaque_black() {
        let image = placeholder();
        assert_eq!((image.width, image.height), (1, 1));
        assert_eq!(image.rgba, PLACEHOLDER_PIXEL);
    }
}
