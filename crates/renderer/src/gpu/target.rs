use glow::HasContext;

use crate::error::RenderError;

/// Offscreen colour target used by the hidden-window and headless backends.
#[derive(Debug)]
pub(crate) struct RenderTarget {
    framebuffer: glow::Framebuffer,
    texture: glow::Texture,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn new(gl: &glow::Context, width: u32, height: u32) -> Result<Self, RenderError> {
        let texture = gl
            .create_texture()
            .map_err(|message| RenderError::gl("create_texture", message))?;
        allocate(gl, texture, width, height);

        let framebuffer = match gl.create_framebuffer() {
            Ok(framebuffer) => framebuffer,
            Err(message) => {
                gl.delete_texture(texture);
                return Err(RenderError::gl("create_framebuffer", message));
            }
        };
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
        gl.framebuffer_texture_2d(
            glow::FRAMEBUFFER,
            glow::COLOR_ATTACHMENT0,
            glow::TEXTURE_2D,
            Some(texture),
            0,
        );
        let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        if status != glow::FRAMEBUFFER_COMPLETE {
            gl.delete_framebuffer(framebuffer);
            gl.delete_texture(texture);
            return Err(RenderError::gl(
                "create_render_target",
                format!("framebuffer incomplete: 0x{status:x}"),
            ));
        }

        tracing::debug!(width, height, "created offscreen render target");
        Ok(Self {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn resize(&mut self, gl: &glow::Context, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        allocate(gl, self.texture, width, height);
        self.width = width;
        self.height = height;
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn bind(&self, gl: &glow::Context) {
        gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.framebuffer));
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn delete(self, gl: &glow::Context) {
        gl.delete_framebuffer(self.framebuffer);
        gl.delete_texture(self.texture);
    }
}

unsafe fn allocate(gl: &glow::Context, texture: glow::Texture, width: u32, height: u32) {
    gl.bind_texture(glow::TEXTURE_2D, Some(texture));
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA8 as i32,
        width as i32,
        height as i32,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        None,
    );
    gl.bind_texture(glow::TEXTURE_2D, None);
}

/// Converts a bottom-up RGBA readback into a top-down RGB buffer.
pub(crate) fn rgba_to_rgb_flipped(rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in rgba.chunks_exact(width * 4).take(height).rev() {
        for pixel in row.chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_rows_and_drops_alpha() {
        // 2x2, bottom row red/green, top row blue/white.
        let rgba = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 255, 10,
        ];
        let rgb = rgba_to_rgb_flipped(&rgba, 2, 2);
        assert_eq!(
            rgb,
            vec![0, 0, 255, 255, 255, 255, 255, 0, 0, 0, 255, 0]
        );
    }
}
