use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};

/// One read-back frame: RGB8 rows, top row first.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub rgb: &'a [u8],
}

impl Frame<'_> {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Destination for rendered frames (LED drivers, files, network streamers).
pub trait FrameSink {
    fn write_frame(&mut self, frame: Frame<'_>) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes `frame_00000.png`, `frame_00001.png`, ... into a directory.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl PngSequenceSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:05}.png"))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn write_frame(&mut self, frame: Frame<'_>) -> Result<()> {
        ensure!(
            frame.rgb.len() == Frame::expected_len(frame.width, frame.height),
            "frame {} has {} bytes, expected {}x{}x3",
            frame.index,
            frame.rgb.len(),
            frame.width,
            frame.height
        );
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.rgb.to_vec())
            .context("frame buffer does not match its dimensions")?;
        let path = self.frame_path(frame.index);
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        tracing::debug!(path = %path.display(), "wrote frame");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!(frames = self.written, dir = %self.dir.display(), "png sequence complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_numbered_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::create(&dir.path().join("out")).unwrap();
        let rgb = [255, 0, 0, 0, 0, 255];
        sink.write_frame(Frame {
            index: 3,
            width: 2,
            height: 1,
            rgb: &rgb,
        })
        .unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.written(), 1);

        let decoded = image::open(dir.path().join("out/frame_00003.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn rejects_short_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::create(dir.path()).unwrap();
        let error = sink
            .write_frame(Frame {
                index: 0,
                width: 4,
                height: 4,
                rgb: &[0; 5],
            })
            .unwrap_err();
        assert!(error.to_string().contains("expected 4x4x3"));
    }
}
