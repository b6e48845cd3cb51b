//! Readback of the window target

use super::SoftwareDevice;

/// 8-bit premultiplied RGBA copy of the window target, top row first
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CapturedFrame {
    pub fn capture(device: &SoftwareDevice) -> Self {
        let (width, height) = device.size();
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for row in 0..height {
            let y = (height - 1 - row) as i32;
            for x in 0..width as i32 {
                let texel = device.window_pixel(x, y);
                pixels.extend(texel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
            }
        }
        Self { width, height, pixels }
    }

    /// Pixel at `(x, y)` counted from the top left
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Number of pixels equal to `color`
    pub fn count(&self, color: [u8; 4]) -> usize {
        self.pixels.chunks_exact(4).filter(|p| *p == color).count()
    }
}
