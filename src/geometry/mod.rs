/// A descriptor for a convolution or pooling window
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Window {
    height: usize,
    width: usize,
    stride: usize,
    pad_h: usize,
    pad_w: usize,
}

/// A descriptor for input and intermediary image geometry
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageGeometry {
    side: usize,
    channels: usize,
}

pub trait Square {
    fn side(&self) -> usize;
    fn num_elems(&self) -> usize;
}

impl Window {
    pub fn new(side: usize, stride: usize, padding: usize) -> Window {
        Window {
            height: side,
            width: side,
            stride,
            pad_h: padding,
            pad_w: padding,
        }
    }
    /// A square window with unit stride and no padding.
    pub fn from_side(side: usize) -> Window {
        Window::new(side, 1, 0)
    }
    /// A square window padded so that a unit stride keeps the input side.
    pub fn same(side: usize, stride: usize) -> Window {
        Window::new(side, stride, side / 2)
    }
    /// A factorized (1xN or Nx1) window padded to keep the input side.
    pub fn rect(height: usize, width: usize) -> Window {
        Window {
            height,
            width,
            stride: 1,
            pad_h: height / 2,
            pad_w: width / 2,
        }
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn stride(&self) -> usize {
        self.stride
    }
    pub fn padding(&self) -> (usize, usize) {
        (self.pad_h, self.pad_w)
    }
    pub fn area(&self) -> usize {
        self.height * self.width
    }
    /// Returns the output (height, width) for an input of `in_h` x `in_w`, or None if the padded
    /// input is smaller than the window.
    pub fn output_hw(&self, in_h: usize, in_w: usize) -> Option<(usize, usize)> {
        let padded_h = in_h + 2 * self.pad_h;
        let padded_w = in_w + 2 * self.pad_w;
        if padded_h < self.height || padded_w < self.width || self.stride == 0 {
            return None;
        }
        Some((
            (padded_h - self.height) / self.stride + 1,
            (padded_w - self.width) / self.stride + 1,
        ))
    }
}

impl ImageGeometry {
    pub const fn new(side: usize, channels: usize) -> ImageGeometry {
        ImageGeometry { side, channels }
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    /// Returns the geometry after passing through `window` into `out_channels` feature maps.
    pub fn through(&self, window: &Window, out_channels: usize) -> ImageGeometry {
        let (h, w) = window
            .output_hw(self.side, self.side)
            .unwrap_or((0, 0));
        debug_assert_eq!(
            h,
            w,
            "window {:?} does not keep the geometry square",
            window
        );
        ImageGeometry::new(h, out_channels)
    }
    pub fn with_channels(&self, channels: usize) -> ImageGeometry {
        ImageGeometry::new(self.side, channels)
    }
    /// NCHW shape of a batch of images with this geometry.
    pub fn batch_shape(&self, batch_size: usize) -> Vec<usize> {
        vec![batch_size, self.channels, self.side, self.side]
    }
}

impl Square for ImageGeometry {
    fn side(&self) -> usize {
        self.side
    }
    fn num_elems(&self) -> usize {
        self.side() * self.side() * self.channels
    }
}

impl Square for Window {
    fn side(&self) -> usize {
        self.height.max(self.width)
    }
    fn num_elems(&self) -> usize {
        self.area()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strided_window_halves_side() {
        let input = ImageGeometry::new(224, 3);
        let out = input.through(&Window::same(3, 2), 32);
        assert_eq!(out.side(), 112);
        assert_eq!(out.channels(), 32);
    }

    #[test]
    fn valid_window_shrinks_side() {
        // Inception stem: 3x3 stride 2 without padding
        let out = ImageGeometry::new(224, 3).through(&Window::new(3, 2, 0), 32);
        assert_eq!(out.side(), 111);
    }

    #[test]
    fn factorized_window_keeps_side() {
        let input = ImageGeometry::new(12, 768);
        assert_eq!(input.through(&Window::rect(1, 7), 128).side(), 12);
        assert_eq!(input.through(&Window::rect(7, 1), 128).side(), 12);
    }

    #[test]
    fn oversized_window_has_no_output() {
        assert_eq!(Window::from_side(5).output_hw(3, 3), None);
    }
}
