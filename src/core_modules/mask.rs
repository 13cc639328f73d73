// THEORY:
// A `Mask` is a binary per-pixel selector: "does this pixel belong to the region
// being recolored?" It is the hand-off between the recolorer (which decides the
// region) and the blender (which composites inside it).
//
// Raw color-threshold masks are noisy: isolated pixels that happen to match, and
// pinholes where texture dips outside the tolerance. Two classic morphological
// filters clean that up:
// 1.  **Open** (erode, then dilate): removes specks smaller than the structuring
//     element while leaving large regions at their original size.
// 2.  **Close** (dilate, then erode): fills small holes and smooths ragged edges.
//
// The structuring element is a square, which is separable: a k x k erosion is a
// 1 x k pass over rows followed by a k x 1 pass over columns. Each pass uses a
// running window count, so cost does not grow with k. Neighbours outside the image
// are ignored rather than treated as set or unset, so borders neither erode away
// nor grow.

/// A binary selector with the same dimensions as the image it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// An all-clear mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        (bits.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            bits,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut selected: impl FnMut(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(selected(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    /// Fraction of pixels selected, in [0, 1].
    pub fn coverage(&self) -> f32 {
        if self.bits.is_empty() {
            return 0.0;
        }
        self.count() as f32 / self.bits.len() as f32
    }

    /// Sets every pixel selected in `other`. Dimensions must match.
    pub fn union_with(&mut self, other: &Mask) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (bit, other_bit) in self.bits.iter_mut().zip(&other.bits) {
            *bit |= *other_bit;
        }
    }

    pub fn erode(&self, kernel_size: usize) -> Mask {
        self.filter(kernel_size, Rule::Erode)
    }

    pub fn dilate(&self, kernel_size: usize) -> Mask {
        self.filter(kernel_size, Rule::Dilate)
    }

    /// Erode then dilate: drops specks smaller than the kernel.
    pub fn open(&self, kernel_size: usize) -> Mask {
        self.erode(kernel_size).dilate(kernel_size)
    }

    /// Dilate then erode: fills holes smaller than the kernel.
    pub fn close(&self, kernel_size: usize) -> Mask {
        self.dilate(kernel_size).erode(kernel_size)
    }

    /// Pixels within `radius` of a boundary between selected and unselected pixels.
    pub fn edge_band(&self, radius: usize) -> Mask {
        if radius == 0 {
            return Mask::empty(self.width, self.height);
        }
        let kernel_size = radius * 2 + 1;
        let grown = self.dilate(kernel_size);
        let shrunk = self.erode(kernel_size);
        let bits = grown
            .bits
            .iter()
            .zip(&shrunk.bits)
            .map(|(outer, inner)| *outer && !*inner)
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            bits,
        }
    }

    fn filter(&self, kernel_size: usize, rule: Rule) -> Mask {
        let radius = kernel_size / 2;
        if radius == 0 || self.bits.is_empty() {
            return self.clone();
        }
        let rows = sweep(&self.bits, self.width as usize, self.height as usize, radius, Axis::Row, rule);
        let bits = sweep(&rows, self.width as usize, self.height as usize, radius, Axis::Column, rule);
        Mask {
            width: self.width,
            height: self.height,
            bits,
        }
    }
}

#[derive(Clone, Copy)]
enum Rule {
    Erode,
    Dilate,
}

#[derive(Clone, Copy)]
enum Axis {
    Row,
    Column,
}

/// One separable pass along rows or columns with a running window count.
fn sweep(bits: &[bool], width: usize, height: usize, radius: usize, axis: Axis, rule: Rule) -> Vec<bool> {
    let (lines, length) = match axis {
        Axis::Row => (height, width),
        Axis::Column => (width, height),
    };
    let index = |line: usize, position: usize| match axis {
        Axis::Row => line * width + position,
        Axis::Column => position * width + line,
    };

    let mut out = vec![false; bits.len()];
    let mut prefix = vec![0usize; length + 1];
    for line in 0..lines {
        for position in 0..length {
            prefix[position + 1] = prefix[position] + bits[index(line, position)] as usize;
        }
        for position in 0..length {
            let start = position.saturating_sub(radius);
            let end = (position + radius + 1).min(length);
            let set = prefix[end] - prefix[start];
            out[index(line, position)] = match rule {
                Rule::Erode => set == end - start,
                Rule::Dilate => set > 0,
            };
        }
    }
    out
}
