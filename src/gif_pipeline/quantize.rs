use std::collections::HashMap;

/// Most opaque colours one frame palette holds. One more entry is reserved for transparency.
pub const MAX_COLORS: usize = 255;

/// Pixels with alpha below this map to the transparent entry.
pub const ALPHA_CUTOFF: u8 = 128;

const BITS: u32 = 5;
const LEVELS: usize = 1 << BITS;
const BINS: usize = LEVELS * LEVELS * LEVELS;

/// A frame reduced to a local palette.
#[derive(Clone, Debug, Default)]
pub struct IndexedFrame {
    /// RGB triplets, at most 256 entries.
    pub palette: Vec<u8>,
    /// One palette index per pixel, row-major.
    pub indices: Vec<u8>,
    /// Index of the transparent entry when the frame has clear pixels.
    pub transparent: Option<u8>,
}

impl IndexedFrame {
    /// Number of palette entries, including the transparent one.
    pub fn colors(&self) -> usize {
        self.palette.len() / 3
    }
}

/// Quantization state reused across frames.
///
/// Frames with at most [`MAX_COLORS`] distinct opaque colours get an exact palette. Anything
/// richer goes through median cut over a 15-bit colour histogram.
#[derive(Debug, Default)]
pub struct Quantizer {
    exact: HashMap<[u8; 3], u8>,
    counts: Vec<u32>,
    sums: Vec<[u64; 3]>,
    lookup: Vec<u8>,
    occupied: Vec<u16>,
}

impl Quantizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce straight-alpha RGBA pixels to `out`, overwriting its previous contents.
    pub fn quantize(&mut self, rgba: &[u8], out: &mut IndexedFrame) {
        out.palette.clear();
        out.indices.clear();
        out.indices.reserve(rgba.len() / 4);

        let exact = self.exact_palette(rgba, &mut out.palette);
        if !exact {
            self.median_cut(rgba, &mut out.palette);
        }

        let has_clear = rgba.chunks_exact(4).any(|px| px[3] < ALPHA_CUTOFF);
        out.transparent = has_clear.then(|| {
            let idx = out.colors() as u8;
            out.palette.extend_from_slice(&[0, 0, 0]);
            idx
        });
        if out.palette.is_empty() {
            out.palette.extend_from_slice(&[0, 0, 0]);
        }

        let clear = out.transparent.unwrap_or(0);
        for px in rgba.chunks_exact(4) {
            let idx = if px[3] < ALPHA_CUTOFF {
                clear
            } else if exact {
                self.exact.get(&[px[0], px[1], px[2]]).copied().unwrap_or(0)
            } else {
                self.lookup[bin(px)]
            };
            out.indices.push(idx);
        }
    }

    /// Collect distinct opaque colours; false once there are more than fit.
    fn exact_palette(&mut self, rgba: &[u8], palette: &mut Vec<u8>) -> bool {
        self.exact.clear();
        let mut last: Option<[u8; 3]> = None;
        for px in rgba.chunks_exact(4).filter(|px| px[3] >= ALPHA_CUTOFF) {
            let key = [px[0], px[1], px[2]];
            if last == Some(key) || self.exact.contains_key(&key) {
                last = Some(key);
                continue;
            }
            if self.exact.len() == MAX_COLORS {
                palette.clear();
                return false;
            }
            self.exact.insert(key, self.exact.len() as u8);
            palette.extend_from_slice(&key);
            last = Some(key);
        }
        true
    }

    fn median_cut(&mut self, rgba: &[u8], palette: &mut Vec<u8>) {
        self.counts.clear();
        self.counts.resize(BINS, 0);
        self.sums.clear();
        self.sums.resize(BINS, [0; 3]);
        self.lookup.clear();
        self.lookup.resize(BINS, 0);

        for px in rgba.chunks_exact(4).filter(|px| px[3] >= ALPHA_CUTOFF) {
            let b = bin(px);
            self.counts[b] += 1;
            for c in 0..3 {
                self.sums[b][c] += u64::from(px[c]);
            }
        }

        self.occupied.clear();
        self.occupied
            .extend((0..BINS).filter(|&b| self.counts[b] > 0).map(|b| b as u16));
        if self.occupied.is_empty() {
            return;
        }

        let mut boxes = vec![ColorBox::new(0, self.occupied.len(), &self.occupied, &self.counts)];
        while boxes.len() < MAX_COLORS {
            let Some(pick) = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.end - b.start > 1)
                .max_by_key(|(_, b)| b.score())
                .map(|(i, _)| i)
            else {
                break;
            };
            let b = boxes[pick];
            let channel = b.widest_channel();
            let slice = &mut self.occupied[b.start..b.end];
            slice.sort_unstable_by_key(|&bin| channel_level(bin, channel));

            let half = b.pixels / 2;
            let mut acc = 0u64;
            let mut split = b.end - 1;
            for (i, &bin) in slice.iter().enumerate() {
                acc += u64::from(self.counts[usize::from(bin)]);
                if acc >= half {
                    split = b.start + i + 1;
                    break;
                }
            }
            let split = split.clamp(b.start + 1, b.end - 1);

            boxes[pick] = ColorBox::new(b.start, split, &self.occupied, &self.counts);
            boxes.push(ColorBox::new(split, b.end, &self.occupied, &self.counts));
        }

        for (i, b) in boxes.iter().enumerate() {
            let mut n = 0u64;
            let mut sum = [0u64; 3];
            for &bin in &self.occupied[b.start..b.end] {
                let bin = usize::from(bin);
                n += u64::from(self.counts[bin]);
                for c in 0..3 {
                    sum[c] += self.sums[bin][c];
                }
                self.lookup[bin] = i as u8;
            }
            let n = n.max(1);
            for s in sum {
                palette.push(((s + n / 2) / n) as u8);
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ColorBox {
    start: usize,
    end: usize,
    pixels: u64,
    lo: [u8; 3],
    hi: [u8; 3],
}

impl ColorBox {
    fn new(start: usize, end: usize, occupied: &[u16], counts: &[u32]) -> Self {
        let mut lo = [u8::MAX; 3];
        let mut hi = [0u8; 3];
        let mut pixels = 0u64;
        for &bin in &occupied[start..end] {
            pixels += u64::from(counts[usize::from(bin)]);
            for c in 0..3 {
                let v = channel_level(bin, c);
                lo[c] = lo[c].min(v);
                hi[c] = hi[c].max(v);
            }
        }
        Self {
            start,
            end,
            pixels,
            lo,
            hi,
        }
    }

    fn widest_channel(&self) -> usize {
        (0..3)
            .max_by_key(|&c| self.hi[c] - self.lo[c])
            .unwrap_or(0)
    }

    fn score(&self) -> u64 {
        let c = self.widest_channel();
        u64::from(self.hi[c] - self.lo[c] + 1) * self.pixels
    }
}

fn bin(px: &[u8]) -> usize {
    let shift = 8 - BITS;
    (usize::from(px[0] >> shift) << (2 * BITS))
        | (usize::from(px[1] >> shift) << BITS)
        | usize::from(px[2] >> shift)
}

fn channel_level(bin: u16, channel: usize) -> u8 {
    let shift = (2 - channel as u32) * BITS;
    ((bin >> shift) as usize & (LEVELS - 1)) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/gif_pipeline/quantize.rs"]
mod tests;
