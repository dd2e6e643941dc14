//! Quadtree decomposition of a grayscale image into homogeneous blobs.
//!
//! A rectangle is split into its four quadrants whenever it is larger than
//! the configured minimum blob size and its gray range (max - min) exceeds
//! the homogeneity threshold. Leaves tile the input exactly.


/// Axis-aligned rectangle in image coordinates; `bottom` and `right` are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quadrant {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Quadrant {
    #[inline]
    pub fn width(&self) -> usize {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bottom - self.top
    }
}

/// A decomposed rectangle tagged with its gray-range statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Blob {
    pub rect: Quadrant,
    /// max - min gray value inside `rect`
    pub range: u8,
}

/// Children are ordered TL, TR, BL, BR; absent on leaves.
#[derive(Debug)]
struct Node {
    blob: Blob,
    children: [Option<usize>; 4],
}

/// Quadtree over an 8-bit image. Nodes live in an index arena; links only
/// point downward.
#[derive(Debug)]
pub struct QuadTree {
    nodes: Vec<Node>,
    root: Option<usize>,
    min_bw: usize,
    min_bh: usize,
    min_range: u8,
}

impl QuadTree {
    /// Create an empty tree with the given split thresholds: a rectangle
    /// splits only while wider than `min_bw`, taller than `min_bh` and less
    /// homogeneous than `min_range`.
    pub fn new(min_bw: usize, min_bh: usize, min_range: u8) -> Self {
        assert!(min_bw > 0 && min_bh > 0, "Minimum blob size must be positive");
        Self {
            nodes: Vec::new(),
            root: None,
            min_bw,
            min_bh,
            min_range,
        }
    }

    /// Decompose `image` (row-major, `width * height`) into blobs. Any
    /// previous decomposition is discarded.
    pub fn decompose(&mut self, image: &[u8], width: usize, height: usize) {
        assert_eq!(image.len(), width * height, "Pixel count mismatch");
        assert!(width > 0 && height > 0, "Image must be non-empty");

        self.reset();
        let full = Quadrant {
            top: 0,
            left: 0,
            bottom: height,
            right: width,
        };
        let root = self.split(image, width, full);
        self.root = Some(root);
    }

    /// Leaf blobs in depth-first TL, TR, BL, BR order. Empty before the
    /// first decomposition.
    pub fn leaves(&self) -> Vec<Blob> {
        let mut blobs = Vec::new();
        if let Some(root) = self.root {
            self.collect_leaves(root, &mut blobs);
        }
        blobs
    }

    /// Drop every node.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn split(&mut self, image: &[u8], width: usize, rect: Quadrant) -> usize {
        let range = gray_range(image, width, rect);

        let id = self.nodes.len();
        self.nodes.push(Node {
            blob: Blob { rect, range },
            children: [None; 4],
        });

        if rect.width() > self.min_bw && rect.height() > self.min_bh && range > self.min_range {
            let mid_y = (rect.top + rect.bottom) / 2;
            let mid_x = (rect.left + rect.right) / 2;

            let quadrants = [
                // TL
                Quadrant { top: rect.top, left: rect.left, bottom: mid_y, right: mid_x },
                // TR
                Quadrant { top: rect.top, left: mid_x, bottom: mid_y, right: rect.right },
                // BL
                Quadrant { top: mid_y, left: rect.left, bottom: rect.bottom, right: mid_x },
                // BR
                Quadrant { top: mid_y, left: mid_x, bottom: rect.bottom, right: rect.right },
            ];

            for (slot, quad) in quadrants.into_iter().enumerate() {
                let child = self.split(image, width, quad);
                self.nodes[id].children[slot] = Some(child);
            }
        }

        id
    }

    fn collect_leaves(&self, id: usize, blobs: &mut Vec<Blob>) {
        let node = &self.nodes[id];
        if node.children.iter().all(Option::is_none) {
            blobs.push(node.blob);
            return;
        }
        for child in node.children.into_iter().flatten() {
            self.collect_leaves(child, blobs);
        }
    }
}

/// max - min gray value over a rectangle.
fn gray_range(image: &[u8], width: usize, rect: Quadrant) -> u8 {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for y in rect.top..rect.bottom {
        let row = &image[y * width + rect.left..y * width + rect.right];
        for &v in row {
            min = min.min(v);
            max = max.max(v);
        }
    }
    max.saturating_sub(min)
}
