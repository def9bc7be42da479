//! Pixel canvas and rasterization primitives.
//!
//! The canvas owns a fixed-size RGBA8 buffer and paints shape outlines and
//! flood fills directly on pixels. All coordinate math maps logical
//! drawing-area coordinates into pixel coordinates through one linear scale
//! (`pixels_per_unit = buffer_size / area_size`). The live drawing path and
//! the replay path share this mapping; any drift between the two causes
//! visual divergence between peers.

use crate::color::SerializableColor;
use crate::command::DrawingCommand;
use kurbo::{Point, Size};
use std::collections::VecDeque;
use thiserror::Error;

/// Per-channel tolerance used when matching flood-fill region colors.
pub const FILL_TOLERANCE: u8 = 16;

/// Pixels with every channel below this value are boundary pixels.
/// Flood fill never crosses them; open outlines therefore leak by design.
pub const DARKNESS_THRESHOLD: u8 = 64;

/// Background color the canvas is cleared to on creation.
pub const BACKGROUND: SerializableColor = SerializableColor {
    r: 255,
    g: 255,
    b: 255,
    a: 255,
};

/// Rasterization errors.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("invalid canvas dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid logical area size {0}x{1}")]
    InvalidArea(f64, f64),
    #[error("snapshot size {snapshot} does not match canvas size {canvas}")]
    SnapshotMismatch { snapshot: usize, canvas: usize },
}

/// A saved copy of the full pixel buffer, used for turn cancellation.
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    pixels: Vec<u8>,
}

/// Fixed-size RGBA pixel buffer with outline and flood-fill painters.
///
/// Created once per drawing phase and never resized; changing resolution
/// requires re-creation (or [`Canvas::reinitialize`] for a fresh buffer at
/// the same size).
#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    /// Logical drawing-area size the pixel buffer maps onto.
    area: Size,
    /// RGBA8, row-major, `width * height * 4` bytes.
    pixels: Vec<u8>,
}

impl Canvas {
    /// Allocate a canvas cleared to the background color.
    pub fn new(width: usize, height: usize, area: Size) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidDimensions { width, height });
        }
        if area.width <= 0.0 || area.height <= 0.0 {
            return Err(RasterError::InvalidArea(area.width, area.height));
        }
        let mut canvas = Self {
            width,
            height,
            area,
            pixels: vec![0; width * height * 4],
        };
        canvas.clear(BACKGROUND);
        Ok(canvas)
    }

    /// Release the buffer and recreate it cleared to the background color.
    ///
    /// Replay performs this before executing a command list; partial replay
    /// onto a dirty canvas is disallowed.
    pub fn reinitialize(&mut self) {
        self.clear(BACKGROUND);
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Logical drawing-area size this canvas maps.
    pub fn area(&self) -> Size {
        self.area
    }

    /// Raw RGBA8 buffer for the presentation layer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Horizontal pixels-per-logical-unit scale.
    pub fn scale_x(&self) -> f64 {
        self.width as f64 / self.area.width
    }

    /// Vertical pixels-per-logical-unit scale.
    pub fn scale_y(&self) -> f64 {
        self.height as f64 / self.area.height
    }

    /// Map a logical drawing-area point into pixel coordinates.
    pub fn to_pixel(&self, point: Point) -> Point {
        Point::new(point.x * self.scale_x(), point.y * self.scale_y())
    }

    /// Fill every pixel with one color.
    pub fn clear(&mut self, color: SerializableColor) {
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk[0] = color.r;
            chunk[1] = color.g;
            chunk[2] = color.b;
            chunk[3] = color.a;
        }
    }

    /// Read one pixel; `None` outside the buffer.
    pub fn pixel(&self, x: usize, y: usize) -> Option<SerializableColor> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some(SerializableColor::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ))
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: SerializableColor) {
        debug_assert!(x < self.width && y < self.height, "pixel out of bounds");
        let i = (y * self.width + x) * 4;
        self.pixels[i] = color.r;
        self.pixels[i + 1] = color.g;
        self.pixels[i + 2] = color.b;
        self.pixels[i + 3] = color.a;
    }

    /// Take a snapshot of the full pixel buffer.
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            pixels: self.pixels.clone(),
        }
    }

    /// Restore a snapshot taken from a same-sized canvas.
    pub fn restore(&mut self, snapshot: &CanvasSnapshot) -> Result<(), RasterError> {
        if snapshot.pixels.len() != self.pixels.len() {
            return Err(RasterError::SnapshotMismatch {
                snapshot: snapshot.pixels.len(),
                canvas: self.pixels.len(),
            });
        }
        self.pixels.copy_from_slice(&snapshot.pixels);
        Ok(())
    }

    /// Execute one command against the buffer. The same entry point serves
    /// the live drawing path and replay, keeping the coordinate mapping
    /// identical in both.
    pub fn apply(&mut self, command: &DrawingCommand) {
        match command {
            DrawingCommand::Geometry {
                shape,
                position,
                size,
                rotation,
                color,
                thickness,
                ..
            } => match shape {
                crate::command::ShapeKind::Rectangle => {
                    self.draw_rectangle(*position, *size, *rotation, *color, *thickness);
                }
                crate::command::ShapeKind::Circle => {
                    let radius = size.width.min(size.height) / 2.0;
                    self.draw_circle(*position, radius, *color, *thickness);
                }
                crate::command::ShapeKind::Ellipse => {
                    self.draw_ellipse(*position, *size, *rotation, *color, *thickness);
                }
                crate::command::ShapeKind::Line => {
                    let end = Point::new(position.x + size.width, position.y + size.height);
                    self.draw_line(*position, end, *color, *thickness);
                }
            },
            DrawingCommand::FloodFill {
                position, color, ..
            } => {
                self.flood_fill(*position, *color);
            }
        }
    }

    /// Paint a rectangle outline.
    ///
    /// A pixel is painted when it lies within `thickness` of the bounding
    /// edges: inside the rectangle inflated by half the stroke, outside the
    /// rectangle deflated by half the stroke.
    pub fn draw_rectangle(
        &mut self,
        center: Point,
        size: Size,
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
    ) {
        let c = self.to_pixel(center);
        let half_w = size.width / 2.0 * self.scale_x();
        let half_h = size.height / 2.0 * self.scale_y();
        let t = self.thickness_px(thickness);
        let half_t = t / 2.0;

        let reach = half_w.hypot(half_h) + half_t + 1.0;
        let (cos_r, sin_r) = (rotation.cos(), rotation.sin());

        self.paint_region(c, reach, color, |px, py| {
            // Rotate the sample point into the rectangle's frame.
            let dx = px - c.x;
            let dy = py - c.y;
            let lx = (dx * cos_r + dy * sin_r).abs();
            let ly = (-dx * sin_r + dy * cos_r).abs();
            let inside_outer = lx <= half_w + half_t && ly <= half_h + half_t;
            let inside_inner = lx < half_w - half_t && ly < half_h - half_t;
            inside_outer && !inside_inner
        });
    }

    /// Paint a circle outline. In pixel space a logical circle is an
    /// ellipse whenever the two axis scales differ, so this defers to the
    /// ellipse ring test with equal logical radii.
    pub fn draw_circle(
        &mut self,
        center: Point,
        radius: f64,
        color: SerializableColor,
        thickness: f64,
    ) {
        let diameter = radius * 2.0;
        self.draw_ellipse(center, Size::new(diameter, diameter), 0.0, color, thickness);
    }

    /// Paint an ellipse outline using the normalized ring test.
    pub fn draw_ellipse(
        &mut self,
        center: Point,
        size: Size,
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
    ) {
        let c = self.to_pixel(center);
        let rx = size.width / 2.0 * self.scale_x();
        let ry = size.height / 2.0 * self.scale_y();
        let half_t = self.thickness_px(thickness) / 2.0;

        let outer_rx = rx + half_t;
        let outer_ry = ry + half_t;
        let inner_rx = (rx - half_t).max(0.0);
        let inner_ry = (ry - half_t).max(0.0);

        let reach = outer_rx.max(outer_ry) + 1.0;
        let (cos_r, sin_r) = (rotation.cos(), rotation.sin());

        self.paint_region(c, reach, color, |px, py| {
            let dx = px - c.x;
            let dy = py - c.y;
            let lx = dx * cos_r + dy * sin_r;
            let ly = -dx * sin_r + dy * cos_r;
            let norm = |a: f64, b: f64, gx: f64, gy: f64| {
                if a <= 0.0 || b <= 0.0 {
                    return f64::INFINITY;
                }
                (gx / a).powi(2) + (gy / b).powi(2)
            };
            let in_outer = norm(outer_rx, outer_ry, lx, ly) <= 1.0;
            let in_inner = inner_rx > 0.0 && inner_ry > 0.0 && norm(inner_rx, inner_ry, lx, ly) < 1.0;
            in_outer && !in_inner
        });
    }

    /// Paint a line as an oriented rectangle: points within the segment's
    /// extent along its direction and within half the stroke thickness
    /// perpendicular to it.
    pub fn draw_line(
        &mut self,
        start: Point,
        end: Point,
        color: SerializableColor,
        thickness: f64,
    ) {
        let a = self.to_pixel(start);
        let b = self.to_pixel(end);
        let half_t = self.thickness_px(thickness) / 2.0;

        let dir_x = b.x - a.x;
        let dir_y = b.y - a.y;
        let len = dir_x.hypot(dir_y);

        if len < f64::EPSILON {
            // Degenerate segment: paint a dot of the stroke's radius.
            self.draw_circle_px(a, half_t, color);
            return;
        }

        let ux = dir_x / len;
        let uy = dir_y / len;
        let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        let reach = len / 2.0 + half_t + 1.0;

        self.paint_region(mid, reach, color, |px, py| {
            let dx = px - a.x;
            let dy = py - a.y;
            let along = dx * ux + dy * uy;
            let perp = (dx * uy - dy * ux).abs();
            along >= 0.0 && along <= len && perp <= half_t
        });
    }

    /// Flood fill starting at a logical seed point.
    ///
    /// Refused (returns `false`, no pixel changes) when the seed is out of
    /// bounds, already approximately the fill color, or a boundary pixel.
    /// Otherwise recolors the 4-connected region matching the seed's
    /// original color within [`FILL_TOLERANCE`].
    pub fn flood_fill(&mut self, seed: Point, fill: SerializableColor) -> bool {
        let p = self.to_pixel(seed);
        if p.x < 0.0 || p.y < 0.0 {
            return false;
        }
        let sx = p.x as usize;
        let sy = p.y as usize;
        let Some(origin) = self.pixel(sx, sy) else {
            return false;
        };

        if origin.approx_eq(&fill, FILL_TOLERANCE) {
            // Region is already the target color; filling again is a no-op.
            return false;
        }
        if origin.is_boundary(DARKNESS_THRESHOLD) {
            return false;
        }

        let mut visited = vec![false; self.width * self.height];
        let mut queue = VecDeque::new();
        visited[sy * self.width + sx] = true;
        queue.push_back((sx, sy));

        while let Some((x, y)) = queue.pop_front() {
            self.set_pixel(x, y, fill);

            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbors {
                if nx >= self.width || ny >= self.height {
                    continue;
                }
                let idx = ny * self.width + nx;
                if visited[idx] {
                    continue;
                }
                if let Some(c) = self.pixel(nx, ny) {
                    if c.approx_eq(&origin, FILL_TOLERANCE) {
                        visited[idx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }

        true
    }

    /// Stroke width in pixels. A stroke keeps one pixel width along its
    /// whole contour, so a logical thickness maps through the mean of the
    /// two axis scales (exact whenever the mapping is square).
    fn thickness_px(&self, thickness: f64) -> f64 {
        thickness * (self.scale_x() + self.scale_y()) / 2.0
    }

    /// Filled circle in pixel space, used for degenerate line segments.
    fn draw_circle_px(&mut self, center: Point, radius: f64, color: SerializableColor) {
        self.paint_region(center, radius + 1.0, color, |px, py| {
            (px - center.x).hypot(py - center.y) <= radius
        });
    }

    /// Paint every pixel within `reach` of `center` whose center point
    /// satisfies the predicate. The predicate receives pixel-space
    /// coordinates sampled at the pixel center.
    fn paint_region<F>(&mut self, center: Point, reach: f64, color: SerializableColor, test: F)
    where
        F: Fn(f64, f64) -> bool,
    {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let x0 = ((center.x - reach).floor().max(0.0)) as usize;
        let y0 = ((center.y - reach).floor().max(0.0)) as usize;
        let x1 = (((center.x + reach).ceil().max(0.0)) as usize).min(self.width - 1);
        let y1 = (((center.y + reach).ceil().max(0.0)) as usize).min(self.height - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                if test(x as f64 + 0.5, y as f64 + 0.5) {
                    self.set_pixel(x, y, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ShapeKind;

    fn canvas_64() -> Canvas {
        // 1:1 logical-to-pixel scale keeps test coordinates readable.
        Canvas::new(64, 64, Size::new(64.0, 64.0)).unwrap()
    }

    #[test]
    fn test_new_clears_to_background() {
        let canvas = canvas_64();
        assert_eq!(canvas.pixel(0, 0), Some(BACKGROUND));
        assert_eq!(canvas.pixel(63, 63), Some(BACKGROUND));
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert!(Canvas::new(0, 10, Size::new(1.0, 1.0)).is_err());
        assert!(Canvas::new(10, 10, Size::new(0.0, 1.0)).is_err());
    }

    #[test]
    fn test_rectangle_outline_not_fill() {
        let mut canvas = canvas_64();
        canvas.draw_rectangle(
            Point::new(32.0, 32.0),
            Size::new(40.0, 40.0),
            0.0,
            SerializableColor::black(),
            2.0,
        );

        // Border pixel painted.
        assert_eq!(canvas.pixel(12, 32), Some(SerializableColor::black()));
        // Interior untouched.
        assert_eq!(canvas.pixel(32, 32), Some(BACKGROUND));
        // Exterior untouched.
        assert_eq!(canvas.pixel(2, 2), Some(BACKGROUND));
    }

    #[test]
    fn test_circle_ring() {
        let mut canvas = canvas_64();
        canvas.draw_circle(Point::new(32.0, 32.0), 20.0, SerializableColor::black(), 2.0);

        // On the ring.
        assert_eq!(canvas.pixel(52, 32), Some(SerializableColor::black()));
        // Center stays clear.
        assert_eq!(canvas.pixel(32, 32), Some(BACKGROUND));
        // Well outside.
        assert_eq!(canvas.pixel(60, 60), Some(BACKGROUND));
    }

    #[test]
    fn test_line_oriented_rectangle() {
        let mut canvas = canvas_64();
        canvas.draw_line(
            Point::new(10.0, 32.0),
            Point::new(50.0, 32.0),
            SerializableColor::black(),
            2.0,
        );

        assert_eq!(canvas.pixel(30, 32), Some(SerializableColor::black()));
        // Past the endpoints.
        assert_eq!(canvas.pixel(5, 32), Some(BACKGROUND));
        assert_eq!(canvas.pixel(55, 32), Some(BACKGROUND));
        // Perpendicular distance beyond half the stroke.
        assert_eq!(canvas.pixel(30, 40), Some(BACKGROUND));
    }

    #[test]
    fn test_flood_fill_contained_by_boundary() {
        let mut canvas = canvas_64();
        canvas.draw_rectangle(
            Point::new(32.0, 32.0),
            Size::new(40.0, 40.0),
            0.0,
            SerializableColor::black(),
            3.0,
        );

        let red = SerializableColor::new(255, 0, 0, 255);
        assert!(canvas.flood_fill(Point::new(32.0, 32.0), red));

        // Interior filled.
        assert_eq!(canvas.pixel(32, 32), Some(red));
        assert_eq!(canvas.pixel(20, 40), Some(red));
        // Exterior never touched.
        assert_eq!(canvas.pixel(2, 2), Some(BACKGROUND));
        assert_eq!(canvas.pixel(62, 62), Some(BACKGROUND));
        // Boundary pixels keep their stroke color.
        assert_eq!(canvas.pixel(12, 32), Some(SerializableColor::black()));
    }

    #[test]
    fn test_flood_fill_idempotent() {
        let mut canvas = canvas_64();
        let red = SerializableColor::new(255, 0, 0, 255);
        assert!(canvas.flood_fill(Point::new(32.0, 32.0), red));
        // Second fill over the same region is refused.
        assert!(!canvas.flood_fill(Point::new(32.0, 32.0), red));
    }

    #[test]
    fn test_flood_fill_refuses_boundary_seed() {
        let mut canvas = canvas_64();
        canvas.draw_line(
            Point::new(0.0, 32.0),
            Point::new(64.0, 32.0),
            SerializableColor::black(),
            3.0,
        );
        let red = SerializableColor::new(255, 0, 0, 255);
        assert!(!canvas.flood_fill(Point::new(32.0, 32.0), red));
        assert_eq!(canvas.pixel(32, 32), Some(SerializableColor::black()));
    }

    #[test]
    fn test_flood_fill_out_of_bounds_noop() {
        let mut canvas = canvas_64();
        let red = SerializableColor::new(255, 0, 0, 255);
        assert!(!canvas.flood_fill(Point::new(-5.0, 10.0), red));
        assert!(!canvas.flood_fill(Point::new(100.0, 10.0), red));
        assert_eq!(canvas.pixel(0, 0), Some(BACKGROUND));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut canvas = canvas_64();
        let before = canvas.snapshot();

        canvas.draw_circle(Point::new(32.0, 32.0), 10.0, SerializableColor::black(), 2.0);
        assert_ne!(canvas.pixels(), before.pixels.as_slice());

        canvas.restore(&before).unwrap();
        assert_eq!(canvas.pixels(), before.pixels.as_slice());
    }

    #[test]
    fn test_snapshot_size_mismatch_rejected() {
        let small = Canvas::new(8, 8, Size::new(8.0, 8.0)).unwrap();
        let mut big = canvas_64();
        assert!(big.restore(&small.snapshot()).is_err());
    }

    #[test]
    fn test_scale_consistency_between_resolutions() {
        // The same logical command must cover the same logical region at
        // any buffer resolution.
        let mut canvas = Canvas::new(128, 128, Size::new(64.0, 64.0)).unwrap();
        canvas.draw_rectangle(
            Point::new(32.0, 32.0),
            Size::new(40.0, 40.0),
            0.0,
            SerializableColor::black(),
            2.0,
        );
        // Logical (12, 32) maps to pixel (24, 64) at 2x scale.
        assert_eq!(canvas.pixel(24, 64), Some(SerializableColor::black()));
        assert_eq!(canvas.pixel(64, 64), Some(BACKGROUND));
    }

    #[test]
    fn test_circle_on_anisotropic_mapping() {
        // 2x horizontal, 1x vertical: the ring must reach the logical
        // radius on both axes, not just the horizontal one.
        let mut canvas = Canvas::new(128, 64, Size::new(64.0, 64.0)).unwrap();
        canvas.draw_circle(Point::new(32.0, 32.0), 20.0, SerializableColor::black(), 2.0);

        // Rightmost ring point, logical (52, 32) -> pixel (104, 32).
        assert_eq!(canvas.pixel(104, 32), Some(SerializableColor::black()));
        // Topmost ring point, logical (32, 12) -> pixel (64, 12).
        assert_eq!(canvas.pixel(64, 12), Some(SerializableColor::black()));
        // Center stays clear.
        assert_eq!(canvas.pixel(64, 32), Some(BACKGROUND));
    }

    #[test]
    fn test_apply_dispatches_geometry_and_fill() {
        let mut canvas = canvas_64();
        canvas.apply(&DrawingCommand::Geometry {
            shape: ShapeKind::Rectangle,
            position: Point::new(32.0, 32.0),
            size: Size::new(40.0, 40.0),
            rotation: 0.0,
            color: SerializableColor::black(),
            thickness: 3.0,
            timestamp: 1,
            author_id: "a".to_string(),
            author_name: "Alice".to_string(),
        });
        canvas.apply(&DrawingCommand::FloodFill {
            position: Point::new(32.0, 32.0),
            color: SerializableColor::new(0, 0, 255, 255),
            timestamp: 2,
            author_id: "a".to_string(),
            author_name: "Alice".to_string(),
        });
        assert_eq!(
            canvas.pixel(32, 32),
            Some(SerializableColor::new(0, 0, 255, 255))
        );
    }
}
