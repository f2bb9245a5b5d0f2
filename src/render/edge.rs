//! Scanline edge generation and management.
//!
//! This module provides the `Edge` and `ScanlineTable` structures used by the
//! scanline fill to turn rings in pixel space into horizontal pixel spans.
//! A pixel is inside when its centre is inside (even-odd rule).

/// Represents an edge in the scanline algorithm.
#[derive(Debug, Clone)]
pub struct Edge {
    /// First scanline below the edge (exclusive end of its row range).
    pub y_end: i32,
    /// X coordinate where the edge crosses the current scanline centre.
    pub x_current: f64,
    /// Reciprocal of the slope (dx/dy). Used to update x_current for each new scanline.
    pub inv_slope: f64,
}

impl Edge {
    /// Creates a new `Edge` from two points, returning it with its first
    /// scanline.
    ///
    /// Returns `None` if the edge crosses no scanline centre, which covers
    /// horizontal edges.
    pub fn new(p1: (f64, f64), p2: (f64, f64)) -> Option<(i32, Self)> {
        let (p_start, p_end) = if p1.1 < p2.1 { (p1, p2) } else { (p2, p1) };

        let y_start = (p_start.1 - 0.5).ceil() as i32;
        let y_end = (p_end.1 - 0.5).ceil() as i32;
        if y_start >= y_end {
            return None;
        }

        let inv_slope = (p_end.0 - p_start.0) / (p_end.1 - p_start.1);
        let x_current = p_start.0 + (y_start as f64 + 0.5 - p_start.1) * inv_slope;

        Some((
            y_start,
            Edge {
                y_end,
                x_current,
                inv_slope,
            },
        ))
    }
}

/// One run of inside pixels `[x0, x1)` on row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub y: u32,
    pub x0: u32,
    pub x1: u32,
}

/// A Global Edge Table (GET) organized by scanline.
pub struct ScanlineTable {
    /// First scanline covered by the table.
    pub y_min: i32,
    /// Vector of edges starting at each scanline. Indexed by `y - y_min`.
    pub entries: Vec<Vec<Edge>>,
}

impl ScanlineTable {
    /// Creates a new empty `ScanlineTable`.
    pub fn new(y_min: i32, height: u32) -> Self {
        ScanlineTable {
            y_min,
            entries: (0..height).map(|_| Vec::new()).collect(),
        }
    }

    /// Builds the table for a set of rings in pixel coordinates, limited to
    /// rows `0..img_height`.
    pub fn from_rings(rings: &[Vec<(f64, f64)>], img_height: u32) -> Self {
        let (lo, hi) = rings
            .iter()
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.1), hi.max(p.1))
            });

        if !lo.is_finite() || !hi.is_finite() {
            return Self::new(0, 0);
        }
        let y_min = ((lo - 0.5).ceil() as i32).max(0);
        let y_max = ((hi - 0.5).ceil() as i32).min(img_height as i32);
        let mut table = Self::new(y_min, (y_max - y_min).max(0) as u32);
        for ring in rings {
            table.extract_from_ring(ring);
        }
        table
    }

    /// Adds an edge starting at a specific scanline, moving it down to the
    /// first row of the table when it starts above.
    pub fn add_edge(&mut self, y_start: i32, mut edge: Edge) {
        let y = if y_start < self.y_min {
            edge.x_current += (self.y_min - y_start) as f64 * edge.inv_slope;
            self.y_min
        } else {
            y_start
        };
        if edge.y_end <= y {
            return;
        }
        let idx = (y - self.y_min) as usize;
        if idx < self.entries.len() {
            self.entries[idx].push(edge);
        }
    }

    /// Extracts edges from a single ring (exterior or interior). The ring
    /// is treated as closed.
    fn extract_from_ring(&mut self, ring: &[(f64, f64)]) {
        if ring.len() < 3 {
            return;
        }

        for i in 0..ring.len() {
            let p1 = ring[i];
            let p2 = ring[(i + 1) % ring.len()];

            if let Some((y_start, edge)) = Edge::new(p1, p2) {
                self.add_edge(y_start, edge);
            }
        }
    }

    /// Walks the table with an Active Edge Table and returns the inside
    /// spans clipped to `0..img_width`.
    pub fn spans(&self, img_width: u32) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut active_edge_table: Vec<Edge> = Vec::new();

        for (offset, new_edges) in self.entries.iter().enumerate() {
            let y = self.y_min + offset as i32;

            active_edge_table.extend(new_edges.iter().cloned());
            active_edge_table.retain(|edge| edge.y_end > y);
            active_edge_table.sort_by(|a, b| a.x_current.total_cmp(&b.x_current));

            let mut intersections = active_edge_table.iter();
            while let (Some(e1), Some(e2)) = (intersections.next(), intersections.next()) {
                let x0 = ((e1.x_current - 0.5).ceil() as i64).clamp(0, img_width as i64) as u32;
                let x1 = ((e2.x_current - 0.5).ceil() as i64).clamp(0, img_width as i64) as u32;
                if x0 < x1 {
                    spans.push(Span { y: y as u32, x0, x1 });
                }
            }

            for edge in &mut active_edge_table {
                edge.x_current += edge.inv_slope;
            }
        }

        spans
    }
}
