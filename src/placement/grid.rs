//! Cell grid over a polygon in degree space.
//!
//! The grid carries one empty cell of margin on every side, so each row and
//! column contains outside cells and the distance transform stays finite.

use geo::{BoundingRect, Coord, MultiPolygon};
use std::collections::VecDeque;

use crate::render::edge::ScanlineTable;

/// Squared distance standing in for infinity in the 1D transform.
const FAR: f64 = 1e12;

#[derive(Debug, Clone)]
pub struct CellGrid {
    pub west: f64,
    pub north: f64,
    /// Cell edge length in degrees.
    pub cell: f64,
    pub width: usize,
    pub height: usize,
    /// Row-major inside flags, sampled at cell centres.
    pub inside: Vec<bool>,
}

impl CellGrid {
    /// Rasterizes `polygon` with `cells_long` cells across its longer side.
    ///
    /// Returns `None` for empty or zero-extent geometry.
    pub fn rasterize(polygon: &MultiPolygon<f64>, cells_long: usize) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        let long = rect.width().max(rect.height());
        if !(long > 0.0) || cells_long == 0 {
            return None;
        }

        let cell = long / cells_long as f64;
        let west = rect.min().x - cell;
        let north = rect.max().y + cell;
        let width = (rect.width() / cell).ceil() as usize + 2;
        let height = (rect.height() / cell).ceil() as usize + 2;

        let to_cells = |c: &Coord<f64>| ((c.x - west) / cell, (north - c.y) / cell);
        let mut inside = vec![false; width * height];
        for poly in polygon.iter() {
            let mut rings = vec![poly.exterior().coords().map(to_cells).collect::<Vec<_>>()];
            rings.extend(
                poly.interiors()
                    .iter()
                    .map(|r| r.coords().map(to_cells).collect::<Vec<_>>()),
            );
            for span in ScanlineTable::from_rings(&rings, height as u32).spans(width as u32) {
                let row = span.y as usize * width;
                for x in span.x0..span.x1 {
                    inside[row + x as usize] = true;
                }
            }
        }

        Some(Self {
            west,
            north,
            cell,
            width,
            height,
            inside,
        })
    }

    /// World coordinates of a cell centre.
    pub fn center(&self, idx: usize) -> Coord<f64> {
        let (col, row) = (idx % self.width, idx / self.width);
        Coord {
            x: self.west + (col as f64 + 0.5) * self.cell,
            y: self.north - (row as f64 + 0.5) * self.cell,
        }
    }

    /// Index of the cell containing `c`.
    pub fn index_of(&self, c: Coord<f64>) -> Option<usize> {
        let col = ((c.x - self.west) / self.cell).floor();
        let row = ((self.north - c.y) / self.cell).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some(row as usize * self.width + col as usize)
    }
}

/// Felzenszwalb-Huttenlocher lower envelope of parabolas, in place.
fn edt_1d(f: &[f64], out: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    let intersect = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    let mut k = 0;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let d = q as f64 - v[k] as f64;
        *o = d * d + f[v[k]];
    }
}

/// Euclidean distance, in cells, from every cell centre to the nearest
/// outside cell centre. Outside cells get 0.
pub fn distance_transform(mask: &[bool], width: usize, height: usize) -> Vec<f64> {
    let mut grid: Vec<f64> = mask.iter().map(|&m| if m { FAR } else { 0.0 }).collect();
    let n = width.max(height);
    let mut f = vec![0.0; n];
    let mut out = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];

    for row in grid.chunks_mut(width) {
        f[..width].copy_from_slice(row);
        edt_1d(&f[..width], &mut out[..width], &mut v, &mut z);
        row.copy_from_slice(&out[..width]);
    }
    for col in 0..width {
        for row in 0..height {
            f[row] = grid[row * width + col];
        }
        edt_1d(&f[..height], &mut out[..height], &mut v, &mut z);
        for row in 0..height {
            grid[row * width + col] = out[row];
        }
    }

    grid.into_iter().map(f64::sqrt).collect()
}

/// 4-connected components of a mask.
#[derive(Debug, Clone)]
pub struct Components {
    /// Component id per cell, 0 for unset cells. Ids start at 1.
    pub labels: Vec<u32>,
    /// Cell count of component `id` at index `id - 1`.
    pub sizes: Vec<usize>,
}

impl Components {
    pub fn label(mask: &[bool], width: usize, height: usize) -> Self {
        let mut labels = vec![0u32; mask.len()];
        let mut sizes = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..mask.len() {
            if !mask[start] || labels[start] != 0 {
                continue;
            }
            let id = sizes.len() as u32 + 1;
            let mut size = 0;
            labels[start] = id;
            queue.push_back(start);

            while let Some(idx) = queue.pop_front() {
                size += 1;
                let (col, row) = (idx % width, idx / width);
                let neighbours = [
                    (col > 0).then(|| idx - 1),
                    (col + 1 < width).then(|| idx + 1),
                    (row > 0).then(|| idx - width),
                    (row + 1 < height).then(|| idx + width),
                ];
                for n in neighbours.into_iter().flatten() {
                    if mask[n] && labels[n] == 0 {
                        labels[n] = id;
                        queue.push_back(n);
                    }
                }
            }
            sizes.push(size);
        }

        Self { labels, sizes }
    }

    /// Id of the largest component; ties go to the first found.
    pub fn largest(&self) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (i, &size) in self.sizes.iter().enumerate() {
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((i as u32 + 1, size));
            }
        }
        best.map(|(id, _)| id)
    }
}
