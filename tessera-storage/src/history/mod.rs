//! Raster history of a level.
//!
//! A [`RasterHistoryGrid`] covers a cell-aligned rectangle at a fixed
//! resolution (map units per cell). Every cell stores an index into the
//! ordered update list; index 0 is the base update and is never dropped.
//! The grid answers "which update last changed anything in this rectangle",
//! which is what tile cache keys are derived from.
//!
//! # Invariants
//!
//! - `updates` is strictly ascending and never empty.
//! - every cell value is a valid index into `updates`.
//! - growing the bounds pads new cells with 0 and leaves existing cells alone.

mod codec;

use std::collections::BTreeSet;
use std::path::Path;

use geo::{Coord, Intersects, Rect};
use serde::{Deserialize, Serialize};
use tessera_core::{Area, Bounds, HistoryError, StorageError, TesseraResult, Update};

use crate::artifacts::write_atomic;

pub use codec::{decode, encode, FORMAT_VERSION, MAGIC};

/// Most live updates a grid can reference; cells are `u16` indices.
pub const MAX_UPDATES: usize = u16::MAX as usize;

/// Cell-index rectangle, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRect {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl CellRect {
    fn union(&self, other: &CellRect) -> CellRect {
        CellRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Floor/ceil a map-unit interval to whole cells. A degenerate interval
/// still covers the cell it lies in.
fn cell_span(min: f64, max: f64, resolution: u16) -> (i64, i64) {
    let res = f64::from(resolution);
    let lo = (min / res).floor() as i64;
    let hi = (max / res).ceil() as i64;
    (lo, hi.max(lo + 1))
}

/// Per-cell record of the newest update that touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct RasterHistoryGrid {
    resolution: u16,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    updates: Vec<Update>,
    cells: Vec<u16>,
}

impl RasterHistoryGrid {
    /// Empty (0×0) grid seeded with the base update.
    pub fn new(resolution: u16, default_update: Update) -> Result<Self, HistoryError> {
        if resolution == 0 {
            return Err(HistoryError::InvalidResolution { resolution });
        }
        Ok(Self {
            resolution,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            updates: vec![default_update],
            cells: Vec::new(),
        })
    }

    /// Load a persisted grid.
    ///
    /// A missing file yields a fresh grid seeded with `default_update`, which
    /// is saved immediately. Every other failure is returned.
    pub fn open(path: &Path, resolution: u16, default_update: Update) -> TesseraResult<Self> {
        let artifact = path.display().to_string();
        match std::fs::read(path) {
            Ok(bytes) => Ok(decode(&bytes).map_err(|reason| StorageError::Corrupt {
                artifact,
                reason,
            })?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %artifact, "History missing, seeding a new one");
                let mut grid = Self::new(resolution, default_update)?;
                grid.save(path)?;
                Ok(grid)
            }
            Err(err) => Err(StorageError::from_io(artifact, &err).into()),
        }
    }

    /// Simplify, then persist atomically.
    pub fn save(&mut self, path: &Path) -> Result<(), StorageError> {
        self.simplify();
        write_atomic(path, &encode(self))
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    /// Width and height in cells.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Origin in cell units.
    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Map-unit rectangle covered by the grid, `None` while it has no cells.
    pub fn bounds(&self) -> Option<Bounds> {
        let rect = self.cell_rect()?;
        let res = f64::from(self.resolution);
        Some(Bounds::new(
            rect.x0 as f64 * res,
            rect.y0 as f64 * res,
            rect.x1 as f64 * res,
            rect.y1 as f64 * res,
        ))
    }

    /// Update index stored at a cell, `None` outside the grid.
    pub fn cell(&self, cx: i64, cy: i64) -> Option<u16> {
        self.offset(cx, cy).map(|i| self.cells[i])
    }

    fn cell_rect(&self) -> Option<CellRect> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(CellRect {
            x0: i64::from(self.x),
            y0: i64::from(self.y),
            x1: i64::from(self.x) + i64::from(self.width),
            y1: i64::from(self.y) + i64::from(self.height),
        })
    }

    fn offset(&self, cx: i64, cy: i64) -> Option<usize> {
        let rect = self.cell_rect()?;
        if cx < rect.x0 || cx >= rect.x1 || cy < rect.y0 || cy >= rect.y1 {
            return None;
        }
        let col = (cx - rect.x0) as usize;
        let row = (cy - rect.y0) as usize;
        Some(row * self.width as usize + col)
    }

    fn span_rect(&self, minx: f64, miny: f64, maxx: f64, maxy: f64) -> CellRect {
        let (x0, x1) = cell_span(minx, maxx, self.resolution);
        let (y0, y1) = cell_span(miny, maxy, self.resolution);
        CellRect { x0, y0, x1, y1 }
    }

    /// Reallocate to `target`, which must contain the current rectangle.
    fn resize_to(&mut self, target: CellRect) {
        if self.cell_rect() == Some(target) {
            return;
        }
        let width = (target.x1 - target.x0) as usize;
        let height = (target.y1 - target.y0) as usize;
        let mut cells = vec![0u16; width * height];

        if let Some(current) = self.cell_rect() {
            let old_width = self.width as usize;
            let col = (current.x0 - target.x0) as usize;
            for row in 0..self.height as usize {
                let dest_row = (current.y0 - target.y0) as usize + row;
                let dest = dest_row * width + col;
                let src = row * old_width;
                cells[dest..dest + old_width].copy_from_slice(&self.cells[src..src + old_width]);
            }
        }

        self.x = target.x0 as i32;
        self.y = target.y0 as i32;
        self.width = width as u32;
        self.height = height as u32;
        self.cells = cells;
    }

    fn grow_to_include(&mut self, rect: CellRect) {
        let target = match self.cell_rect() {
            Some(current) => current.union(&rect),
            None => rect,
        };
        self.resize_to(target);
    }

    /// Grow the grid so it covers the given map-unit rectangle.
    pub fn fit_bounds(&mut self, minx: f64, miny: f64, maxx: f64, maxy: f64) {
        let rect = self.span_rect(minx, miny, maxx, maxy);
        self.grow_to_include(rect);
    }

    /// Offsets of grid cells whose square intersects `geometry`.
    fn touched_cells(&self, geometry: &Area) -> Vec<usize> {
        let Some(bounds) = Bounds::of(geometry) else {
            return Vec::new();
        };
        let Some(grid) = self.cell_rect() else {
            return Vec::new();
        };
        let span = self.span_rect(bounds.minx, bounds.miny, bounds.maxx, bounds.maxy);
        let res = f64::from(self.resolution);

        let mut touched = Vec::new();
        for cy in span.y0.max(grid.y0)..span.y1.min(grid.y1) {
            for cx in span.x0.max(grid.x0)..span.x1.min(grid.x1) {
                let cell = Rect::new(
                    Coord {
                        x: cx as f64 * res,
                        y: cy as f64 * res,
                    },
                    Coord {
                        x: (cx + 1) as f64 * res,
                        y: (cy + 1) as f64 * res,
                    },
                );
                if geometry.intersects(&cell) {
                    if let Some(offset) = self.offset(cx, cy) {
                        touched.push(offset);
                    }
                }
            }
        }
        touched
    }

    /// Record that `update` changed everything inside `geometry`.
    ///
    /// Updates are normally applied in ascending order and simply appended.
    /// An older update is slotted into place so the list stays sorted.
    pub fn add_geometry(&mut self, geometry: &Area, update: Update) -> Result<(), HistoryError> {
        let Some(bounds) = Bounds::of(geometry) else {
            return Ok(());
        };
        let index = self.index_for(update)?;
        self.fit_bounds(bounds.minx, bounds.miny, bounds.maxx, bounds.maxy);
        for offset in self.touched_cells(geometry) {
            self.cells[offset] = index;
        }
        Ok(())
    }

    fn index_for(&mut self, update: Update) -> Result<u16, HistoryError> {
        if let Ok(existing) = self.updates.binary_search(&update) {
            return Ok(existing as u16);
        }
        if self.updates.len() >= MAX_UPDATES {
            self.simplify();
            if self.updates.len() >= MAX_UPDATES {
                return Err(HistoryError::UpdateCapacityExceeded { max: MAX_UPDATES });
            }
        }
        // Re-search: simplify may have renumbered.
        let position = match self.updates.binary_search(&update) {
            Ok(existing) => return Ok(existing as u16),
            Err(position) => position,
        };
        if position < self.updates.len() {
            for cell in self.cells.iter_mut().filter(|cell| usize::from(**cell) >= position) {
                *cell += 1;
            }
        }
        self.updates.insert(position, update);
        Ok(position as u16)
    }

    /// Cell values inside a map-unit rectangle (clipped to the grid).
    pub fn cells_in(&self, minx: f64, miny: f64, maxx: f64, maxy: f64) -> Vec<u16> {
        let Some(grid) = self.cell_rect() else {
            return Vec::new();
        };
        let span = self.span_rect(minx, miny, maxx, maxy);
        let mut values = Vec::new();
        for cy in span.y0.max(grid.y0)..span.y1.min(grid.y1) {
            let row = (cy - grid.y0) as usize * self.width as usize;
            let from = (span.x0.max(grid.x0) - grid.x0) as usize;
            let to = (span.x1.min(grid.x1) - grid.x0) as usize;
            if from < to {
                values.extend_from_slice(&self.cells[row + from..row + to]);
            }
        }
        values
    }

    /// Newest update touching the rectangle. Falls back to the base update
    /// when the rectangle covers no cells.
    pub fn last_update(&self, minx: f64, miny: f64, maxx: f64, maxy: f64) -> Update {
        let newest = self.cells_in(minx, miny, maxx, maxy).into_iter().max();
        let index = newest.map(usize::from).unwrap_or(0);
        self.updates.get(index).copied().unwrap_or(self.updates[0])
    }

    /// Drop updates no cell references any more (the base update stays) and
    /// renumber cells. Idempotent.
    pub fn simplify(&mut self) {
        let mut referenced = vec![false; self.updates.len()];
        referenced[0] = true;
        for &cell in &self.cells {
            referenced[usize::from(cell)] = true;
        }
        if referenced.iter().all(|used| *used) {
            return;
        }

        let mut remap = vec![0u16; self.updates.len()];
        let mut kept = Vec::with_capacity(self.updates.len());
        for (index, update) in self.updates.iter().enumerate() {
            if referenced[index] {
                remap[index] = kept.len() as u16;
                kept.push(*update);
            }
        }
        for cell in &mut self.cells {
            *cell = remap[usize::from(*cell)];
        }
        self.updates = kept;
    }

    /// Fold `other` into this grid.
    ///
    /// Both grids are brought to their combined bounds and a shared, sorted
    /// update list. Without a mask every cell takes the newer of both values;
    /// with a mask only cells touching the mask do, the rest keep this grid's
    /// value. The grid is simplified afterwards. Nothing changes on error.
    pub fn composite(&mut self, other: &RasterHistoryGrid, mask: Option<&Area>) -> Result<(), HistoryError> {
        if self.resolution != other.resolution {
            return Err(HistoryError::ResolutionMismatch {
                left: self.resolution,
                right: other.resolution,
            });
        }

        let merged: Vec<Update> = self
            .updates
            .iter()
            .chain(other.updates.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if merged.len() > MAX_UPDATES {
            return Err(HistoryError::UpdateCapacityExceeded { max: MAX_UPDATES });
        }

        let position = |update: &Update| merged.binary_search(update).unwrap_or(0) as u16;
        let self_remap: Vec<u16> = self.updates.iter().map(position).collect();
        let other_remap: Vec<u16> = other.updates.iter().map(position).collect();

        let combined = match (self.cell_rect(), other.cell_rect()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        if let Some(combined) = combined {
            self.resize_to(combined);
        }
        let mut other = other.clone();
        if let Some(combined) = combined {
            other.resize_to(combined);
        }

        let masked: Option<Vec<bool>> = mask.map(|mask| {
            let mut flags = vec![false; self.cells.len()];
            for offset in self.touched_cells(mask) {
                flags[offset] = true;
            }
            flags
        });

        for (offset, cell) in self.cells.iter_mut().enumerate() {
            let mine = self_remap[usize::from(*cell)];
            let theirs = other_remap[usize::from(other.cells[offset])];
            let take_max = masked.as_ref().map_or(true, |flags| flags[offset]);
            *cell = if take_max { mine.max(theirs) } else { mine };
        }

        self.updates = merged;
        self.simplify();
        Ok(())
    }
}

impl TryFrom<Vec<u8>> for RasterHistoryGrid {
    type Error = StorageError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        decode(&bytes).map_err(|reason| StorageError::Corrupt {
            artifact: "embedded history".to_string(),
            reason,
        })
    }
}

impl From<RasterHistoryGrid> for Vec<u8> {
    fn from(grid: RasterHistoryGrid) -> Self {
        encode(&grid)
    }
}

// ============================================================================
// TESTS
// ============================================================================
