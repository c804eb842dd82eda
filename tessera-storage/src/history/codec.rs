//! Versioned binary layout of a history grid (little endian).
//!
//! ```text
//! magic "TSHG" | format_version u16 | variant u8 | cell_width u8
//! resolution u16 | x i32 | y i32 | width u32 | height u32
//! count u16 | count × (id u32, timestamp u32)
//! width × height × u16 cells, row major
//! ```

use tessera_core::Update;

use super::{RasterHistoryGrid, MAX_UPDATES};

pub const MAGIC: &[u8; 4] = b"TSHG";
pub const FORMAT_VERSION: u16 = 1;

const HISTORY_VARIANT: u8 = 1;
const CELL_WIDTH: u8 = 2;
const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 2 + 4 + 4 + 4 + 4;

pub fn encode(grid: &RasterHistoryGrid) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(HEADER_LEN + 2 + grid.updates.len() * 8 + grid.cells.len() * 2);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(HISTORY_VARIANT);
    out.push(CELL_WIDTH);
    out.extend_from_slice(&grid.resolution.to_le_bytes());
    out.extend_from_slice(&grid.x.to_le_bytes());
    out.extend_from_slice(&grid.y.to_le_bytes());
    out.extend_from_slice(&grid.width.to_le_bytes());
    out.extend_from_slice(&grid.height.to_le_bytes());

    out.extend_from_slice(&(grid.updates.len() as u16).to_le_bytes());
    for update in &grid.updates {
        out.extend_from_slice(&update.id.to_le_bytes());
        out.extend_from_slice(&update.timestamp.to_le_bytes());
    }
    for cell in &grid.cells {
        out.extend_from_slice(&cell.to_le_bytes());
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N], String> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| format!("truncated while reading {}", what))?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u8(&mut self, what: &str) -> Result<u8, String> {
        Ok(self.take::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16, String> {
        Ok(u16::from_le_bytes(self.take(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32, String> {
        Ok(u32::from_le_bytes(self.take(what)?))
    }

    fn i32(&mut self, what: &str) -> Result<i32, String> {
        Ok(i32::from_le_bytes(self.take(what)?))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Parse a grid, checking every header field and cell index.
pub fn decode(bytes: &[u8]) -> Result<RasterHistoryGrid, String> {
    let mut reader = Reader { bytes, pos: 0 };

    if &reader.take::<4>("magic")? != MAGIC {
        return Err("unknown magic".to_string());
    }
    let version = reader.u16("format version")?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", version));
    }
    let variant = reader.u8("variant")?;
    if variant != HISTORY_VARIANT {
        return Err(format!("unexpected grid variant {}", variant));
    }
    let cell_width = reader.u8("cell width")?;
    if cell_width != CELL_WIDTH {
        return Err(format!("unsupported cell width {}", cell_width));
    }

    let resolution = reader.u16("resolution")?;
    if resolution == 0 {
        return Err("resolution is zero".to_string());
    }
    let x = reader.i32("x")?;
    let y = reader.i32("y")?;
    let width = reader.u32("width")?;
    let height = reader.u32("height")?;

    let count = usize::from(reader.u16("update count")?);
    if count == 0 || count > MAX_UPDATES {
        return Err(format!("invalid update count {}", count));
    }
    let mut updates = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.u32("update id")?;
        let timestamp = reader.u32("update timestamp")?;
        updates.push(Update::new(id, timestamp));
    }
    if updates.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err("updates are not strictly ascending".to_string());
    }

    let cell_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| "grid dimensions overflow".to_string())?;
    let cell_bytes = cell_count
        .checked_mul(usize::from(CELL_WIDTH))
        .ok_or_else(|| "grid dimensions overflow".to_string())?;
    if reader.remaining() != cell_bytes {
        return Err(format!(
            "expected {} cell bytes, found {}",
            cell_bytes,
            reader.remaining()
        ));
    }
    let mut cells = Vec::with_capacity(cell_count);
    for _ in 0..cell_count {
        let cell = reader.u16("cell")?;
        if usize::from(cell) >= count {
            return Err(format!("cell index {} out of range", cell));
        }
        cells.push(cell);
    }

    Ok(RasterHistoryGrid {
        resolution,
        x,
        y,
        width,
        height,
        updates,
        cells,
    })
}
