/// Off-screen drawing surface where every terminal cell holds a 2x4 grid of
/// braille dots (U+2800 to U+28FF).
pub struct BrailleCanvas {
    /// Cells per row
    width: usize,
    /// Rows of cells
    height: usize,
    cells: Vec<u8>,
}

impl BrailleCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0u8; width * height],
        }
    }

    pub fn pixel_width(&self) -> usize {
        self.width * 2
    }

    pub fn pixel_height(&self) -> usize {
        self.height * 4
    }

    /// Dot bits inside one cell:
    /// ```text
    /// 0x01 0x08
    /// 0x02 0x10
    /// 0x04 0x20
    /// 0x40 0x80
    /// ```
    pub fn set_pixel(&mut self, x: i32, y: i32) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        let (cx, cy) = (x / 2, y / 4);
        if cx >= self.width || cy >= self.height {
            return;
        }
        let bit = match (x % 2, y % 4) {
            (0, 3) => 0x40,
            (1, 3) => 0x80,
            (0, row) => 0x01 << row,
            (_, row) => 0x08 << row,
        };
        self.cells[cy * self.width + cx] |= bit;
    }

    /// Bresenham between two dot positions. Both ends are drawn.
    pub fn draw_line(&mut self, from: (i32, i32), to: (i32, i32)) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.set_pixel(x, y);
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// One row of cells as braille characters.
    pub fn row(&self, row: usize) -> String {
        self.cells
            .chunks(self.width.max(1))
            .nth(row)
            .map(|cells| {
                cells
                    .iter()
                    .map(|&bits| char::from_u32(0x2800 + bits as u32).unwrap_or(' '))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.height).map(|row| self.row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_layout() {
        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(0, 0);
        assert_eq!(canvas.row(0), "⠁");
        for x in 0..2 {
            for y in 0..4 {
                canvas.set_pixel(x, y);
            }
        }
        assert_eq!(canvas.row(0), "⣿");
    }

    #[test]
    fn test_diagonal_line_spans_cells() {
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.draw_line((0, 0), (3, 3));
        assert_eq!(canvas.row(0), "⠑⢄");
    }

    #[test]
    fn test_out_of_bounds_is_ignored() {
        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(-1, 0);
        canvas.set_pixel(2, 0);
        canvas.draw_line((-5, -5), (-1, -1));
        assert_eq!(canvas.row(0), "\u{2800}");
        assert_eq!(canvas.row(3), "");
    }
}
