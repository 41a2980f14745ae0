/*
 *  lcd/text.rs
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 *
 *  Fitting free text into fixed width character rows
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fmt;

use unicode_normalization::UnicodeNormalization;

/// Maximum characters per line
pub const LCD_WIDTH: usize = 16;

/// Lines on the panel
pub const LCD_ROWS: usize = 2;

/// Exactly one row of display content: 16 printable ASCII cells
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Row([u8; LCD_WIDTH]);

impl Row {
    pub const fn blank() -> Self {
        Row([b' '; LCD_WIDTH])
    }

    /// Decompose accents (NFKD), drop what the character ROM cannot show,
    /// keep the first 16 cells and pad the rest with spaces
    pub fn fit(raw: &str) -> Self {
        let mut cells = [b' '; LCD_WIDTH];
        let printable = raw
            .strip_suffix('\r')
            .unwrap_or(raw)
            .nfkd()
            .filter(|c| is_printable(*c))
            .take(LCD_WIDTH);
        for (cell, c) in cells.iter_mut().zip(printable) {
            *cell = c as u8;
        }
        Row(cells)
    }

    pub fn as_bytes(&self) -> &[u8; LCD_WIDTH] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // only printable ASCII ever lands in the cells
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row({:?})", self.as_str())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for Row {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[inline]
fn is_printable(c: char) -> bool {
    (' '..='~').contains(&c)
}

/// A render request split into panel rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// At most [`LCD_ROWS`] fitted rows, top first
    pub rows: Vec<Row>,
    /// Newline separated segments past the last panel row
    pub overflow: usize,
}

impl Layout {
    pub fn from_text(text: &str) -> Self {
        let mut rows = Vec::with_capacity(LCD_ROWS);
        let mut overflow = 0;
        for segment in text.split('\n') {
            if rows.len() < LCD_ROWS {
                rows.push(Row::fit(segment));
            } else {
                overflow += 1;
            }
        }
        Layout { rows, overflow }
    }

    /// Total segments in the request, shown or not
    pub fn segments(&self) -> usize {
        self.rows.len() + self.overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_pads_short_text() {
        for k in 0..=LCD_WIDTH {
            let text: String = "abcdefghijklmnop".chars().take(k).collect();
            let row = Row::fit(&text);
            assert_eq!(row.as_str().len(), LCD_WIDTH);
            assert_eq!(&row.as_str()[..k], text);
            assert!(row.as_str()[k..].chars().all(|c| c == ' '));
        }
    }

    #[test]
    fn test_row_truncates_long_text() {
        let row = Row::fit("0123456789abcdefXYZ");
        assert_eq!(row, "0123456789abcdef");
    }

    #[test]
    fn test_row_strips_unprintable() {
        let row = Row::fit("caf\u{e9}\tbar\u{7f}");
        assert_eq!(row, "cafebar         ");
    }

    #[test]
    fn test_row_folds_accents() {
        assert_eq!(Row::fit("Caf\u{e9} Z\u{fc}rich"), "Cafe Zurich     ");
        // compatibility forms fold too; wide glyphs with no ASCII form vanish
        assert_eq!(Row::fit("\u{fb01}ne \u{2460} \u{65e5}"), "fine 1          ");
    }

    #[test]
    fn test_row_drops_carriage_return() {
        assert_eq!(Row::fit("line\r"), "line            ");
    }

    #[test]
    fn test_layout_two_rows() {
        let layout = Layout::from_text("Hello\nWorld");
        assert_eq!(layout.rows, vec![Row::fit("Hello"), Row::fit("World")]);
        assert_eq!(layout.overflow, 0);
    }

    #[test]
    fn test_layout_single_row() {
        let layout = Layout::from_text("only");
        assert_eq!(layout.rows.len(), 1);
        assert_eq!(layout.segments(), 1);
    }

    #[test]
    fn test_layout_overflow_counted() {
        let layout = Layout::from_text("a\nb\nc\nd");
        assert_eq!(layout.rows.len(), 2);
        assert_eq!(layout.overflow, 2);
        assert_eq!(layout.segments(), 4);
    }

    #[test]
    fn test_blank_row() {
        assert_eq!(Row::blank(), "                ");
        assert_eq!(Row::fit(""), Row::blank());
    }
}
