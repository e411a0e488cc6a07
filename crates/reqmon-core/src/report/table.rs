//! Sortable tables with alternating rows

use std::fmt::Write;

use super::writeln;
use crate::error::Result;

/// Writes the opening, row separators and closing of a sortable table.
///
/// Header cells are written between [`HtmlTable::begin_table`] and the first
/// [`HtmlTable::next_row`]; each `next_row` opens a body row.
#[derive(Debug)]
pub struct HtmlTable {
    first_row: bool,
    odd_row: bool,
}

impl Default for HtmlTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlTable {
    /// Create a table writer
    pub fn new() -> Self {
        Self {
            first_row: true,
            odd_row: false,
        }
    }

    /// Open the table and its header row
    pub fn begin_table(&mut self, out: &mut impl Write, summary: &str) -> Result<()> {
        self.first_row = true;
        self.odd_row = false;
        writeln(
            out,
            &format!(
                "<table class='sortable' width='100%' border='1' summary='{}'>",
                super::html_encode_but_not_space(summary)
            ),
        )?;
        out.write_str("<thead><tr>")?;
        Ok(())
    }

    /// Close the current row and open the next one
    pub fn next_row(&mut self, out: &mut impl Write) -> Result<()> {
        writeln(out, "</tr>")?;
        if self.first_row {
            self.first_row = false;
            writeln(out, "</thead><tbody>")?;
        }
        self.odd_row = !self.odd_row;
        out.write_str(if self.odd_row {
            "<tr class='odd'>"
        } else {
            "<tr class='even'>"
        })?;
        Ok(())
    }

    /// Close the last row and the table
    pub fn end_table(&mut self, out: &mut impl Write) -> Result<()> {
        writeln(out, "</tr>")?;
        if self.first_row {
            writeln(out, "</thead><tbody>")?;
        }
        writeln(out, "</tbody></table>")
    }
}
