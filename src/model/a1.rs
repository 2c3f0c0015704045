use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A spreadsheet range in A1 notation, e.g. `Transakcje!A1:E` or `'My Sheet'!B10:G20`.
///
/// A range without a start row (`Sheet!A:E`) starts at row 1. A range without an end row is open
/// towards the bottom of the sheet.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct A1Range {
    sheet: String,
    start_col: u32,
    start_row: u32,
    end_col: Option<u32>,
    end_row: Option<u32>,
}

impl A1Range {
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// The 1-based row where the range starts.
    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    /// The 1-based column where the range starts.
    pub fn start_col(&self) -> u32 {
        self.start_col
    }

    pub fn end_col(&self) -> Option<u32> {
        self.end_col
    }

    pub fn end_row(&self) -> Option<u32> {
        self.end_row
    }

    /// Returns a closed range covering `count` rows starting at `first_row`, `width` columns wide
    /// when the range has no explicit end column.
    pub fn rows(&self, first_row: u32, count: u32, width: u32) -> anyhow::Result<A1Range> {
        let end_col = match self.end_col {
            Some(col) => col,
            None => self
                .start_col
                .checked_add(width.max(1) - 1)
                .context("The range is too wide")?,
        };
        let end_row = first_row
            .checked_add(count.max(1) - 1)
            .with_context(|| format!("{count} rows starting at row {first_row} do not fit a sheet"))?;
        Ok(A1Range {
            sheet: self.sheet.clone(),
            start_col: self.start_col,
            start_row: first_row,
            end_col: Some(end_col),
            end_row: Some(end_row),
        })
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self
            .sheet
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
        {
            write!(f, "{}!", self.sheet)?;
        } else {
            write!(f, "'{}'!", self.sheet.replace('\'', "''"))?;
        }
        write!(f, "{}{}", col_name(self.start_col), self.start_row)?;
        if let Some(end_col) = self.end_col {
            write!(f, ":{}", col_name(end_col))?;
            if let Some(end_row) = self.end_row {
                write!(f, "{end_row}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for A1Range {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sheet, cells) = s
            .rsplit_once('!')
            .with_context(|| format!("A1 range must look like 'Sheet!A1:E', got: {s}"))?;
        let sheet = match sheet.strip_prefix('\'').and_then(|x| x.strip_suffix('\'')) {
            Some(quoted) => quoted.replace("''", "'"),
            None => sheet.to_string(),
        };
        if sheet.is_empty() {
            bail!("A1 range is missing a sheet name: {s}");
        }

        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };
        let (start_col, start_row) = parse_cell(start)
            .with_context(|| format!("Invalid start cell in A1 range: {s}"))?;
        let (end_col, end_row) = match end {
            Some(end) => {
                let (col, row) = parse_cell(end)
                    .with_context(|| format!("Invalid end cell in A1 range: {s}"))?;
                (Some(col), row)
            }
            None => (None, None),
        };

        let start_row = start_row.unwrap_or(1);
        if let Some(end_col) = end_col {
            if end_col < start_col {
                bail!("A1 range ends before it starts: {s}");
            }
        }
        if let Some(end_row) = end_row {
            if end_row < start_row {
                bail!("A1 range ends before it starts: {s}");
            }
        }

        Ok(Self {
            sheet,
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }
}

impl Serialize for A1Range {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for A1Range {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        A1Range::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Parses `B10` into `(2, Some(10))` and `B` into `(2, None)`.
fn parse_cell(cell: &str) -> anyhow::Result<(u32, Option<u32>)> {
    let cell = cell.trim();
    let split = cell
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() {
        bail!("Missing column letters in '{cell}'");
    }
    let col = letters
        .chars()
        .try_fold(0u32, |acc, c| {
            acc.checked_mul(26)?
                .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
        })
        .with_context(|| format!("Column '{letters}' is out of range"))?;
    let row = if digits.is_empty() {
        None
    } else {
        let row: u32 = digits
            .parse()
            .with_context(|| format!("Invalid row number in '{cell}'"))?;
        if row == 0 {
            bail!("Row numbers start at 1 in '{cell}'");
        }
        Some(row)
    };
    Ok((col, row))
}

/// Converts a 1-based column index to its letters, e.g. 28 -> `AB`.
fn col_name(mut col: u32) -> String {
    let mut name = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        name.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    name.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_range() {
        let range: A1Range = "Sheet1!B10:G".parse().unwrap();
        assert_eq!(range.sheet(), "Sheet1");
        assert_eq!(range.start_row(), 10);
        assert_eq!(range.to_string(), "Sheet1!B10:G");
    }

    #[test]
    fn test_parse_quoted_sheet() {
        let range: A1Range = "'Moje ''wydatki'''!A1:E20".parse().unwrap();
        assert_eq!(range.sheet(), "Moje 'wydatki'");
        assert_eq!(range.to_string(), "'Moje ''wydatki'''!A1:E20");
    }

    #[test]
    fn test_parse_column_only_range_starts_at_row_one() {
        let range: A1Range = "Data!A:E".parse().unwrap();
        assert_eq!(range.start_row(), 1);
        assert_eq!(range.to_string(), "Data!A1:E");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("A1:E".parse::<A1Range>().is_err()); // no sheet
        assert!("!A1:E".parse::<A1Range>().is_err()); // empty sheet
        assert!("S!11:E".parse::<A1Range>().is_err()); // no column letters
        assert!("S!E1:A".parse::<A1Range>().is_err()); // backwards
        assert!("S!A0".parse::<A1Range>().is_err()); // row zero
    }

    #[test]
    fn test_rows() {
        let range: A1Range = "Transakcje!A1:E".parse().unwrap();
        assert_eq!(range.rows(7, 3, 5).unwrap().to_string(), "Transakcje!A7:E9");
    }

    #[test]
    fn test_rows_without_end_column_uses_width() {
        let range: A1Range = "T!B2".parse().unwrap();
        assert_eq!(range.rows(4, 1, 5).unwrap().to_string(), "T!B4:F4");
    }

    #[test]
    fn test_rows_past_the_last_row_is_error() {
        let range: A1Range = "Transakcje!A1:E".parse().unwrap();
        assert!(range.rows(u32::MAX, 2, 5).is_err());
        assert_eq!(
            range.rows(u32::MAX, 1, 5).unwrap().end_row(),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_parse_huge_column_is_error() {
        let err = "S!AAAAAAAA1".parse::<A1Range>().unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));
    }

    #[test]
    fn test_col_name() {
        assert_eq!(col_name(1), "A");
        assert_eq!(col_name(26), "Z");
        assert_eq!(col_name(27), "AA");
        assert_eq!(col_name(28), "AB");
        assert_eq!(col_name(702), "ZZ");
    }

    #[test]
    fn test_serde() {
        let range: A1Range = serde_json::from_str(r#""Sheet1!A1:E""#).unwrap();
        assert_eq!(serde_json::to_string(&range).unwrap(), r#""Sheet1!A1:E""#);
    }
}
