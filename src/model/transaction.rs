use crate::error::Res;
use crate::model::Amount;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The canonical exported transaction.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub(crate) id: String,
    pub(crate) description: String,
    pub(crate) amount: Amount,
    pub(crate) category: String,
    pub(crate) date: NaiveDate,
    /// Only manually-added rows carry this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) who: Option<String>,
}

/// The value of a record without its identity, used for full-value deduplication.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ValueKey {
    description: String,
    amount: Decimal,
    category: String,
    date: NaiveDate,
}

impl TransactionRecord {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        amount: Amount,
        category: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            amount,
            category: category.into(),
            date,
            who: None,
        }
    }

    pub fn with_who(mut self, who: impl Into<String>) -> Self {
        self.who = Some(who.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn who(&self) -> Option<&str> {
        self.who.as_deref()
    }

    pub fn value_key(&self) -> ValueKey {
        ValueKey {
            description: self.description.trim().to_lowercase(),
            amount: self.amount.value().normalize(),
            category: self.category.trim().to_lowercase(),
            date: self.date,
        }
    }

    /// Produces the row in canonical column order. The `who` column is only emitted when the
    /// record has one.
    pub fn to_row(&self, date_format: &str) -> Vec<String> {
        let mut row = vec![
            self.id.clone(),
            self.description.clone(),
            self.amount.to_string(),
            self.category.clone(),
            self.date.format(date_format).to_string(),
        ];
        if let Some(who) = &self.who {
            row.push(who.clone());
        }
        row
    }

    /// Parses a row in canonical column order, as written by `to_row`. Dates in ISO format are
    /// accepted as well as `date_format`.
    pub fn from_row<S>(row: &[S], date_format: &str) -> Res<Self>
    where
        S: AsRef<str>,
    {
        let field = |column: Column| row.get(column.index()).map(|s| s.as_ref().trim());
        let id = match field(Column::Id) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => bail!("Row has no id"),
        };
        let amount_str = field(Column::Amount).context("Row has no amount")?;
        let amount = Amount::from_str(amount_str)?;
        let date_str = field(Column::Date).context("Row has no date")?;
        let date = NaiveDate::parse_from_str(date_str, date_format)
            .or_else(|_| NaiveDate::from_str(date_str))
            .with_context(|| format!("Invalid date '{date_str}'"))?;
        let who = field(Column::Who)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Self {
            id,
            description: field(Column::Description).unwrap_or_default().to_string(),
            amount,
            category: field(Column::Category).unwrap_or_default().to_string(),
            date,
            who,
        })
    }
}

/// The columns of an export, in canonical order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Description,
    Amount,
    Category,
    Date,
    Who,
}

serde_plain::derive_display_from_serialize!(Column);
serde_plain::derive_fromstr_from_deserialize!(Column);

/// The columns written for database-sourced records.
pub const COLUMNS: [Column; 5] = [
    Column::Id,
    Column::Description,
    Column::Amount,
    Column::Category,
    Column::Date,
];

impl Column {
    pub fn index(&self) -> usize {
        match self {
            Column::Id => 0,
            Column::Description => 1,
            Column::Amount => 2,
            Column::Category => 3,
            Column::Date => 4,
            Column::Who => 5,
        }
    }
}

/// The canonical header row.
pub fn header() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Returns true if `row` is a header row rather than data.
pub fn is_header<S>(row: &[S]) -> bool
where
    S: AsRef<str>,
{
    row.first()
        .map(|s| s.as_ref().trim().eq_ignore_ascii_case(&Column::Id.to_string()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISO: &str = "%Y-%m-%d";

    fn record() -> TransactionRecord {
        TransactionRecord::new(
            "42",
            "Biedronka",
            Amount::from_str("-23.5").unwrap(),
            "spożywcze",
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        )
    }

    #[test]
    fn test_to_row() {
        assert_eq!(
            record().to_row(ISO),
            vec!["42", "Biedronka", "-23,50", "spożywcze", "2025-03-14"]
        );
        assert_eq!(record().to_row("%d.%m.%Y")[4], "14.03.2025");
    }

    #[test]
    fn test_to_row_with_who() {
        let row = record().with_who("Ola").to_row(ISO);
        assert_eq!(row.len(), 6);
        assert_eq!(row[5], "Ola");
    }

    #[test]
    fn test_from_row_round_trip() {
        let original = record().with_who("Ola");
        let parsed = TransactionRecord::from_row(&original.to_row("%d.%m.%Y"), "%d.%m.%Y").unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_row_accepts_iso_date_fallback() {
        let row = ["1", "x", "1,00", "inne", "2025-01-02"];
        let parsed = TransactionRecord::from_row(&row, "%d.%m.%Y").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(parsed.who(), None);
    }

    #[test]
    fn test_from_row_errors() {
        assert!(TransactionRecord::from_row(&["", "x", "1", "c", "2025-01-01"], ISO).is_err());
        assert!(TransactionRecord::from_row(&["1", "x"], ISO).is_err());
        assert!(TransactionRecord::from_row(&["1", "x", "abc", "c", "2025-01-01"], ISO).is_err());
        assert!(TransactionRecord::from_row(&["1", "x", "1", "c", "yesterday"], ISO).is_err());
    }

    #[test]
    fn test_value_key_ignores_id_case_and_amount_scale() {
        let a = record();
        let mut b = record();
        b.id = "other".to_string();
        b.description = " BIEDRONKA ".to_string();
        b.amount = Amount::from_str("-23,500").unwrap();
        assert_eq!(a.value_key(), b.value_key());
    }

    #[test]
    fn test_header() {
        assert_eq!(header(), vec!["id", "description", "amount", "category", "date"]);
        assert!(is_header(&header()));
        assert!(is_header(&["ID", "opis"]));
        assert!(!is_header(&record().to_row(ISO)));
    }
}
