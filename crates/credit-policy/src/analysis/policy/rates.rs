use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

const BUNDLED_RATE_MODEL: &str = include_str!("../../../data/rate_model.csv");

#[derive(Debug)]
pub enum RateTableError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingScoreColumn,
    InvalidTerm(String),
    InvalidScore { row: usize, value: String },
    InvalidRate { row: usize, value: String },
    UnalignedBracket(u32),
    Empty,
}

impl std::fmt::Display for RateTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateTableError::Io(err) => write!(f, "failed to read rate model: {}", err),
            RateTableError::Csv(err) => write!(f, "invalid rate model CSV data: {}", err),
            RateTableError::MissingScoreColumn => {
                write!(f, "rate model must start with a 'score' column")
            }
            RateTableError::InvalidTerm(value) => {
                write!(f, "rate model column '{}' is not a term count", value)
            }
            RateTableError::InvalidScore { row, value } => {
                write!(f, "row {}: '{}' is not a score bracket", row, value)
            }
            RateTableError::InvalidRate { row, value } => {
                write!(f, "row {}: '{}' is not a rate", row, value)
            }
            RateTableError::UnalignedBracket(score) => {
                write!(f, "score bracket {} is not a multiple of 100", score)
            }
            RateTableError::Empty => write!(f, "rate model has no rows"),
        }
    }
}

impl std::error::Error for RateTableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RateTableError::Io(err) => Some(err),
            RateTableError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RateTableError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RateTableError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Monthly interest rates indexed by score bracket and term.
///
/// Loaded once and read-only afterwards, so a single table can be shared across
/// evaluations behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    brackets: BTreeMap<u32, BTreeMap<u32, f64>>,
}

impl RateTable {
    /// The rate model shipped with the crate.
    pub fn bundled() -> Result<Self, RateTableError> {
        Self::from_reader(BUNDLED_RATE_MODEL.as_bytes())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RateTableError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse a `score,<term>,<term>,...` table with one row per bracket.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RateTableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut columns = headers.iter();
        match columns.next() {
            Some(first) if first.eq_ignore_ascii_case("score") => {}
            _ => return Err(RateTableError::MissingScoreColumn),
        }
        let terms = columns
            .map(|column| {
                column
                    .parse::<u32>()
                    .map_err(|_| RateTableError::InvalidTerm(column.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut brackets = BTreeMap::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = index + 1;
            let raw_score = record.get(0).unwrap_or_default();
            let score = raw_score
                .parse::<u32>()
                .map_err(|_| RateTableError::InvalidScore {
                    row,
                    value: raw_score.to_string(),
                })?;
            if score % 100 != 0 {
                return Err(RateTableError::UnalignedBracket(score));
            }

            let mut rates = BTreeMap::new();
            for (term, raw_rate) in terms.iter().zip(record.iter().skip(1)) {
                if raw_rate.is_empty() {
                    continue;
                }
                let rate = raw_rate
                    .parse::<f64>()
                    .map_err(|_| RateTableError::InvalidRate {
                        row,
                        value: raw_rate.to_string(),
                    })?;
                rates.insert(*term, rate);
            }
            brackets.insert(score, rates);
        }

        if brackets.is_empty() {
            return Err(RateTableError::Empty);
        }

        Ok(Self { brackets })
    }

    pub fn from_rows<I, T>(rows: I) -> Self
    where
        I: IntoIterator<Item = (u32, T)>,
        T: IntoIterator<Item = (u32, f64)>,
    {
        let brackets = rows
            .into_iter()
            .map(|(score, rates)| (score, rates.into_iter().collect()))
            .collect();
        Self { brackets }
    }

    pub fn lowest_bracket(&self) -> Option<u32> {
        self.brackets.keys().next().copied()
    }

    pub fn highest_bracket(&self) -> Option<u32> {
        self.brackets.keys().next_back().copied()
    }

    /// Resolve the row for a score: floor to the hundred, clamp to the top row,
    /// nothing below the bottom row.
    pub fn bracket_for(&self, score: u32) -> Option<u32> {
        let bracket = (score / 100) * 100;
        let lowest = self.lowest_bracket()?;
        let highest = self.highest_bracket()?;
        if bracket < lowest {
            return None;
        }
        Some(bracket.min(highest))
    }

    /// Rates for every valid term at or above `min_term`, keyed by term in ascending order.
    ///
    /// An empty map means no offer is available for this score.
    pub fn lookup(&self, score: u32, min_term: u32, valid_terms: &[u32]) -> BTreeMap<u32, f64> {
        let Some(bracket) = self.bracket_for(score) else {
            return BTreeMap::new();
        };
        let Some(row) = self.brackets.get(&bracket) else {
            return BTreeMap::new();
        };

        valid_terms
            .iter()
            .filter(|term| **term >= min_term)
            .filter_map(|term| row.get(term).map(|rate| (*term, *rate)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TERMS: [u32; 3] = [6, 9, 12];

    fn table() -> RateTable {
        RateTable::from_reader(
            "score,6,9,12\n600,0.08,0.085,0.09\n700,0.07,0.075,0.08\n800,0.06,0.065,0.07\n900,0.05,0.055,0.06\n"
                .as_bytes(),
        )
        .expect("fixture parses")
    }

    #[test]
    fn lookup_respects_minimum_term_and_floors_score() {
        let rates = table().lookup(850, 9, &VALID_TERMS);
        assert_eq!(rates.keys().copied().collect::<Vec<_>>(), vec![9, 12]);
        assert_eq!(rates[&9], 0.065);
        assert_eq!(rates[&12], 0.07);
    }

    #[test]
    fn scores_within_a_hundred_share_a_row() {
        let table = table();
        assert_eq!(table.bracket_for(649), Some(600));
        assert_eq!(table.bracket_for(699), Some(600));
        assert_eq!(table.bracket_for(700), Some(700));
        assert_eq!(
            table.lookup(649, 6, &VALID_TERMS),
            table.lookup(699, 6, &VALID_TERMS)
        );
    }

    #[test]
    fn scores_above_the_top_row_clamp() {
        let table = table();
        assert_eq!(table.bracket_for(1200), Some(900));
        assert_eq!(table.lookup(1200, 12, &VALID_TERMS)[&12], 0.06);
    }

    #[test]
    fn scores_below_the_bottom_row_have_no_rates() {
        let table = table();
        assert_eq!(table.bracket_for(599), None);
        assert!(table.lookup(200, 6, &VALID_TERMS).is_empty());
    }

    #[test]
    fn terms_outside_the_valid_set_are_ignored() {
        let rates = table().lookup(700, 6, &[6, 12]);
        assert_eq!(rates.keys().copied().collect::<Vec<_>>(), vec![6, 12]);
        assert!(table().lookup(700, 13, &VALID_TERMS).is_empty());
    }

    #[test]
    fn bundled_model_loads() {
        let table = RateTable::bundled().expect("bundled model parses");
        assert_eq!(table.lowest_bracket(), Some(600));
        assert_eq!(table.highest_bracket(), Some(900));
    }

    #[test]
    fn rejects_tables_without_score_column() {
        let err = RateTable::from_reader("bracket,6\n600,0.1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RateTableError::MissingScoreColumn));
    }

    #[test]
    fn rejects_unaligned_brackets() {
        let err = RateTable::from_reader("score,6\n650,0.1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RateTableError::UnalignedBracket(650)));
    }

    #[test]
    fn rejects_non_numeric_rates() {
        let err = RateTable::from_reader("score,6\n600,cheap\n".as_bytes()).unwrap_err();
        assert!(matches!(err, RateTableError::InvalidRate { row: 1, .. }));
    }
}
