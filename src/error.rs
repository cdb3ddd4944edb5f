use std::{error::Error, fmt, io};

/// The result type used in the entire dataset preparation crate.
pub type Result<T> = std::result::Result<T, DatasetErr>;

/// Failures raised by the dataset store, statistics and scaling engines.
///
/// Every variant is terminal for the operation that produced it, nothing is
/// retried internally.
#[derive(Debug)]
pub enum DatasetErr {
    /// The delimited source could not be read.
    Io(io::Error),
    /// A cell is not a decimal number.
    Parse {
        /// Zero-based data row (header excluded).
        row: usize,
        /// Zero-based column.
        column: usize,
        token: String,
    },
    /// A row does not have the same width as the first one.
    Schema {
        row: usize,
        got: usize,
        expected: usize,
    },
    /// A column or row index past the end.
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// The name is already taken by another column.
    DuplicateName { name: String, index: usize },
    /// The row filter matched no rows for this column.
    EmptyColumn { column: usize },
    /// No transform has been fitted for this column.
    NotFitted { column: usize },
    /// The column contents no longer match what the transform expects, e.g.
    /// it was changed after fitting or the transform was already applied.
    StaleTransform { column: usize },
    /// Split ratios are negative, not finite or all zero.
    InvalidSplit(String),
    /// A dataset description could not be decoded.
    Config(String),
}

impl fmt::Display for DatasetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetErr::Io(e) => write!(f, "io error: {e}"),
            DatasetErr::Parse { row, column, token } => {
                write!(f, "row {row}, column {column}: '{token}' is not a number")
            }
            DatasetErr::Schema { row, got, expected } => write!(
                f,
                "row {row} has {got} columns, expected {expected}"
            ),
            DatasetErr::OutOfRange { what, index, len } => {
                write!(f, "{what} index {index} is out of range (len {len})")
            }
            DatasetErr::DuplicateName { name, index } => {
                write!(f, "name '{name}' is already used by column {index}")
            }
            DatasetErr::EmptyColumn { column } => {
                write!(f, "no rows selected for column {column}")
            }
            DatasetErr::NotFitted { column } => {
                write!(f, "no scaling transform fitted for column {column}")
            }
            DatasetErr::StaleTransform { column } => write!(
                f,
                "column {column} does not match the state its transform expects"
            ),
            DatasetErr::InvalidSplit(msg) => write!(f, "invalid split: {msg}"),
            DatasetErr::Config(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for DatasetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DatasetErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DatasetErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for DatasetErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<DatasetErr> for io::Error {
    fn from(value: DatasetErr) -> Self {
        match value {
            DatasetErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_its_position() {
        let err = DatasetErr::Parse {
            row: 2,
            column: 1,
            token: "abc".into(),
        };
        assert_eq!(err.to_string(), "row 2, column 1: 'abc' is not a number");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = DatasetErr::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(err.source().is_some());

        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn domain_errors_map_to_invalid_data() {
        let err: io::Error = DatasetErr::NotFitted { column: 3 }.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
