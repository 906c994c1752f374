use serde::Serialize;
use thiserror::Error;

/// Main error type for sheet2sql.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum Sheet2SqlError {
    #[error("{message}: {source}")]
    WithContextError {
        message: String,
        source: Box<Sheet2SqlError>,
    },

    /// Workbook yields nothing to convert
    #[error("Empty input: {0}")]
    EmptyInputError(String),

    /// Strict mode refused to fall back to text
    #[error("Ambiguous type for column '{column}' of table '{table}': found {classes}")]
    AmbiguousTypeError {
        table: String,
        column: String,
        classes: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    // Third-party library errors
    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    CfbError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    Biff8Error(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    // Database module errors
    #[error("{0}")]
    RangeError(#[from] crate::database::range::RangeError),

    #[error("{0}")]
    ColumnError(#[from] crate::database::column::ColumnError),

    #[error("{0}")]
    DdlError(#[from] crate::database::ddl::DdlError),
}

/// Coarse classification of [`Sheet2SqlError`] for callers that only need to
/// decide how to present a failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unreadable, corrupt or unsupported input; fatal
    Format,
    /// Nothing to convert; the caller decides whether that is a failure
    EmptyInput,
    /// Strict mode rejected a text fallback
    AmbiguousType,
    /// Rejected configuration
    Config,
    /// Failure reading or writing files around the engine
    Io,
}

impl Sheet2SqlError {
    /// Returns the kind of this error, looking through any added context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WithContextError { source, .. } => source.kind(),
            Self::EmptyInputError(_) => ErrorKind::EmptyInput,
            Self::AmbiguousTypeError { .. } => ErrorKind::AmbiguousType,
            Self::ConfigError(_) | Self::PatternError(_) | Self::JsonError(_) | Self::RangeError(_) => ErrorKind::Config,
            Self::IoError(_) => ErrorKind::Io,
            Self::SpreadsheetError(error) if error.is_empty_input() => ErrorKind::EmptyInput,
            Self::ParseIntError(_)
            | Self::ZipError(_)
            | Self::XmlError(_)
            | Self::XmlEncodingError(_)
            | Self::XmlAttributeError(_)
            | Self::XmlHelperError(_)
            | Self::CfbError(_)
            | Self::Biff8Error(_)
            | Self::SpreadsheetError(_)
            | Self::XlsError(_)
            | Self::ColumnError(_)
            | Self::DdlError(_) => ErrorKind::Format,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, Sheet2SqlError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| Sheet2SqlError::WithContextError {
            message: message.to_owned(),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::SpreadsheetError;

    #[test]
    fn kind_survives_context() {
        let result: Result<(), Sheet2SqlError> = Err(Sheet2SqlError::EmptyInputError("no sheets".to_owned()));
        let error = result.with_prefix("book.xlsx").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EmptyInput);
        assert_eq!(error.to_string(), "book.xlsx: Empty input: no sheets");
    }

    #[test]
    fn kind_of_spreadsheet_errors() {
        let error = Sheet2SqlError::from(SpreadsheetError::UnknownContainerError);
        assert_eq!(error.kind(), ErrorKind::Format);
        let error = Sheet2SqlError::from(SpreadsheetError::SpreadsheetEmptyError);
        assert_eq!(error.kind(), ErrorKind::EmptyInput);
    }
}
