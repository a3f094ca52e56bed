use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;

/// File formats a work can be archived in.
///
/// Stored in the database as the lowercase string, which is also the wire
/// form clients submit.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkFormat {
    #[display("pdf")]
    Pdf,
    #[display("epub")]
    Epub,
    #[display("azw3")]
    Azw3,
    #[display("mobi")]
    Mobi,
    #[display("html")]
    Html,
    #[display("txt")]
    Txt,
}

impl WorkFormat {
    /// All accepted formats, in the order they're listed to clients.
    pub const ALL: [WorkFormat; 6] = [
        WorkFormat::Pdf,
        WorkFormat::Epub,
        WorkFormat::Azw3,
        WorkFormat::Mobi,
        WorkFormat::Html,
        WorkFormat::Txt,
    ];

    /// The lowercase string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Azw3 => "azw3",
            Self::Mobi => "mobi",
            Self::Html => "html",
            Self::Txt => "txt",
        }
    }

    /// Content type used when serving stored bytes of this format.
    pub fn mimetype(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Epub => "application/epub+zip",
            Self::Azw3 => "application/vnd.amazon.ebook",
            Self::Mobi => "application/x-mobipocket-ebook",
            Self::Html => "text/html",
            Self::Txt => "text/plain",
        }
    }
}

impl FromStr for WorkFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "epub" => Ok(Self::Epub),
            "azw3" => Ok(Self::Azw3),
            "mobi" => Ok(Self::Mobi),
            "html" => Ok(Self::Html),
            "txt" => Ok(Self::Txt),
            _ => Err(ErrorKind::InvalidData("file format").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pdf", WorkFormat::Pdf)]
    #[case("epub", WorkFormat::Epub)]
    #[case("azw3", WorkFormat::Azw3)]
    #[case("mobi", WorkFormat::Mobi)]
    #[case("html", WorkFormat::Html)]
    #[case("txt", WorkFormat::Txt)]
    fn test_parse_roundtrip(#[case] input: &str, #[case] expected: WorkFormat) {
        let format: WorkFormat = input.parse().unwrap();
        assert_eq!(format, expected);
        assert_eq!(format.as_str(), input);
        assert_eq!(format.to_string(), input);
    }

    #[rstest]
    #[case("PDF")]
    #[case("doc")]
    #[case("")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<WorkFormat>().is_err());
    }

    #[test]
    fn test_every_format_has_a_mimetype() {
        for format in WorkFormat::ALL {
            assert!(format.mimetype().contains('/'));
        }
    }
}
