use std::fmt;

#[derive(Debug)]
pub enum CardPressError {
    Configuration(String),
    AssetMissing(String),
    FontUnavailable(String),
    BarcodeEngine(String),
    PartialRender(String),
    ArtifactWrite(String),
    Io(std::io::Error),
}

impl fmt::Display for CardPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardPressError::Configuration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            CardPressError::AssetMissing(message) => write!(f, "asset missing: {}", message),
            CardPressError::FontUnavailable(message) => {
                write!(f, "font unavailable: {}", message)
            }
            CardPressError::BarcodeEngine(message) => {
                write!(f, "barcode engine: {}", message)
            }
            CardPressError::PartialRender(message) => {
                write!(f, "partial render: {}", message)
            }
            CardPressError::ArtifactWrite(message) => {
                write!(f, "artifact write failed: {}", message)
            }
            CardPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CardPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CardPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CardPressError {
    fn from(value: std::io::Error) -> Self {
        CardPressError::Io(value)
    }
}
