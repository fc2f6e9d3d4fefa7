use thiserror::Error;

/// Errors produced while loading, building or querying a route.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("route has no coordinates")]
    EmptyRoute,

    #[error("no KML files found in {0}")]
    NoTracks(String),

    #[error("malformed KML coordinate tuple {0:?}")]
    Kml(String),

    #[error("invalid coordinate {value:?} in field `{field}`")]
    Coordinate { field: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    Time(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Http(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
