extern crate anyhow;
extern crate std;

pub type EtaResult<T> = anyhow::Result<T>;

#[derive(Debug, PartialEq)]
pub enum EtaError {
    NoData,
    UnrecognizedFormat(String),
    HttpError(u16),
}

impl std::fmt::Display for EtaError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            EtaError::NoData => {
                return write!(f, "No usable arrival data");
            },
            EtaError::UnrecognizedFormat(ref text) => {
                return write!(f, "Unrecognized time text: '{}'", text);
            },
            EtaError::HttpError(status) => {
                return write!(f, "HTTP Error: status {}", status);
            },
        }
    }
}

impl std::error::Error for EtaError {}

pub fn make_error(msg: &str) -> anyhow::Error {
    return anyhow::anyhow!("{}", msg);
}
