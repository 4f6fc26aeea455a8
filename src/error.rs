use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Why a command could not complete. Failures of single pages or sections
/// are not errors here; they are reported and the command still succeeds.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("authentication failed")]
    Auth,
    #[display("request to Microsoft Graph failed")]
    Remote,
    #[display("no site matches `{_0}`")]
    NoSite(#[error(not(source))] String),
    #[display("notebook `{_0}` not found on this site")]
    NoNotebook(#[error(not(source))] String),
    #[display("sync aborted")]
    Sync,
}
