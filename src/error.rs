use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("no repository root; pass --root or set storage.root")]
    NoRoot,
    #[display("failed to initialise logging")]
    Logging,
    #[display("storage error")]
    Storage,
    /// The job could not start, or a single-version command failed.
    #[display("{_0} failed")]
    Job(#[error(not(source))] &'static str),
}
