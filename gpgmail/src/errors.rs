/// Failures that map to a dedicated exit status.
///
/// Anything else that goes wrong is reported with status 1.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// No recipient was given to "gpgmail compose".
    #[error("Recipient is mandatory.")]
    MissingRecipient,

    /// The payload could not be encrypted for the recipient (untrusted,
    /// expired, revoked, or no encryption-capable key).
    #[error("Unable to encrypt for the recipient")]
    CannotEncrypt,

    /// Missing required argument.
    #[error("Missing required argument")]
    MissingArg,

    /// Invalid data type (no secret key where one is expected, etc).
    #[error("Invalid data type")]
    BadData,

    /// Output file already exists.
    #[error("Output file already exists")]
    OutputExists,

    /// Input file does not exist.
    #[error("Input file does not exist")]
    MissingInput,

    /// A secret key is protected with a password, and it could not be
    /// unlocked.
    #[error("A secret key is protected with a password")]
    KeyIsProtected,

    /// The SMTP server refused the message or could not be reached.
    #[error("Mail delivery failed")]
    DeliveryFailed,

    /// The configuration file is missing or malformed.
    #[error("Bad configuration")]
    BadConfig,
}

impl From<Error> for i32 {
    fn from(e: Error) -> Self {
        use Error::*;
        match e {
            MissingRecipient => 1,
            CannotEncrypt => 2,
            MissingArg => 19,
            BadData => 41,
            OutputExists => 59,
            MissingInput => 61,
            KeyIsProtected => 67,
            DeliveryFailed => 75,
            BadConfig => 78,
        }
    }
}

/// Returns the exit status for the given error.
///
/// The outermost [`Error`], be it a context or a cause, decides; if
/// there is none, the status is 1.
pub fn exit_status(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<Error>()))
        .cloned()
        .map(Into::into)
        .unwrap_or(1)
}

/// Prints the error and causes, if any.
pub fn print_error_chain(err: &anyhow::Error) {
    eprintln!("           {}", err);
    err.chain().skip(1).for_each(|cause| eprintln!("  because: {}", cause));
}
