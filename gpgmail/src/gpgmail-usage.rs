//! Composes OpenPGP encrypted or signed mail.
//!
//! # Usage
//!
//! ```text
//! Composes OpenPGP encrypted or signed mail, and optionally sends it using SMTP.
//!
//! USAGE:
//!     gpgmail [FLAGS] [OPTIONS] <SUBCOMMAND>
//!
//! FLAGS:
//!         --force      Overwrite existing files
//!     -h, --help       Prints help information
//!     -V, --version    Prints version information
//!
//! OPTIONS:
//!     -c, --config <FILE>    Reads settings from this JSON file [env:
//!                            GPGMAIL_CONFIG=]
//!     -e, --env <DIR>        The path to the key store directory, where the keys
//!                            are stored [default: ./gpgenv]
//!
//! SUBCOMMANDS:
//!     compose    Composes an encrypted or signed mail
//!     list       Lists keys in the key store
//!     import     Imports keys into the key store
//!     certify    Marks a key as trusted by certifying it
//!     help       Prints this message or the help of the given subcommand(s)
//! ```
//!
//! ## Subcommand compose
//!
//! ```text
//! Composes an encrypted or signed mail
//!
//! USAGE:
//!     gpgmail compose [FLAGS] [OPTIONS]
//!
//! FLAGS:
//!         --autocrypt    Adds an Autocrypt header with the signer's certificate
//!                        (requires --from and a signer)
//!         --force        Overwrite existing files
//!     -h, --help         Prints help information
//!         --sign-only    Signs the mail without encrypting it
//!         --smtp         Sends the mail using the SMTP settings from the
//!                        configuration file
//!     -t, --trust        Trust recipient key, regardless of actual trust level
//!
//! OPTIONS:
//!     -f, --file <FILE>...
//!             The file to add as an attachment (can be given multiple times)
//!
//!     -c, --config <FILE>
//!             Reads settings from this JSON file [env: GPGMAIL_CONFIG=]
//!
//!     -e, --env <DIR>
//!             The path to the key store directory, where the keys are stored
//!             [default: ./gpgenv]
//!         --from <ADDRESS>            The sender's address
//!     -m, --message <TEXT>            The text message
//!         --message-file <FILE>
//!             Reads the text message from FILE, or stdin if FILE is '-'
//!
//!     -o, --output <FILE>             Writes the mail to FILE instead of stdout
//!         --passphrase-file <FILE>
//!             Reads the passphrase of the signing key from FILE
//!
//!     -d, --dest <RECIPIENT>
//!             The recipient to encrypt for, can use a key identifier
//!
//!         --signer <KEY>
//!             Signs the mail with this secret key from the key store
//!
//!     -s, --subject <TEXT>            The email subject [default: No subject]
//! ```
//!
//! ## Subcommand list
//!
//! ```text
//! Lists keys in the key store
//!
//! USAGE:
//!     gpgmail list [FLAGS] [OPTIONS]
//!
//! FLAGS:
//!         --force    Overwrite existing files
//!     -h, --help     Prints help information
//!
//! OPTIONS:
//!     -c, --config <FILE>    Reads settings from this JSON file [env:
//!                            GPGMAIL_CONFIG=]
//!     -e, --env <DIR>        The path to the key store directory, where the keys
//!                            are stored [default: ./gpgenv]
//! ```
//!
//! ## Subcommand import
//!
//! ```text
//! Imports keys into the key store
//!
//! USAGE:
//!     gpgmail import [FLAGS] [OPTIONS] <FILE>...
//!
//! FLAGS:
//!         --force    Overwrite existing files
//!     -h, --help     Prints help information
//!
//! OPTIONS:
//!     -c, --config <FILE>    Reads settings from this JSON file [env:
//!                            GPGMAIL_CONFIG=]
//!     -e, --env <DIR>        The path to the key store directory, where the keys
//!                            are stored [default: ./gpgenv]
//!
//! ARGS:
//!     <FILE>...    The key files to import
//! ```
//!
//! ## Subcommand certify
//!
//! ```text
//! Marks a key as trusted by certifying it
//!
//! USAGE:
//!     gpgmail certify [FLAGS] [OPTIONS] <KEY>
//!
//! FLAGS:
//!         --force    Overwrite existing files
//!     -h, --help     Prints help information
//!
//! OPTIONS:
//!         --certifier <KEY>
//!             The secret key to certify with [default: the only secret key in the
//!             store]
//!     -c, --config <FILE>
//!             Reads settings from this JSON file [env: GPGMAIL_CONFIG=]
//!
//!     -e, --env <DIR>
//!             The path to the key store directory, where the keys are stored
//!             [default: ./gpgenv]
//!         --passphrase-file <FILE>
//!             Reads the passphrase of the certifying key from FILE
//!
//!         --userid <USERID>
//!             Certifies only this User ID [default: all valid User IDs]
//!
//!
//! ARGS:
//!     <KEY>    The key to certify
//! ```

include!("gpgmail.rs");
