/// Command-line parser for gpgmail.

use clap::{App, Arg, SubCommand, AppSettings};

pub fn build() -> App<'static, 'static> {
    configure(App::new("gpgmail"))
}

/// Defines the CLI.
///
/// The order of top-level subcommands is:
///
///   - Composing mail                      (1xx)
///   - Key management                      (3xx)
pub fn configure(app: App<'static, 'static>) -> App<'static, 'static> {
    app
        .version(env!("CARGO_PKG_VERSION"))
        .about("Composes OpenPGP encrypted or signed mail, and optionally \
                sends it using SMTP.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(Arg::with_name("env")
             .short("e").long("env").value_name("DIR")
             .global(true)
             .help("The path to the key store directory, where the keys \
                    are stored [default: ./gpgenv]"))
        .arg(Arg::with_name("config")
             .short("c").long("config").value_name("FILE")
             .env("GPGMAIL_CONFIG")
             .global(true)
             .help("Reads settings from this JSON file"))
        .arg(Arg::with_name("force")
             .long("force")
             .global(true)
             .help("Overwrite existing files"))

        .subcommand(SubCommand::with_name("compose")
                    .display_order(100)
                    .about("Composes an encrypted or signed mail")
                    .arg(Arg::with_name("attachment")
                         .short("f").long("file").value_name("FILE")
                         .alias("send")
                         .multiple(true).number_of_values(1)
                         .help("The file to add as an attachment \
                                (can be given multiple times)"))
                    .arg(Arg::with_name("recipient")
                         .short("d").long("dest").value_name("RECIPIENT")
                         .alias("email-to")
                         .help("The recipient to encrypt for, can use a \
                                key identifier"))
                    .arg(Arg::with_name("subject")
                         .short("s").long("subject").value_name("TEXT")
                         .help("The email subject [default: No subject]"))
                    .arg(Arg::with_name("message")
                         .short("m").long("message").value_name("TEXT")
                         .conflicts_with("message-file")
                         .help("The text message"))
                    .arg(Arg::with_name("message-file")
                         .long("message-file").value_name("FILE")
                         .help("Reads the text message from FILE, \
                                or stdin if FILE is '-'"))
                    .arg(Arg::with_name("trust")
                         .short("t").long("trust")
                         .help("Trust recipient key, regardless of actual \
                                trust level"))
                    .arg(Arg::with_name("signer")
                         .long("signer").value_name("KEY")
                         .help("Signs the mail with this secret key from \
                                the key store"))
                    .arg(Arg::with_name("sign-only")
                         .long("sign-only")
                         .help("Signs the mail without encrypting it"))
                    .arg(Arg::with_name("passphrase-file")
                         .long("passphrase-file").value_name("FILE")
                         .help("Reads the passphrase of the signing key \
                                from FILE"))
                    .arg(Arg::with_name("from")
                         .long("from").value_name("ADDRESS")
                         .help("The sender's address"))
                    .arg(Arg::with_name("autocrypt")
                         .long("autocrypt")
                         .help("Adds an Autocrypt header with the signer's \
                                certificate (requires --from and a signer)"))
                    .arg(Arg::with_name("output")
                         .short("o").long("output").value_name("FILE")
                         .conflicts_with("smtp")
                         .help("Writes the mail to FILE instead of stdout"))
                    .arg(Arg::with_name("smtp")
                         .long("smtp")
                         .help("Sends the mail using the SMTP settings from \
                                the configuration file"))
        )

        .subcommand(SubCommand::with_name("list")
                    .display_order(300)
                    .about("Lists keys in the key store"))

        .subcommand(SubCommand::with_name("import")
                    .display_order(310)
                    .about("Imports keys into the key store")
                    .arg(Arg::with_name("input")
                         .value_name("FILE")
                         .required(true)
                         .multiple(true)
                         .help("The key files to import")))

        .subcommand(SubCommand::with_name("certify")
                    .display_order(320)
                    .about("Marks a key as trusted by certifying it")
                    .arg(Arg::with_name("certificate")
                         .value_name("KEY")
                         .required(true)
                         .help("The key to certify"))
                    .arg(Arg::with_name("certifier")
                         .long("certifier").value_name("KEY")
                         .help("The secret key to certify with \
                                [default: the only secret key in the store]"))
                    .arg(Arg::with_name("userid")
                         .long("userid").value_name("USERID")
                         .help("Certifies only this User ID \
                                [default: all valid User IDs]"))
                    .arg(Arg::with_name("passphrase-file")
                         .long("passphrase-file").value_name("FILE")
                         .help("Reads the passphrase of the certifying key \
                                from FILE")))
}
