/// A command-line tool composing OpenPGP mail.

use anyhow::Context as _;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use sequoia_openpgp as openpgp;

use openpgp::{
    Result,
};
use crate::openpgp::crypto::Password;
use crate::openpgp::packet::prelude::*;
use crate::openpgp::policy::StandardPolicy as P;

mod gpgmail_cli;
mod commands;
mod config;
mod errors;
mod keystore;

use config::{FileConfig, DEFAULT_GPG_HOME};
use errors::{Error, print_error_chain};
use keystore::KeyStore;

fn create_or_stdout(f: Option<&str>, force: bool)
    -> Result<Box<dyn io::Write + Sync + Send>> {
    match f {
        None => Ok(Box::new(io::stdout())),
        Some(p) if p == "-" => Ok(Box::new(io::stdout())),
        Some(f) => {
            let p = Path::new(f);
            if !p.exists() || force {
                Ok(Box::new(OpenOptions::new()
                            .write(true)
                            .truncate(true)
                            .create(true)
                            .open(f)
                            .context("Failed to create output file")?))
            } else {
                Err(anyhow::Error::from(Error::OutputExists))
                    .context(format!("File {:?} exists, use --force to \
                                      overwrite", p))
            }
        }
    }
}

/// Reads the whole of `f`, or stdin if `f` is `-`.
fn read_file_or_stdin(f: &str) -> Result<Vec<u8>> {
    if f == "-" {
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut io::stdin(), &mut buf)?;
        Ok(buf)
    } else if ! Path::new(f).exists() {
        Err(anyhow::Error::from(Error::MissingInput))
            .context(format!("File {:?} does not exist", f))
    } else {
        fs::read(f).context(format!("Failed to read {:?}", f))
    }
}

/// Reads a passphrase from the first line of `f`.
fn load_passphrase(f: &str) -> Result<String> {
    let data = read_file_or_stdin(f)?;
    let data = String::from_utf8(data)
        .context(format!("Passphrase in {:?} is not UTF-8", f))?;
    Ok(data.lines().next().unwrap_or("").to_string())
}

// Decrypts a key, if possible.
//
// The passwords in `passwords` are tried first.  If the key can't be
// decrypted using those, the user is prompted.  If a valid password
// is entered, it is added to `passwords`.
fn decrypt_key<R>(key: Key<key::SecretParts, R>, passwords: &mut Vec<String>)
    -> Result<Key<key::SecretParts, R>>
    where R: key::KeyRole + Clone
{
    if key.has_unencrypted_secret() {
        return Ok(key);
    }

    for p in passwords.iter() {
        if let Ok(key) = key.clone().decrypt_secret(&Password::from(&p[..])) {
            return Ok(key);
        }
    }

    let mut first = true;
    loop {
        // Prompt the user.
        match rpassword::read_password_from_tty(
            Some(&format!(
                "{}Enter password to unlock {} (blank to skip): ",
                if first { "" } else { "Invalid password. " },
                key.keyid().to_hex())))
        {
            Ok(p) => {
                first = false;
                if p == "" {
                    // Give up.
                    break;
                }

                if let Ok(key) = key
                    .clone()
                    .decrypt_secret(&Password::from(&p[..]))
                {
                    passwords.push(p);
                    return Ok(key);
                }
            }
            Err(err) => {
                log::warn!("While reading password: {}", err);
                break;
            }
        }
    }

    Err(anyhow::Error::from(Error::KeyIsProtected))
        .context(format!("Key {}: Unable to decrypt secret key material",
                         key.keyid().to_hex()))
}

/// Settings shared by all subcommands.
///
/// Command-line arguments take precedence over the configuration file.
pub struct Config<'a> {
    force: bool,
    policy: P<'a>,
    gpg_home: PathBuf,
    file: FileConfig,
}

impl<'a> Config<'a> {
    fn from_matches(m: &clap::ArgMatches) -> Result<Self> {
        let file = match m.value_of("config") {
            Some(f) => FileConfig::load(f)?,
            None => FileConfig::default(),
        };
        let gpg_home = m.value_of("env").map(PathBuf::from)
            .or_else(|| file.gpg_home.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GPG_HOME));

        Ok(Config {
            force: m.is_present("force"),
            policy: P::new(),
            gpg_home,
            file,
        })
    }

    fn open_store(&self) -> Result<KeyStore> {
        KeyStore::open(&self.gpg_home)
    }

    fn create_or_stdout_safe(&self, f: Option<&str>)
                             -> Result<Box<dyn io::Write + Sync + Send>> {
        create_or_stdout(f, self.force)
    }
}

fn main() {
    use std::process::exit;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn")).init();

    match real_main() {
        Ok(()) => (),
        Err(e) => {
            print_error_chain(&e);
            exit(errors::exit_status(&e));
        },
    }
}

fn real_main() -> Result<()> {
    let matches = gpgmail_cli::build().get_matches();

    match matches.subcommand() {
        ("compose",  Some(m)) => {
            let config = Config::from_matches(m)?;
            commands::compose::dispatch(config, m)?
        },
        ("list",  Some(m)) => {
            let config = Config::from_matches(m)?;
            let mut output = io::stdout();
            commands::keys::list(&config, &mut output)?
        },
        ("import",  Some(m)) => {
            let config = Config::from_matches(m)?;
            let mut output = io::stdout();
            commands::keys::import(&config,
                                   m.values_of("input").expect("required"),
                                   &mut output)?
        },
        ("certify",  Some(m)) => {
            let config = Config::from_matches(m)?;
            let mut output = io::stdout();
            commands::certify::certify(config, m, &mut output)?
        },
        _ => unreachable!(),
    }

    Ok(())
}
