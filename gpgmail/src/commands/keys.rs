use std::io;
use std::time::SystemTime;

use chrono::{DateTime, offset::Utc};
use itertools::Itertools;

use sequoia_openpgp as openpgp;
use openpgp::{Cert, Result};
use openpgp::packet::key::PublicParts;
use openpgp::packet::Key;
use openpgp::policy::Policy;

use crate::Config;
use crate::keystore::KeyStore;

/// Lists the keys in the store.
pub fn list(config: &Config, output: &mut dyn io::Write) -> Result<()> {
    let store = config.open_store()?;
    for cert in store.list_keys() {
        list_cert(&store, &config.policy, cert, output)?;
    }
    Ok(())
}

/// Prints the User IDs of `cert`, then its non-empty attributes, one
/// per line.
fn list_cert(store: &KeyStore, policy: &dyn Policy, cert: &Cert,
             output: &mut dyn io::Write) -> Result<()> {
    let uids = cert.userids()
        .map(|ua| String::from_utf8_lossy(ua.userid().value()).into_owned())
        .join(", ");
    if uids.is_empty() {
        writeln!(output, "(no User ID)")?;
    } else {
        writeln!(output, "{}", uids)?;
    }

    let primary = cert.primary_key().key();
    let mut attrs: Vec<(&str, String)> = vec![
        ("fingerprint", cert.fingerprint().to_hex()),
        ("keyid", cert.keyid().to_hex()),
        ("algo", primary.pk_algo().to_string()),
        ("length", key_length(primary)),
        ("created", format_time(primary.creation_time())),
    ];

    match cert.with_policy(policy, None) {
        Ok(vc) => {
            if let Some(t) = vc.primary_key().key_expiration_time() {
                attrs.push(("expires", format_time(t)));
            }
            if let Err(e) = vc.alive() {
                attrs.push(("invalid", e.to_string()));
            }
        },
        Err(e) => attrs.push(("invalid", e.to_string())),
    }

    attrs.push(("secret", if cert.is_tsk() { "yes" } else { "" }.into()));
    attrs.push(("trust", store.trust(policy, cert).to_string()));

    for ka in cert.keys().subkeys() {
        let key = ka.key();
        attrs.push(("subkey", format!("{} {} {}", key.fingerprint().to_hex(),
                                      key.pk_algo(), key_length(key))));
    }

    for (name, value) in attrs {
        if ! value.is_empty() {
            writeln!(output, "\t{} : {}", name, value)?;
        }
    }
    Ok(())
}

fn key_length<R>(key: &Key<PublicParts, R>) -> String
    where R: openpgp::packet::key::KeyRole
{
    key.mpis().bits().map(|b| b.to_string()).unwrap_or_default()
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Imports keys from `files` into the store.
pub fn import<'a, I>(config: &Config, files: I, output: &mut dyn io::Write)
                     -> Result<()>
    where I: Iterator<Item = &'a str>
{
    let mut store = config.open_store()?;
    for f in files {
        for result in store.import_key(f)? {
            writeln!(output, "{}", result)?;
        }
    }
    Ok(())
}
