use std::io;
use std::time::Duration;

use anyhow::Context as _;

use sequoia_openpgp as openpgp;
use openpgp::{Cert, Fingerprint, Result};
use openpgp::packet::prelude::*;
use openpgp::policy::Policy;
use openpgp::types::SignatureType;

use crate::Config;
use crate::errors::Error;
use crate::keystore::KeyStore;

const SECONDS_IN_YEAR: u64 = 365 * 24 * 60 * 60;

/// Certifications expire after this long.
const CERTIFICATION_VALIDITY: Duration = Duration::from_secs(5 * SECONDS_IN_YEAR);

pub fn certify(config: Config, m: &clap::ArgMatches,
               output: &mut dyn io::Write)
    -> Result<()>
{
    let mut store = config.open_store()?;

    let mut passwords = Vec::new();
    if let Some(f) = m.value_of("passphrase-file") {
        passwords.push(crate::load_passphrase(f)?);
    }

    let fingerprint = certify_cert(&mut store, &config.policy,
                                   m.value_of("certificate").expect("required"),
                                   m.value_of("certifier"),
                                   m.value_of("userid"),
                                   &mut passwords)?;
    store.save()?;

    writeln!(output, "{}", fingerprint.to_hex())?;
    Ok(())
}

/// Certifies the User IDs of the key matching `target` and merges the
/// certifications into `store`.  The store is not saved.
fn certify_cert(store: &mut KeyStore, p: &dyn Policy, target: &str,
                certifier: Option<&str>, userid: Option<&str>,
                passwords: &mut Vec<String>)
    -> Result<Fingerprint>
{
    let cert = store.lookup(target)?.clone();
    let certifier = match certifier {
        Some(q) => store.lookup_secret(q)?.clone(),
        None => only_secret_key(store)?.clone(),
    };
    log::info!("Certifying {} with {}", cert.fingerprint(),
               certifier.fingerprint());

    let vc = cert.with_policy(p, None)
        .context(format!("Key {} is not valid", cert.fingerprint()))?;

    let userids: Vec<UserID> = match userid {
        Some(wanted) => {
            let u = vc.userids()
                .find(|ua| ua.userid().value() == wanted.as_bytes())
                .map(|ua| ua.userid().clone());
            match u {
                Some(u) => vec![u],
                None => {
                    eprintln!("User ID: '{}' not found.\nValid User IDs:",
                              wanted);
                    let mut have_valid = false;
                    for ua in vc.userids() {
                        have_valid = true;
                        eprintln!("  - {}",
                                  String::from_utf8_lossy(ua.userid().value()));
                    }
                    if ! have_valid {
                        eprintln!("  - Certificate has no valid User IDs.");
                    }
                    return Err(anyhow::format_err!("No matching User ID found"));
                },
            }
        },
        None => vc.userids().map(|ua| ua.userid().clone()).collect(),
    };
    if userids.is_empty() {
        return Err(anyhow::format_err!("Key {} has no valid User IDs",
                                       cert.fingerprint()));
    }

    let key = certifier.primary_key().key().clone().parts_into_secret()
        .context(format!("The primary key of {} has no secret key material",
                         certifier.fingerprint()))?;
    let mut signer = crate::decrypt_key(key, passwords)?.into_keypair()?;

    let mut certifications = Vec::new();
    for userid in &userids {
        let certification =
            SignatureBuilder::new(SignatureType::GenericCertification)
            .set_signature_validity_period(CERTIFICATION_VALIDITY)?
            .sign_userid_binding(&mut signer, cert.primary_key().key(),
                                 userid)?;
        log::debug!("Certified {:?}", String::from_utf8_lossy(userid.value()));
        certifications.push(certification);
    }

    let cert = cert.insert_packets(certifications)?;
    let fingerprint = cert.fingerprint();
    store.insert(cert)?;
    Ok(fingerprint)
}

/// Returns the store's only secret key.
fn only_secret_key(store: &KeyStore) -> Result<&Cert> {
    let mut tsks = store.secret_keys();
    match (tsks.next(), tsks.next()) {
        (Some(tsk), None) => Ok(tsk),
        (None, _) => Err(anyhow::Error::from(Error::MissingArg))
            .context("There is no secret key in the store to certify with"),
        (Some(_), Some(_)) => Err(anyhow::Error::from(Error::MissingArg))
            .context("There are several secret keys in the store, \
                      use --certifier to choose one"),
    }
}
