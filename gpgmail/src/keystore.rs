//! The local key store.
//!
//! A key store is a directory holding a single OpenPGP keyring,
//! `keyring.pgp`.  Certificates are stored together with their secret
//! key material, if any.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use itertools::Itertools;
use log::{debug, info};
use tempfile::NamedTempFile;

use sequoia_openpgp as openpgp;
use openpgp::{
    Cert,
    Fingerprint,
    KeyHandle,
    KeyID,
    Result,
    cert::CertParser,
    parse::Parse,
    policy::Policy,
    serialize::{Serialize, SerializeInto},
};

use crate::errors::Error;

/// Name of the keyring inside the store directory.
pub const KEYRING: &str = "keyring.pgp";

/// How much we believe a certificate belongs to its User IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// One of our own keys.
    Ultimate,
    /// Certified by one of our own keys.
    Full,
    Unknown,
}

impl fmt::Display for Trust {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Trust::Ultimate => "ultimate",
            Trust::Full => "full",
            Trust::Unknown => "unknown",
        })
    }
}

/// What importing a certificate did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    New,
    Updated,
    Unchanged,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ImportStatus::New => "new",
            ImportStatus::Updated => "updated",
            ImportStatus::Unchanged => "unchanged",
        })
    }
}

/// The outcome of importing one certificate.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub fingerprint: Fingerprint,
    pub status: ImportStatus,
    pub secret: bool,
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.fingerprint.to_hex(), self.status)?;
        if self.secret {
            write!(f, ", secret key")?;
        }
        Ok(())
    }
}

pub struct KeyStore {
    dir: PathBuf,
    certs: Vec<Cert>,
}

impl KeyStore {
    /// Opens the store in `dir`.
    ///
    /// A missing directory or keyring is an empty store.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let keyring = dir.join(KEYRING);
        let mut certs = Vec::new();
        if keyring.exists() {
            for cert in CertParser::from_file(&keyring)
                .with_context(|| format!("Failed to open keyring {:?}",
                                         keyring))?
            {
                certs.push(cert.with_context(|| format!(
                    "Malformed certificate in keyring {:?}", keyring))?);
            }
        }
        debug!("Loaded {} certificates from {:?}", certs.len(), keyring);
        Ok(KeyStore { dir, certs })
    }

    /// Returns every certificate, in fingerprint order.
    pub fn list_keys(&self) -> Vec<&Cert> {
        let mut certs: Vec<&Cert> = self.certs.iter().collect();
        certs.sort_by_key(|c| c.fingerprint());
        certs
    }

    /// Returns the certificates holding secret key material.
    pub fn secret_keys(&self) -> impl Iterator<Item = &Cert> {
        self.certs.iter().filter(|c| c.is_tsk())
    }

    /// Imports every certificate found in `file`, and saves the store.
    pub fn import_key<P: AsRef<Path>>(&mut self, file: P)
                                      -> Result<Vec<ImportResult>> {
        let file = file.as_ref();
        if ! file.exists() {
            return Err(anyhow::Error::from(Error::MissingInput))
                .context(format!("Key file {:?} does not exist", file));
        }

        let mut results = Vec::new();
        for cert in CertParser::from_file(file)
            .with_context(|| format!("Failed to load keys from {:?}", file))?
        {
            let cert = cert.with_context(
                || format!("A certificate in {:?} is bad", file))?;
            results.push(self.insert(cert)?);
        }

        if results.is_empty() {
            return Err(anyhow::Error::from(Error::BadData))
                .context(format!("No OpenPGP certificates in {:?}", file));
        }

        self.save()?;
        Ok(results)
    }

    /// Merges `cert` into the store.  The store is not saved.
    pub fn insert(&mut self, cert: Cert) -> Result<ImportResult> {
        let fingerprint = cert.fingerprint();
        let secret = cert.is_tsk();
        let status = match self.certs.iter_mut()
            .find(|c| c.fingerprint() == fingerprint)
        {
            Some(existing) => {
                let merged = existing.clone().merge_public_and_secret(cert)?;
                // Cert equality ignores secret key material.
                let status = if merged.as_tsk().to_vec()?
                    == existing.as_tsk().to_vec()?
                {
                    ImportStatus::Unchanged
                } else {
                    ImportStatus::Updated
                };
                *existing = merged;
                status
            },
            None => {
                self.certs.push(cert);
                ImportStatus::New
            },
        };
        info!("{}: {}", fingerprint, status);
        Ok(ImportResult { fingerprint, status, secret })
    }

    /// Writes the keyring, replacing the old one atomically.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create key store {:?}",
                                     self.dir))?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        for cert in self.list_keys() {
            cert.as_tsk().serialize(&mut tmp)?;
        }
        tmp.flush()?;
        let keyring = self.dir.join(KEYRING);
        tmp.persist(&keyring)
            .with_context(|| format!("Failed to write keyring {:?}",
                                     keyring))?;
        info!("Saved {} certificates to {:?}", self.certs.len(), keyring);
        Ok(())
    }

    /// Finds the one certificate matching `query`.
    ///
    /// `query` is either a fingerprint or key ID, which matches the
    /// primary key or any subkey, or else an email address or User ID
    /// fragment, compared case-insensitively.
    pub fn lookup(&self, query: &str) -> Result<&Cert> {
        let matches: Vec<&Cert> = match parse_key_handle(query) {
            Some(handle) => self.certs.iter()
                .filter(|c| c.keys().any(|ka| ka.key().key_handle()
                                         .aliases(&handle)))
                .collect(),
            None => {
                let needle = query.trim().to_lowercase();
                self.certs.iter()
                    .filter(|c| c.userids().any(|ua| {
                        let uid = ua.userid();
                        let by_email = uid.email().ok().flatten()
                            .map(|e| e.to_lowercase() == needle)
                            .unwrap_or(false);
                        by_email || String::from_utf8_lossy(uid.value())
                            .to_lowercase().contains(&needle)
                    }))
                    .collect()
            },
        };

        match matches.len() {
            0 => Err(anyhow::anyhow!("No key found for {:?} in {:?}",
                                     query, self.dir)),
            1 => Ok(matches[0]),
            _ => Err(anyhow::anyhow!(
                "{:?} is ambiguous, it matches: {}\n\
                 Hint: Use a fingerprint to select a key",
                query, matches.iter().map(|c| c.fingerprint().to_hex())
                    .join(", "))),
        }
    }

    /// Like [`KeyStore::lookup`], but the certificate must have secret
    /// key material.
    pub fn lookup_secret(&self, query: &str) -> Result<&Cert> {
        let cert = self.lookup(query)?;
        if ! cert.is_tsk() {
            return Err(anyhow::Error::from(Error::BadData))
                .context(format!("Key {} does not contain secret keys",
                                 cert.fingerprint()));
        }
        Ok(cert)
    }

    /// Returns the trust level of `cert`.
    pub fn trust(&self, policy: &dyn Policy, cert: &Cert) -> Trust {
        if cert.is_tsk() {
            return Trust::Ultimate;
        }

        let vc = match cert.with_policy(policy, None) {
            Ok(vc) => vc,
            Err(_) => return Trust::Unknown,
        };

        for ua in vc.userids() {
            for certification in ua.certifications() {
                let issued_by_us = self.secret_keys().find(|tsk| {
                    let ours = KeyHandle::from(tsk.fingerprint());
                    certification.get_issuers().iter()
                        .any(|issuer| issuer.aliases(&ours))
                });
                let tsk = match issued_by_us {
                    Some(tsk) => tsk,
                    None => continue,
                };

                if certification.verify_userid_binding(
                    tsk.primary_key().key(),
                    cert.primary_key().key(),
                    ua.userid()).is_ok()
                    && certification.signature_alive(None, None).is_ok()
                {
                    debug!("{} is certified by {}", cert.fingerprint(),
                           tsk.fingerprint());
                    return Trust::Full;
                }
            }
        }

        Trust::Unknown
    }
}

/// Interprets `query` as a fingerprint or key ID, if it looks like
/// one.
fn parse_key_handle(query: &str) -> Option<KeyHandle> {
    let hex: String = query.trim()
        .trim_start_matches("0x").trim_start_matches("0X")
        .chars().filter(|c| ! c.is_whitespace())
        .collect();
    if ! hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        16 => KeyID::from_hex(&hex).ok().map(Into::into),
        40 | 64 => Fingerprint::from_hex(&hex).ok().map(Into::into),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Trust;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use openpgp::cert::prelude::*;
    use openpgp::packet::prelude::*;
    use openpgp::policy::StandardPolicy;
    use openpgp::types::SignatureType;

    fn gen(uid: &str) -> Cert {
        CertBuilder::general_purpose(None, Some(uid))
            .generate().unwrap().0
    }

    fn store_with(certs: Vec<Cert>) -> (TempDir, KeyStore) {
        let dir = TempDir::new().unwrap();
        let mut ks = KeyStore::open(dir.path()).unwrap();
        for c in certs {
            ks.insert(c).unwrap();
        }
        (dir, ks)
    }

    #[test]
    fn empty_store() {
        let dir = TempDir::new().unwrap();
        let ks = KeyStore::open(dir.path().join("does-not-exist")).unwrap();
        assert!(ks.list_keys().is_empty());
        assert!(ks.lookup("alice@example.org").is_err());
    }

    #[test]
    fn import_and_reopen() {
        let dir = TempDir::new().unwrap();
        let alice = gen("Alice <alice@example.org>");
        let file = dir.path().join("alice.pgp");
        alice.as_tsk().serialize(&mut fs::File::create(&file).unwrap())
            .unwrap();

        let env = dir.path().join("env");
        let mut ks = KeyStore::open(&env).unwrap();
        let r = ks.import_key(&file).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].status, ImportStatus::New);
        assert!(r[0].secret);

        let r = ks.import_key(&file).unwrap();
        assert_eq!(r[0].status, ImportStatus::Unchanged);

        let ks = KeyStore::open(&env).unwrap();
        assert_eq!(ks.list_keys().len(), 1);
        assert!(ks.list_keys()[0].is_tsk());
        assert!(env.join(KEYRING).exists());
    }

    #[test]
    fn import_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut ks = KeyStore::open(dir.path()).unwrap();
        let e = ks.import_key(dir.path().join("nope.asc")).unwrap_err();
        assert_eq!(crate::errors::exit_status(&e), 61);
    }

    #[test]
    fn public_then_secret_is_an_update() {
        let alice = gen("Alice <alice@example.org>");
        let (_dir, mut ks) = store_with(vec![alice.clone().strip_secret_key_material()]);
        assert!(! ks.lookup("alice@example.org").unwrap().is_tsk());
        let r = ks.insert(alice.clone()).unwrap();
        assert_eq!(r.status, ImportStatus::Updated);
        assert!(ks.lookup("alice@example.org").unwrap().is_tsk());

        let r = ks.insert(alice).unwrap();
        assert_eq!(r.status, ImportStatus::Unchanged);
    }

    #[test]
    fn secret_import_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let alice = gen("Alice <alice@example.org>");
        let public = dir.path().join("alice.pgp");
        alice.serialize(&mut fs::File::create(&public).unwrap()).unwrap();
        let secret = dir.path().join("alice.tsk");
        alice.as_tsk().serialize(&mut fs::File::create(&secret).unwrap())
            .unwrap();

        let env = dir.path().join("env");
        let mut ks = KeyStore::open(&env).unwrap();
        let r = ks.import_key(&public).unwrap();
        assert_eq!(r[0].status, ImportStatus::New);
        assert!(! r[0].secret);

        let r = ks.import_key(&secret).unwrap();
        assert_eq!(r[0].status, ImportStatus::Updated);
        assert!(r[0].secret);

        let ks = KeyStore::open(&env).unwrap();
        assert!(ks.list_keys()[0].is_tsk());
        assert!(ks.lookup_secret("alice@example.org").is_ok());
    }

    #[test]
    fn lookup() {
        let alice = gen("Alice <alice@example.org>");
        let bob = gen("Bob <bob@example.org>");
        let (_dir, ks) = store_with(vec![alice.clone(), bob.clone()]);

        assert_eq!(ks.lookup("alice@example.org").unwrap().fingerprint(),
                   alice.fingerprint());
        assert_eq!(ks.lookup("ALICE@example.org").unwrap().fingerprint(),
                   alice.fingerprint());
        assert_eq!(ks.lookup("Bob").unwrap().fingerprint(),
                   bob.fingerprint());
        assert_eq!(ks.lookup(&alice.fingerprint().to_hex()).unwrap()
                   .fingerprint(), alice.fingerprint());
        assert_eq!(ks.lookup(&format!("0x{}", bob.keyid().to_hex())).unwrap()
                   .fingerprint(), bob.fingerprint());

        // Subkeys match too.
        let subkey = bob.keys().subkeys().next().unwrap().key().fingerprint();
        assert_eq!(ks.lookup(&subkey.to_string()).unwrap().fingerprint(),
                   bob.fingerprint());

        // Both match.
        assert!(ks.lookup("example.org").is_err());
        assert!(ks.lookup("carol@example.org").is_err());
    }

    #[test]
    fn lookup_secret() {
        let alice = gen("Alice <alice@example.org>");
        let bob = gen("Bob <bob@example.org>");
        let (_dir, ks) = store_with(
            vec![alice, bob.strip_secret_key_material()]);
        assert!(ks.lookup_secret("alice@example.org").is_ok());
        assert!(ks.lookup_secret("bob@example.org").is_err());
    }

    #[test]
    fn trust() {
        let p = &StandardPolicy::new();
        let alice = gen("Alice <alice@example.org>");
        let bob = gen("Bob <bob@example.org>")
            .strip_secret_key_material();
        let carol = gen("Carol <carol@example.org>")
            .strip_secret_key_material();

        // Alice certifies Bob.
        let mut signer = alice.primary_key().key().clone()
            .parts_into_secret().unwrap().into_keypair().unwrap();
        let bob_uid = bob.userids().next().unwrap().userid().clone();
        let certification =
            SignatureBuilder::new(SignatureType::GenericCertification)
            .set_signature_creation_time(
                SystemTime::now() - Duration::from_secs(60)).unwrap()
            .sign_userid_binding(&mut signer, bob.primary_key().key(),
                                 &bob_uid)
            .unwrap();
        let bob = bob.insert_packets(vec![certification]).unwrap();

        let (_dir, ks) = store_with(
            vec![alice.clone(), bob.clone(), carol.clone()]);
        assert_eq!(ks.trust(p, &alice), Trust::Ultimate);
        assert_eq!(ks.trust(p, &bob), Trust::Full);
        assert_eq!(ks.trust(p, &carol), Trust::Unknown);

        // Without Alice's secrets, nothing is trusted.
        let (_dir, ks) = store_with(
            vec![alice.strip_secret_key_material(), bob.clone()]);
        assert_eq!(ks.trust(p, &bob), Trust::Unknown);
    }
}
