use anyhow::Context as _;
use std::io::Write;

use sequoia_openpgp as openpgp;
use crate::openpgp::armor;
use crate::openpgp::cert::prelude::*;
use crate::openpgp::crypto;
use crate::openpgp::{Cert, Result};
use crate::openpgp::policy::Policy;
use crate::openpgp::serialize::stream::{
    Armorer, Message, Signer, LiteralWriter, Encryptor, Recipient,
};
use crate::openpgp::types::{HashAlgorithm, KeyFlags};

use crate::errors::Error;

pub mod certify;
pub mod compose;
pub mod keys;
pub mod send;

/// Hash algorithm used for signatures, advertised as `micalg`.
pub const SIGNATURE_HASH: HashAlgorithm = HashAlgorithm::SHA512;

/// Returns a signing key of `tsk`, unlocked.
///
/// `passwords` are tried first, then the user is prompted.
fn get_signing_key(tsk: &Cert, p: &dyn Policy, passwords: &mut Vec<String>)
    -> Result<crypto::KeyPair>
{
    let key = tsk.keys().with_policy(p, None).alive().revoked(false)
        .for_signing()
        .supported()
        .secret()
        .map(|ka| ka.key().clone())
        .next()
        .ok_or_else(|| anyhow::Error::from(Error::BadData))
        .context(format!("Found no suitable signing key on {}", tsk))?;
    log::debug!("Signing with {}", key.fingerprint());

    let key = crate::decrypt_key(key, passwords)?;
    key.into_keypair()
}

/// Returns the keys of `cert` suitable for encrypting mail.
fn get_encryption_keys<'a>(cert: &'a Cert, p: &'a dyn Policy)
    -> Result<Vec<Recipient<'a>>>
{
    let mode = KeyFlags::empty()
        .set_storage_encryption()
        .set_transport_encryption();

    let recipients: Vec<Recipient> = cert.keys().with_policy(p, None)
        .alive().revoked(false)
        .key_flags(&mode).supported()
        .map(|ka| ka.key().into())
        .collect();

    if recipients.is_empty() {
        return Err(anyhow::Error::from(Error::CannotEncrypt))
            .context(format!("Cert {} has no suitable encryption key", cert));
    }
    log::debug!("Encrypting to {} key(s) of {}", recipients.len(), cert);
    Ok(recipients)
}

/// Encrypts `data` for `recipient`, optionally signing it first.
///
/// Returns an ASCII-armored OpenPGP message.
pub fn encrypt(policy: &dyn Policy, data: &[u8], recipient: &Cert,
               signer: Option<crypto::KeyPair>)
               -> Result<Vec<u8>>
{
    let recipient_subkeys = get_encryption_keys(recipient, policy)?;

    let mut armored = Vec::new();
    let message = Message::new(&mut armored);
    let message = Armorer::new(message)
        .kind(armor::Kind::Message)
        .build()?;

    let mut sink = Encryptor::for_recipients(message, recipient_subkeys)
        .build()
        .context("Failed to create encryptor")?;

    if let Some(signer) = signer {
        sink = Signer::new(sink, signer)
            .hash_algo(SIGNATURE_HASH)?
            .add_intended_recipient(recipient)
            .build()?;
    }

    let mut literal_writer = LiteralWriter::new(sink).build()
        .context("Failed to create literal writer")?;
    literal_writer.write_all(data)
        .context("Failed to encrypt")?;
    literal_writer.finalize()
        .context("Failed to encrypt")?;

    Ok(armored)
}

/// Creates an ASCII-armored detached signature over `data`.
pub fn sign_detached(data: &[u8], signer: crypto::KeyPair)
                     -> Result<Vec<u8>>
{
    let mut armored = Vec::new();
    let message = Message::new(&mut armored);
    let message = Armorer::new(message)
        .kind(armor::Kind::Signature)
        .build()?;

    let mut signer = Signer::new(message, signer)
        .hash_algo(SIGNATURE_HASH)?
        .detached()
        .build()
        .context("Failed to create signer")?;
    signer.write_all(data)
        .context("Failed to sign")?;
    signer.finalize()
        .context("Failed to sign")?;

    Ok(armored)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;
    use openpgp::KeyHandle;
    use openpgp::crypto::SessionKey;
    use openpgp::packet::{PKESK, SKESK};
    use openpgp::parse::Parse;
    use openpgp::parse::stream::*;
    use openpgp::policy::StandardPolicy;
    use openpgp::types::SymmetricAlgorithm;

    /// Decrypts with `key` and counts good signatures by `signer`.
    pub(crate) struct Helper<'a> {
        pub policy: &'a dyn Policy,
        pub key: Option<&'a Cert>,
        pub signer: Option<&'a Cert>,
        pub good_signatures: usize,
    }

    impl<'a> VerificationHelper for Helper<'a> {
        fn get_certs(&mut self, _ids: &[KeyHandle]) -> Result<Vec<Cert>> {
            Ok(self.signer.into_iter().cloned().collect())
        }

        fn check(&mut self, structure: MessageStructure) -> Result<()> {
            for layer in structure.into_iter() {
                if let MessageLayer::SignatureGroup { results } = layer {
                    self.good_signatures +=
                        results.iter().filter(|r| r.is_ok()).count();
                }
            }
            Ok(())
        }
    }

    impl<'a> DecryptionHelper for Helper<'a> {
        fn decrypt<D>(&mut self, pkesks: &[PKESK], _skesks: &[SKESK],
                      sym_algo: Option<SymmetricAlgorithm>, mut decrypt: D)
                      -> Result<Option<openpgp::Fingerprint>>
            where D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool
        {
            let key = self.key.expect("have a key");
            for ka in key.keys().with_policy(self.policy, None)
                .for_transport_encryption().secret()
            {
                let mut pair = ka.key().clone().into_keypair()?;
                for pkesk in pkesks {
                    if pkesk.decrypt(&mut pair, sym_algo)
                        .map(|(algo, sk)| decrypt(algo, &sk))
                        .unwrap_or(false)
                    {
                        return Ok(Some(key.fingerprint()));
                    }
                }
            }
            Err(anyhow::anyhow!("No key to decrypt message"))
        }
    }

    fn gen(uid: &str) -> Cert {
        CertBuilder::general_purpose(None, Some(uid))
            .generate().unwrap().0
    }

    #[test]
    fn encrypt_and_sign() {
        let p = &StandardPolicy::new();
        let alice = gen("alice@example.org");
        let bob = gen("bob@example.org");

        let signer = get_signing_key(&alice, p, &mut vec![]).unwrap();
        let ciphertext = encrypt(p, b"Hello Bob", &bob, Some(signer))
            .unwrap();
        assert!(ciphertext.starts_with(b"-----BEGIN PGP MESSAGE-----"));

        let helper = Helper {
            policy: p, key: Some(&bob), signer: Some(&alice),
            good_signatures: 0,
        };
        let mut decryptor = DecryptorBuilder::from_bytes(&ciphertext).unwrap()
            .with_policy(p, None, helper).unwrap();
        let mut plaintext = Vec::new();
        decryptor.read_to_end(&mut plaintext).unwrap();
        assert_eq!(&plaintext[..], b"Hello Bob");
        assert_eq!(decryptor.into_helper().good_signatures, 1);
    }

    #[test]
    fn detached_signature_verifies() {
        let p = &StandardPolicy::new();
        let alice = gen("alice@example.org");
        let signer = get_signing_key(&alice, p, &mut vec![]).unwrap();
        let sig = sign_detached(b"Content-Type: text/plain\r\n\r\nHi\r\n",
                                signer).unwrap();
        assert!(sig.starts_with(b"-----BEGIN PGP SIGNATURE-----"));

        let helper = Helper {
            policy: p, key: None, signer: Some(&alice), good_signatures: 0,
        };
        let mut v = DetachedVerifierBuilder::from_bytes(&sig).unwrap()
            .with_policy(p, None, helper).unwrap();
        v.verify_bytes(b"Content-Type: text/plain\r\n\r\nHi\r\n").unwrap();
        assert_eq!(v.into_helper().good_signatures, 1);
    }

    #[test]
    fn no_encryption_key() {
        let p = &StandardPolicy::new();
        let (signing_only, _) = CertBuilder::new()
            .add_userid("carol@example.org")
            .add_signing_subkey()
            .generate().unwrap();
        let e = encrypt(p, b"x", &signing_only, None).unwrap_err();
        assert_eq!(crate::errors::exit_status(&e), 2);
    }

    #[test]
    fn locked_key_with_password() {
        let p = &StandardPolicy::new();
        let (alice, _) =
            CertBuilder::general_purpose(None, Some("alice@example.org"))
            .set_password(Some("streng geheim".into()))
            .generate().unwrap();
        let mut passwords = vec!["wrong".to_string(),
                                 "streng geheim".to_string()];
        assert!(get_signing_key(&alice, p, &mut passwords).is_ok());
    }
}
