//! Composes PGP/MIME mail (RFC 3156).
//!
//! The mail to protect is a `multipart/mixed` entity with the text
//! message and the attachments.  It is either encrypted, and wrapped
//! in `multipart/encrypted`, or signed, and wrapped in
//! `multipart/signed` next to its detached signature.

use anyhow::Context as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use lettre::Address;
use lettre::message::{Attachment, Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::message::header::{
    self, ContentDisposition, ContentType, HeaderName, HeaderValue, Headers,
};

use sequoia_openpgp as openpgp;
use openpgp::{Cert, Result};
use openpgp::crypto::KeyPair;
use openpgp::policy::Policy;
use sequoia_autocrypt as autocrypt;

use crate::Config;
use crate::config::DEFAULT_SUBJECT;
use crate::errors::Error;
use crate::keystore::{KeyStore, Trust};
use super::{encrypt, get_signing_key, sign_detached, SIGNATURE_HASH};

/// Used when the attachment's type can't be guessed.
const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Name of the part holding the encrypted mail.
const ENCRYPTED_NAME: &str = "encrypted.asc";

/// Name of the part holding the detached signature.
const SIGNATURE_NAME: &str = "signature.asc";

/// Autocrypt headers are folded at this width.
const FOLD_WIDTH: usize = 76;

/// A composed mail, ready to print or send.
pub struct Mail {
    headers: Headers,
    body: MultiPart,
    from: Option<Mailbox>,
    to: Option<Address>,
}

impl Mail {
    /// Returns the RFC 5322 representation of the mail.
    pub fn formatted(&self) -> Vec<u8> {
        let mut out = self.headers.to_string().into_bytes();
        out.extend_from_slice(&self.body.formatted());
        out
    }

    pub fn from(&self) -> Option<&Mailbox> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&Address> {
        self.to.as_ref()
    }
}

/// Everything needed to compose a mail.
pub struct ComposeOpts<'a> {
    pub policy: &'a dyn Policy,
    pub store: &'a KeyStore,
    pub recipient: Option<&'a str>,
    pub trust: bool,
    pub signer: Option<&'a str>,
    pub sign_only: bool,
    pub passwords: Vec<String>,
    pub subject: &'a str,
    pub message: String,
    pub attachments: Vec<PathBuf>,
    pub from: Option<Mailbox>,
    pub autocrypt: bool,
}

pub fn dispatch(config: Config, m: &clap::ArgMatches) -> Result<()> {
    let message = if let Some(f) = m.value_of("message-file") {
        String::from_utf8(crate::read_file_or_stdin(f)?)
            .context("The text message is not UTF-8")?
    } else {
        m.value_of("message").unwrap_or("").to_string()
    };

    let mut passwords = Vec::new();
    if let Some(f) = m.value_of("passphrase-file") {
        passwords.push(crate::load_passphrase(f)?);
    }

    let from = m.value_of("from")
        .or(config.file.from.as_deref())
        .map(|f| f.parse::<Mailbox>()
             .context(format!("Bad sender address {:?}", f)))
        .transpose()?;

    let store = config.open_store()?;
    let opts = ComposeOpts {
        policy: &config.policy,
        store: &store,
        recipient: m.value_of("recipient"),
        trust: m.is_present("trust"),
        signer: m.value_of("signer").or(config.file.signer.as_deref()),
        sign_only: m.is_present("sign-only"),
        passwords,
        subject: m.value_of("subject")
            .or(config.file.subject.as_deref())
            .unwrap_or(DEFAULT_SUBJECT),
        message,
        attachments: m.values_of("attachment")
            .map(|v| v.map(PathBuf::from).collect())
            .unwrap_or_default(),
        from,
        autocrypt: m.is_present("autocrypt"),
    };

    let mail = compose(opts)?;

    if m.is_present("smtp") {
        let smtp = config.file.smtp.as_ref()
            .ok_or_else(|| anyhow::Error::from(Error::BadConfig))
            .context("--smtp needs an \"smtp\" section in the \
                      configuration file")?;
        let transport = super::send::transport(smtp)?;
        super::send::deliver(&transport, &mail)?;
    } else {
        let mut output = config.create_or_stdout_safe(m.value_of("output"))?;
        output.write_all(&mail.formatted())?;
        output.flush()?;
    }

    Ok(())
}

/// Composes the mail.
pub fn compose(opts: ComposeOpts) -> Result<Mail> {
    let ComposeOpts {
        policy, store, recipient, trust, signer, sign_only, mut passwords,
        subject, message, attachments, from, autocrypt,
    } = opts;

    let recipient = recipient
        .ok_or_else(|| anyhow::Error::from(Error::MissingRecipient))?;

    let signer_cert = signer.map(|s| store.lookup_secret(s)).transpose()?;
    if sign_only && signer_cert.is_none() {
        return Err(anyhow::Error::from(Error::MissingArg))
            .context("--sign-only needs a signing key, use --signer");
    }

    let inner = build_inner(message, &attachments)?;

    let (body, to) = if sign_only {
        let signer = get_signing_key(signer_cert.expect("checked above"),
                                     policy, &mut passwords)?;
        // If the recipient is in the store, use its address.
        let to = recipient_address(recipient,
                                   store.lookup(recipient).ok(), policy);
        (sign_mail(inner, signer)?, to)
    } else {
        let cert = store.lookup(recipient)
            .context("Failed to find the recipient's key")?;
        check_trust(store, policy, cert, trust)?;
        let signer = signer_cert
            .map(|tsk| get_signing_key(tsk, policy, &mut passwords))
            .transpose()?;
        let to = recipient_address(recipient, Some(cert), policy);
        (encrypt_mail(inner, policy, cert, signer)?, to)
    };

    let mut headers = Headers::new();
    headers.set(header::Subject::from(subject.to_string()));
    if let Some(from) = from.as_ref() {
        headers.set(header::From::from(Mailboxes::from(from.clone())));
    }
    if let Some(to) = to.as_ref() {
        headers.set(header::To::from(Mailboxes::from(
            Mailbox::new(None, to.clone()))));
    }
    headers.set(header::Date::now());
    headers.set(header::MIME_VERSION_1_0);

    if autocrypt {
        let from = from.as_ref()
            .ok_or_else(|| anyhow::Error::from(Error::MissingArg))
            .context("--autocrypt needs a sender address, use --from")?;
        let tsk = signer_cert
            .ok_or_else(|| anyhow::Error::from(Error::MissingArg))
            .context("--autocrypt needs a signing key, use --signer")?;
        headers.insert_raw(autocrypt_header(policy, tsk, &from.email)?);
    }

    Ok(Mail { headers, body, from, to })
}

/// Builds the entity that is signed or encrypted.
fn build_inner(message: String, attachments: &[PathBuf]) -> Result<MultiPart> {
    let mut inner = MultiPart::mixed().singlepart(SinglePart::plain(message));
    for path in attachments {
        inner = inner.singlepart(attachment(path)?);
    }
    Ok(inner)
}

fn attachment(path: &Path) -> Result<SinglePart> {
    if ! path.exists() {
        return Err(anyhow::Error::from(Error::MissingInput))
            .context(format!("Attachment {:?} does not exist", path));
    }
    let content = std::fs::read(path)
        .context(format!("Failed to read attachment {:?}", path))?;
    let filename = path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Attachment {:?} is not a file",
                                       path))?;

    let content_type = mime_type(path)?;
    Ok(Attachment::new(filename).body(content, content_type))
}

/// Guesses the MIME type from the file name.
fn mime_type(path: &Path) -> Result<ContentType> {
    let guessed = match mime_guess::from_path(path).first_raw() {
        Some(t) => t,
        None => {
            log::warn!("Could not guess file mime-type, using {}.",
                       FALLBACK_MIME_TYPE);
            FALLBACK_MIME_TYPE
        },
    };
    Ok(ContentType::parse(guessed)?)
}

/// Refuses untrusted recipient keys, unless `always_trust`.
fn check_trust(store: &KeyStore, policy: &dyn Policy, cert: &Cert,
               always_trust: bool) -> Result<()> {
    let trust = store.trust(policy, cert);
    log::info!("Recipient {} has {} trust", cert.fingerprint(), trust);
    if trust == Trust::Unknown && ! always_trust {
        return Err(anyhow::Error::from(Error::CannotEncrypt))
            .context(format!(
                "There is no assurance that key {} belongs to the \
                 recipient\n\
                 Hint: Use --trust to use it anyway, or certify it \
                 using \"gpgmail certify\"", cert.fingerprint()));
    }
    Ok(())
}

/// Picks the address to put in the `To` header.
///
/// That is the query itself if it is an address, or else the address
/// of the primary User ID.
fn recipient_address(query: &str, cert: Option<&Cert>, policy: &dyn Policy)
                     -> Option<Address> {
    if let Ok(address) = query.trim().parse::<Address>() {
        return Some(address);
    }
    let vc = cert?.with_policy(policy, None).ok()?;
    let email = vc.primary_userid().ok()?.userid().email().ok()??;
    email.parse().ok()
}

fn encrypt_mail(inner: MultiPart, policy: &dyn Policy, recipient: &Cert,
                signer: Option<KeyPair>) -> Result<MultiPart> {
    let ciphertext = encrypt(policy, &inner.formatted(), recipient, signer)
        .map_err(|e| e.context(Error::CannotEncrypt))?;
    let ciphertext = String::from_utf8(ciphertext)?;

    let control = SinglePart::builder()
        .header(ContentType::parse("application/pgp-encrypted")?)
        .body(String::from("Version: 1\r\n"));
    let payload = SinglePart::builder()
        .header(ContentType::parse(
            &format!("application/octet-stream; name=\"{}\"",
                     ENCRYPTED_NAME))?)
        .header(ContentDisposition::inline_with_name(ENCRYPTED_NAME))
        .body(ciphertext);

    Ok(MultiPart::encrypted(String::from("application/pgp-encrypted"))
       .singlepart(control)
       .singlepart(payload))
}

fn sign_mail(inner: MultiPart, signer: KeyPair) -> Result<MultiPart> {
    // The signature covers the entity as a MIME parser delimits it.  The
    // CRLF preceding the outer boundary belongs to the boundary.
    let mut signed = inner.formatted();
    if signed.ends_with(b"\r\n") {
        signed.truncate(signed.len() - 2);
    }
    let signature = sign_detached(&signed, signer)?;
    let signature = String::from_utf8(signature)?;

    let signature = SinglePart::builder()
        .header(ContentType::parse(
            &format!("application/pgp-signature; name=\"{}\"",
                     SIGNATURE_NAME))?)
        .header(ContentDisposition::attachment(SIGNATURE_NAME))
        .body(signature);

    Ok(MultiPart::signed(String::from("application/pgp-signature"),
                         micalg())
       .multipart(inner)
       .singlepart(signature))
}

/// Returns the `micalg` parameter for [`SIGNATURE_HASH`].
fn micalg() -> String {
    format!("pgp-{}", SIGNATURE_HASH.to_string().to_lowercase()
            .replace('-', ""))
}

/// Builds the `Autocrypt` header for `tsk`, folded.
fn autocrypt_header(policy: &dyn Policy, tsk: &Cert, addr: &Address)
                    -> Result<HeaderValue> {
    let ac = autocrypt::AutocryptHeader::new_sender(
        policy, tsk, addr.as_ref(), None::<&str>)?;
    let mut raw = Vec::new();
    ac.serialize(&mut raw)?;
    let raw = String::from_utf8(raw)?.trim_end().to_string();
    let encoded = fold(&raw);
    Ok(HeaderValue::dangerous_new_pre_encoded(
        HeaderName::new_from_ascii_str("Autocrypt"), raw, encoded))
}

/// Folds `value` into lines of at most [`FOLD_WIDTH`] characters.
///
/// The value is broken after whitespace when possible; long tokens,
/// like the base64-encoded key, are split.
fn fold(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 32);
    let mut line = 0;
    for token in value.split(' ').filter(|t| ! t.is_empty()) {
        let mut token = token;
        if line > 0 && line + 1 + token.len() <= FOLD_WIDTH {
            out.push(' ');
            line += 1;
        } else if line > 0 {
            out.push_str("\r\n ");
            line = 1;
        }
        while line + token.len() > FOLD_WIDTH {
            let mut at = FOLD_WIDTH - line;
            while ! token.is_char_boundary(at) {
                at -= 1;
            }
            let (head, tail) = token.split_at(at);
            out.push_str(head);
            out.push_str("\r\n ");
            line = 1;
            token = tail;
        }
        out.push_str(token);
        line += token.len();
    }
    out
}
