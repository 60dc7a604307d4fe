//! Delivers mail over SMTP.

use anyhow::Context as _;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{SmtpTransport, Transport};

use sequoia_openpgp::Result;

use crate::config::{Security, SmtpConfig};
use crate::errors::Error;
use super::compose::Mail;

/// Creates the SMTP transport described by `config`.
///
/// Nothing is sent, and no connection is made, until the first mail
/// is delivered.
pub fn transport(config: &SmtpConfig) -> Result<SmtpTransport> {
    let builder = match config.security {
        Security::Starttls => SmtpTransport::starttls_relay(&config.host)
            .context(format!("Failed to set up STARTTLS for {}",
                             config.host))?,
        Security::Tls => SmtpTransport::relay(&config.host)
            .context(format!("Failed to set up TLS for {}", config.host))?,
        Security::None => {
            log::warn!("Connecting to {} without encryption", config.host);
            SmtpTransport::builder_dangerous(&config.host)
        },
    };

    let mut builder = builder
        .port(config.port())
        .timeout(config.timeout());
    if let Some((username, password)) = config.credentials() {
        builder = builder
            .credentials(Credentials::new(username.into(), password.into()))
            .authentication(vec![Mechanism::Login, Mechanism::Plain]);
    }

    log::info!("Using SMTP server {}:{} ({:?})",
               config.host, config.port(), config.security);
    Ok(builder.build())
}

/// Sends `mail` using `transport`.
///
/// The envelope is derived from the mail's `From` and `To` headers.
pub fn deliver<T>(transport: &T, mail: &Mail) -> Result<()>
    where T: Transport,
          T::Error: std::error::Error + Send + Sync + 'static,
{
    let from = mail.from()
        .ok_or_else(|| anyhow::Error::from(Error::MissingArg))
        .context("Sending mail needs a sender address, use --from or \
                  set \"from\" in the configuration file")?;
    let to = mail.to()
        .ok_or_else(|| anyhow::Error::from(Error::MissingArg))
        .context("The recipient has no email address")?;

    let envelope = Envelope::new(Some(from.email.clone()), vec![to.clone()])
        .context("Failed to build the envelope")?;

    transport.send_raw(&envelope, &mail.formatted())
        .map_err(|e| anyhow::Error::from(e).context(Error::DeliveryFailed))?;
    log::info!("Sent mail from {} to {}", from.email, to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettre::transport::stub::StubTransport;
    use tempfile::TempDir;

    use sequoia_openpgp as openpgp;
    use openpgp::cert::prelude::*;
    use openpgp::policy::StandardPolicy;

    use crate::commands::compose::{compose, ComposeOpts};
    use crate::config::FileConfig;
    use crate::keystore::KeyStore;

    fn mail(from: Option<&str>) -> Mail {
        let p = &StandardPolicy::new();
        let dir = TempDir::new().unwrap();
        let mut store = KeyStore::open(dir.path()).unwrap();
        let (bob, _) = CertBuilder::general_purpose(None, Some("bob@example.org"))
            .generate().unwrap();
        store.insert(bob.strip_secret_key_material()).unwrap();

        compose(ComposeOpts {
            policy: p,
            store: &store,
            recipient: Some("bob@example.org"),
            trust: true,
            signer: None,
            sign_only: false,
            passwords: vec![],
            subject: "Test",
            message: "Hi".into(),
            attachments: vec![],
            from: from.map(|f| f.parse().unwrap()),
            autocrypt: false,
        }).unwrap()
    }

    #[test]
    fn deliver_ok() {
        let transport = StubTransport::new_ok();
        deliver(&transport, &mail(Some("Alice <alice@example.org>"))).unwrap();
    }

    #[test]
    fn deliver_fails() {
        let transport = StubTransport::new_error();
        let e = deliver(&transport, &mail(Some("alice@example.org")))
            .unwrap_err();
        assert_eq!(crate::errors::exit_status(&e), 75);
    }

    #[test]
    fn deliver_needs_sender() {
        let transport = StubTransport::new_ok();
        let e = deliver(&transport, &mail(None)).unwrap_err();
        assert_eq!(crate::errors::exit_status(&e), 19);
    }

    #[test]
    fn build_transports() {
        for security in &["starttls", "tls", "none"] {
            let c = FileConfig::from_json(&format!(r#"{{ "smtp": {{
                "host": "smtp.example.org",
                "security": "{}",
                "username": "alice",
                "password": "hunter2",
                "timeout": 5
            }} }}"#, security)).unwrap();
            assert!(transport(c.smtp.as_ref().unwrap()).is_ok());
        }
    }
}
