//! User-facing surface for an exchange.

use std::collections::VecDeque;

use sealink_crypto::channel::EncryptedEnvelope;
use sealink_crypto::codec;

use crate::errors::{ErrorKind, MessageError};
use crate::handshake::EstablishedSession;
use crate::transport::HandshakeTransport;

/// Where outbound plaintext comes from and where results are shown.
pub trait UiSurface {
    /// Next plaintext to send, `None` when there is nothing to send.
    fn read_outbound_plaintext(&mut self) -> Option<String>;

    /// Show a ciphertext as base64 text.
    fn display_ciphertext(&mut self, ciphertext: &str);

    fn display_plaintext(&mut self, plaintext: &str);

    fn display_failure(&mut self, kind: ErrorKind, message: &str);
}

/// In-memory surface that records everything it is shown.
#[derive(Debug, Default)]
pub struct MemoryUi {
    outbound: VecDeque<String>,
    pub ciphertexts: Vec<String>,
    pub plaintexts: Vec<String>,
    pub failures: Vec<(ErrorKind, String)>,
}

impl MemoryUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue plaintexts to be returned by `read_outbound_plaintext`.
    pub fn with_outbound<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outbound: messages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl UiSurface for MemoryUi {
    fn read_outbound_plaintext(&mut self) -> Option<String> {
        self.outbound.pop_front()
    }

    fn display_ciphertext(&mut self, ciphertext: &str) {
        self.ciphertexts.push(ciphertext.to_string());
    }

    fn display_plaintext(&mut self, plaintext: &str) {
        self.plaintexts.push(plaintext.to_string());
    }

    fn display_failure(&mut self, kind: ErrorKind, message: &str) {
        self.failures.push((kind, message.to_string()));
    }
}

/// Show the greeting, then send one outbound plaintext.
///
/// Returns the envelope that was sent, if any. Failures are shown on `ui`
/// before being returned.
pub async fn run_exchange<T, U>(
    session: &mut EstablishedSession<T>,
    ui: &mut U,
) -> Result<Option<EncryptedEnvelope>, MessageError>
where
    T: HandshakeTransport,
    U: UiSurface + ?Sized,
{
    let result = exchange(session, ui).await;
    if let Err(e) = &result {
        ui.display_failure(e.kind(), &e.to_string());
    }
    result
}

async fn exchange<T, U>(
    session: &mut EstablishedSession<T>,
    ui: &mut U,
) -> Result<Option<EncryptedEnvelope>, MessageError>
where
    T: HandshakeTransport,
    U: UiSurface + ?Sized,
{
    if let Some(greeting) = session.take_greeting()? {
        ui.display_ciphertext(&codec::encode(&greeting.envelope.ciphertext));
        ui.display_plaintext(&greeting.plaintext);
    }

    let Some(outbound) = ui.read_outbound_plaintext() else {
        return Ok(None);
    };
    let envelope = session.send(&outbound).await?;
    ui.display_ciphertext(&codec::encode(&envelope.ciphertext));
    Ok(Some(envelope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ui_records() {
        let mut ui = MemoryUi::with_outbound(["one", "two"]);
        assert_eq!(ui.read_outbound_plaintext().as_deref(), Some("one"));
        assert_eq!(ui.read_outbound_plaintext().as_deref(), Some("two"));
        assert_eq!(ui.read_outbound_plaintext(), None);

        ui.display_ciphertext("Y3Q=");
        ui.display_plaintext("pt");
        ui.display_failure(ErrorKind::Replay, "again");
        assert_eq!(ui.ciphertexts, vec!["Y3Q="]);
        assert_eq!(ui.plaintexts, vec!["pt"]);
        assert_eq!(ui.failures, vec![(ErrorKind::Replay, "again".to_string())]);
    }
}
