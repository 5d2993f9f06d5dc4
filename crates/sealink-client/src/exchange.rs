//! Client flows behind the CLI commands.
//!
//! Each flow reports failures on its surface and returns the exit code the
//! process should end with.

use std::io::Write;
use std::sync::Arc;

use tracing::{info, warn};

use sealink_core::handshake::verify_server_identity;
use sealink_core::{
    connect, run_exchange, EstablishedSession, HandshakeConfig, HandshakeError,
    HandshakeTransport, MessageError, SessionState, UiSurface,
};
use sealink_crypto::codec;
use sealink_crypto::utils::fingerprint;
use sealink_crypto::KeyManager;

use crate::ExitCode;

/// Fetch the server identity, verify it and print the key for pinning.
pub async fn show_identity<T, W>(transport: &T, config: &HandshakeConfig, out: &mut W) -> ExitCode
where
    T: HandshakeTransport + ?Sized,
    W: Write,
{
    let identity = match tokio::time::timeout(config.round_trip_timeout, transport.fetch_server_identity()).await {
        Ok(Ok(identity)) => identity,
        Ok(Err(e)) => return report(out, HandshakeError::Transport(e.to_string())),
        Err(_) => {
            return report(
                out,
                HandshakeError::Cancelled(format!("no response within {:?}", config.round_trip_timeout)),
            )
        }
    };

    let keys = KeyManager::new(config.suite);
    let session = match verify_server_identity(
        &keys,
        &identity,
        config.pinned_server_key.as_deref(),
        SessionState::new(),
    ) {
        Ok(session) => session,
        Err(e) => return report(out, e),
    };

    let Some(key) = session.peer_signing_public_key.as_ref() else {
        return report(out, HandshakeError::InvalidState("no server key recorded".into()));
    };
    let bytes = key.to_bytes();
    let _ = writeln!(out, "suite: {}", config.suite);
    let _ = writeln!(out, "server key: {}", codec::encode(&bytes));
    let _ = writeln!(out, "fingerprint: {}", fingerprint(&bytes));
    ExitCode::Success
}

fn report<W: Write>(out: &mut W, e: HandshakeError) -> ExitCode {
    let _ = writeln!(out, "error[{}]: {}", e.kind().code(), e);
    ExitCode::from_kind(e.kind())
}

/// Handshake, show the greeting, send one message and close.
pub async fn send_one<T, U>(transport: Arc<T>, config: HandshakeConfig, ui: &mut U) -> ExitCode
where
    T: HandshakeTransport,
    U: UiSurface,
{
    let mut session = match open(transport, config, ui).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    let code = match run_exchange(&mut session, ui).await {
        Ok(Some(_)) => ExitCode::Success,
        Ok(None) => {
            info!("nothing to send");
            ExitCode::Success
        }
        Err(e) => ExitCode::from_kind(e.kind()),
    };
    close(session).await;
    code
}

/// Send each outbound line and show what the server then holds.
///
/// Authentication, decryption and replay failures only drop the message
/// they concern; any other failure ends the session.
pub async fn chat<T, U>(transport: Arc<T>, config: HandshakeConfig, ui: &mut U) -> ExitCode
where
    T: HandshakeTransport,
    U: UiSurface,
{
    let mut session = match open(transport, config, ui).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    let mut code = ExitCode::Success;
    loop {
        match run_exchange(&mut session, ui).await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) if is_per_message(&e) => continue,
            Err(e) => {
                code = ExitCode::from_kind(e.kind());
                break;
            }
        }

        match session.receive().await {
            Ok(Some(received)) => {
                ui.display_ciphertext(&codec::encode(&received.envelope.ciphertext));
                ui.display_plaintext(&received.plaintext);
            }
            Ok(None) => {}
            Err(e) => {
                ui.display_failure(e.kind(), &e.to_string());
                if !is_per_message(&e) {
                    code = ExitCode::from_kind(e.kind());
                    break;
                }
            }
        }
    }

    close(session).await;
    code
}

fn is_per_message(e: &MessageError) -> bool {
    matches!(
        e,
        MessageError::Authentication | MessageError::Decryption | MessageError::Replay
    )
}

/// Connect, showing any handshake failure on `ui`.
async fn open<T, U>(
    transport: Arc<T>,
    config: HandshakeConfig,
    ui: &mut U,
) -> Result<EstablishedSession<T>, ExitCode>
where
    T: HandshakeTransport,
    U: UiSurface,
{
    match connect(transport, config).await {
        Ok(session) => {
            info!(session_id = %session.session_id(), "session established");
            Ok(session)
        }
        Err(e) => {
            ui.display_failure(e.kind(), &e.to_string());
            Err(ExitCode::from_kind(e.kind()))
        }
    }
}

async fn close<T: HandshakeTransport>(session: EstablishedSession<T>) {
    let session_id = session.session_id();
    if let Err(e) = session.close().await {
        warn!(session_id = %session_id, error = %e, "could not close session");
    }
}
