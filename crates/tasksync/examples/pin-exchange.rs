//! PIN authentication between two tasks over a socket pair.
//!
//! The "device" task answers one pet-name check, announces that
//! authentication passed, then serves a storage block-size query.
//!
//! Run with:
//!   cargo run --example pin-exchange

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use tasksync::frame::{
        Magic, Message, Payload, PinFieldType, PinRequest, PinRequestKind, SyncState,
    };
    use tasksync::sequencer::Endpoint;

    let (host, device) = UnixStream::pair()?;

    let device_task = thread::spawn(move || -> Result<(), tasksync::sequencer::EndpointError> {
        let reader = device.try_clone().map_err(tasksync::frame::FrameError::from)?;
        let mut endpoint = Endpoint::new(reader, device);

        let cmd = endpoint.recv()?;
        let known = cmd
            .pin_request()
            .is_some_and(|req| req.name_bytes() == b"kitty");
        eprintln!("device: {} (pet name ok: {known})", cmd.magic());

        let verdict = if known { &b"ok"[..] } else { &b"ko"[..] };
        endpoint.send(&Message::with_bytes(
            Magic::CryptoPinResp,
            SyncState::Done,
            verdict,
        ))?;
        if known {
            endpoint.send(&Message::command(Magic::AuthStatePassed, SyncState::Done))?;
        }

        let query = endpoint.recv()?;
        eprintln!("device: {}", query.magic());
        endpoint.send(&Message::with_payload(
            Magic::StorageScsiBlockSizeResp,
            SyncState::Done,
            Payload::DWords(vec![512]),
        ))?;
        Ok(())
    });

    let reader = host.try_clone()?;
    let mut endpoint = Endpoint::new(reader, host);

    let req = PinRequest::new(PinFieldType::PetName, PinRequestKind::Authenticate, b"kitty")?;
    let resp = endpoint.request(&Message::pin(Magic::CryptoPinCmd, SyncState::AskForData, req))?;
    eprintln!("host: {} -> {:?}", resp.magic(), resp.payload());

    let resp = endpoint.request(&Message::command(
        Magic::StorageScsiBlockSizeCmd,
        SyncState::Ready,
    ))?;
    eprintln!("host: {} -> {:?}", resp.magic(), resp.payload());

    while endpoint.backlog_len() > 0 {
        eprintln!("host: queued {}", endpoint.recv()?.magic());
    }
    eprintln!(
        "host: authenticated = {}",
        endpoint.sequencer().is_authenticated()
    );

    device_task
        .join()
        .map_err(|_| "device task panicked")??;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("pin-exchange needs Unix socket pairs");
}
