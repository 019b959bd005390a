//! Single-character serial console queries
//!
//! In listening mode the device answers one-letter commands (`i` for its id,
//! `m` for the Wi-Fi MAC, `v` for the system firmware version). Replies
//! arrive in bursts, so a reply is complete once the line has been idle for
//! [`BATCH_IDLE`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SerialError};
use crate::wifi::DeviceFamily;

/// Default wait for the first byte of a reply
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Silence that ends a reply
pub const BATCH_IDLE: Duration = Duration::from_millis(250);

/// OUIs used to repair MAC addresses reported short by manufacturing firmware
const USI_OUIS: [[&str; 3]; 2] = [["6c", "0b", "84"], ["44", "39", "c4"]];

/// Send `command` and collect the reply
///
/// The stream is shut down afterwards on every path.
pub async fn issue_command<S>(mut stream: S, command: &str, timeout: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = exchange(&mut stream, command, timeout).await;
    if let Err(e) = stream.shutdown().await {
        log::debug!("Closing serial port: {}", e);
    }
    result
}

async fn exchange<S>(stream: &mut S, command: &str, timeout: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    log::debug!("Sending serial command {:?}", command);
    stream.write_all(command.as_bytes()).await?;
    stream.flush().await?;

    let mut reply = Vec::new();
    let mut chunk = [0u8; 256];

    let n = tokio::time::timeout(timeout, stream.read(&mut chunk))
        .await
        .map_err(|_| SerialError::Timeout {
            prompt: None,
            after: timeout,
        })??;
    if n == 0 {
        return Err(SerialError::Closed);
    }
    reply.extend_from_slice(&chunk[..n]);

    loop {
        match tokio::time::timeout(BATCH_IDLE, stream.read(&mut chunk)).await {
            Err(_) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => reply.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e.into()),
        }
    }

    let reply = String::from_utf8_lossy(&reply).into_owned();
    log::trace!("Reply: {:?}", reply);
    Ok(reply)
}

/// What a device reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub id: String,
    /// Cellular devices only
    pub imei: Option<String>,
    pub iccid: Option<String>,
}

/// Ask the device for its id
pub async fn identify<S>(stream: S, timeout: Duration) -> Result<DeviceIdentity>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = issue_command(stream, "i", timeout).await?;
    parse_identity(&reply).ok_or(SerialError::UnexpectedResponse(reply))
}

/// Ask the device for its Wi-Fi MAC address
pub async fn mac_address<S>(stream: S, family: DeviceFamily, timeout: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if family == DeviceFamily::Core {
        return Err(SerialError::Unsupported(
            "Unable to get the MAC address of a Core".to_string(),
        ));
    }
    let reply = issue_command(stream, "m", timeout).await?;
    parse_mac(&reply).ok_or(SerialError::UnexpectedResponse(reply))
}

/// Ask the device for its system firmware version
pub async fn firmware_version<S>(stream: S, timeout: Duration) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = issue_command(stream, "v", timeout).await?;
    parse_version(&reply).ok_or(SerialError::UnexpectedResponse(reply))
}

fn token_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let rest = &text[text.find(marker)? + marker.len()..];
    rest.split_whitespace().next()
}

fn is_device_id(token: &str) -> bool {
    token.len() == 24 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse the reply to `i`
///
/// Older firmware says `Your core id is <id>` or `Your device id is <id>`;
/// cellular firmware prints the bare 24-digit id followed by `IMEI:` and
/// `ICCID:` fields.
pub fn parse_identity(reply: &str) -> Option<DeviceIdentity> {
    let id = ["Your core id is", "Your device id is"]
        .iter()
        .find_map(|marker| token_after(reply, marker))
        .or_else(|| reply.split_whitespace().find(|t| is_device_id(t)))?;

    Some(DeviceIdentity {
        id: id.to_string(),
        imei: token_after(reply, "IMEI:").map(str::to_string),
        iccid: token_after(reply, "ICCID:").map(str::to_string),
    })
}

/// Parse the reply to `m`
///
/// Returns the address in lower case. Manufacturing firmware may report
/// fewer than six bytes; the missing leading bytes are restored from a known
/// module vendor prefix where one lines up, and zero-filled otherwise.
pub fn parse_mac(reply: &str) -> Option<String> {
    let token = reply.split_whitespace().find_map(|word| {
        let word = word.trim_matches(|c: char| !c.is_ascii_hexdigit() && c != ':');
        let parts: Vec<&str> = word.split(':').filter(|p| !p.is_empty()).collect();
        let valid = (2..=6).contains(&parts.len())
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
        valid.then_some(parts)
    })?;

    let mut bytes: Vec<String> = token.iter().map(|p| p.to_ascii_lowercase()).collect();
    if bytes.len() < 6 {
        while bytes.len() < 6 {
            bytes.insert(0, "00".to_string());
        }
        let repaired = USI_OUIS
            .iter()
            .find(|oui| (0..oui.len()).rev().any(|i| bytes[i] == oui[i]));
        if let Some(oui) = repaired {
            for (i, b) in oui.iter().enumerate() {
                bytes[i] = b.to_string();
            }
        }
    }
    Some(bytes.join(":"))
}

/// Parse the reply to `v`
pub fn parse_version(reply: &str) -> Option<String> {
    token_after(reply, "system firmware version:").map(str::to_string)
}
