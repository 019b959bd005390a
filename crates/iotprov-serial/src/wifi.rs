//! Wi-Fi credential setup over the device's serial console
//!
//! Devices in listening mode enter Wi-Fi setup when sent `w`, then prompt
//! for the SSID, the security type and the password in turn. The exchange is
//! scripted as a fixed sequence of [`HandshakeStep`]s.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use iotprov_core::spec::{builtin, DeviceModel};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::handshake::{HandshakeStep, SerialHandshake};

const PROBE: &[u8] = b"w";
const SSID_PROMPT: &str = "SSID:";
const SECURITY_PROMPT: &str = "Security 0=unsecured";
const PASSWORD_PROMPT: &str = "Password:";

/// Wi-Fi security type, numbered as the device firmware expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiSecurity {
    Open = 0,
    Wep = 1,
    Wpa = 2,
    Wpa2 = 3,
}

impl WifiSecurity {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for WifiSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WifiSecurity::Open => "open",
            WifiSecurity::Wep => "wep",
            WifiSecurity::Wpa => "wpa",
            WifiSecurity::Wpa2 => "wpa2",
        };
        f.write_str(name)
    }
}

impl FromStr for WifiSecurity {
    type Err = String;

    /// Accepts the firmware code (`0`-`3`) or a name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "open" | "none" | "unsecured" => Ok(WifiSecurity::Open),
            "1" | "wep" => Ok(WifiSecurity::Wep),
            "2" | "wpa" => Ok(WifiSecurity::Wpa),
            "3" | "wpa2" => Ok(WifiSecurity::Wpa2),
            other => Err(format!(
                "Unknown security type '{}' (expected open, wep, wpa or wpa2)",
                other
            )),
        }
    }
}

/// Device families with differing setup firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// Original Core: acknowledges with a bare line feed
    Core,
    /// Photon and later: print a fixed sign-off phrase
    Photon,
}

impl DeviceFamily {
    pub fn of(model: &DeviceModel) -> Self {
        if model.id == builtin::CORE {
            DeviceFamily::Core
        } else {
            DeviceFamily::Photon
        }
    }

    /// Output that means the credentials were accepted
    pub fn confirmation(self) -> &'static [&'static str] {
        match self {
            DeviceFamily::Core => &["\n"],
            DeviceFamily::Photon => &["Spark <3 you!", "Particle <3 you!"],
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(DeviceFamily::Core),
            "photon" => Ok(DeviceFamily::Photon),
            other => Err(format!(
                "Unknown device family '{}' (expected core or photon)",
                other
            )),
        }
    }
}

/// Network to join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: Option<String>,
    pub security: WifiSecurity,
}

/// Deadlines for each phase of the setup conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTimeouts {
    /// Wait for the SSID prompt after the first probe
    pub probe: Duration,
    /// Wait for the security prompt, which some firmware never prints
    pub security: Duration,
    /// Wait for the SSID and password prompts
    pub prompt: Duration,
    /// Wait for the final acknowledgment
    pub confirmation: Duration,
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(1),
            security: Duration::from_secs(2),
            prompt: Duration::from_secs(5),
            confirmation: Duration::from_secs(15),
        }
    }
}

/// Scripted Wi-Fi setup for one device family
#[derive(Debug, Clone)]
pub struct WifiProvisioning {
    family: DeviceFamily,
    timeouts: FlowTimeouts,
}

impl WifiProvisioning {
    pub fn new(family: DeviceFamily) -> Self {
        Self {
            family,
            timeouts: FlowTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: FlowTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Send `credentials` to the device on `stream`
    ///
    /// The stream is shut down whether or not the conversation succeeds; a
    /// dropped future drops (and so closes) it as well.
    pub async fn run<S>(&self, stream: S, credentials: &WifiCredentials) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = SerialHandshake::new(stream);
        let result = self.converse(&mut session, credentials).await;
        let closed = session.close().await;

        match (result, closed) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                log::info!("Wi-Fi credentials for '{}' accepted", credentials.ssid);
                Ok(())
            }
        }
    }

    async fn converse<S>(
        &self,
        session: &mut SerialHandshake<S>,
        credentials: &WifiCredentials,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let t = &self.timeouts;
        let ssid_answer = format!("{}\n", credentials.ssid);

        // Freshly enumerated firmware can miss the first probe; send it once more
        session.run_step(&HandshakeStep::send(PROBE)).await?;
        let ssid = HandshakeStep::expect(SSID_PROMPT).answer(ssid_answer.as_bytes());
        let seen = session
            .run_step(&ssid.clone().timeout(t.probe).always_resolve())
            .await?;
        if seen.is_none() {
            log::debug!("No SSID prompt, probing again");
            session.run_step(&HandshakeStep::send(PROBE)).await?;
            session.run_step(&ssid.timeout(t.prompt)).await?;
        }

        let security = HandshakeStep::expect(SECURITY_PROMPT)
            .answer(format!("{}\n", credentials.security.code()))
            .timeout(t.security)
            .always_resolve();
        let asked_security = session.run_step(&security).await?.is_some();

        if !asked_security && credentials.security == WifiSecurity::Open {
            // Firmware without a security prompt still reads a password line
            session.run_step(&HandshakeStep::send("\n")).await?;
        } else if let Some(password) = &credentials.password {
            let step = HandshakeStep::expect(PASSWORD_PROMPT)
                .answer(format!("{}\n", password))
                .timeout(t.prompt)
                .secret();
            session.run_step(&step).await?;
        }

        let done = HandshakeStep::expect_any(self.family.confirmation().iter().copied())
            .timeout(t.confirmation);
        session.run_step(&done).await?;
        Ok(())
    }
}
