//! `dfu-util` process transport

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::transport::{DfuTransport, TransportError};
use crate::spec::ModelId;

/// Printed by dfu-util once a download has completed, even when the
/// subsequent leave request makes it exit non-zero.
const DOWNLOAD_COMPLETE: &str = "File downloaded successfully";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for the `dfu-util` transport
#[derive(Debug, Clone)]
pub struct DfuUtilConfig {
    /// Program to run
    pub program: String,
    /// Run the program through `sudo`
    pub use_sudo: bool,
}

impl Default for DfuUtilConfig {
    fn default() -> Self {
        Self {
            program: "dfu-util".to_string(),
            use_sudo: false,
        }
    }
}

/// Transport that shells out to `dfu-util`
#[derive(Debug, Clone, Default)]
pub struct DfuUtil {
    config: DfuUtilConfig,
}

impl DfuUtil {
    pub fn new(config: DfuUtilConfig) -> Self {
        Self { config }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = if self.config.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(&self.config.program);
            cmd
        } else {
            Command::new(&self.config.program)
        };
        cmd.args(args);
        log::debug!("Running {:?}", cmd);
        cmd
    }

    fn run(&self, args: &[String]) -> Result<Output, TransportError> {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.config.program, e))
    }
}

impl DfuTransport for DfuUtil {
    fn enumerate(&self, timeout: Duration) -> Result<Vec<ModelId>, TransportError> {
        let child = self
            .command(&["-l".to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.config.program, e))?;

        let output = wait_with_timeout(child, timeout)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Cannot open DFU device") {
            log::warn!("dfu-util cannot open a device; check USB permissions");
        }
        if !output.status.success() {
            return Err(failure(&output));
        }

        Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn read(
        &self,
        device: ModelId,
        alt: u8,
        address: &str,
        dest: &Path,
        leave: bool,
    ) -> Result<String, TransportError> {
        let output = self.run(&read_args(device, alt, address, dest, leave))?;
        if !output.status.success() {
            return Err(failure(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn write(
        &self,
        device: ModelId,
        alt: u8,
        address: &str,
        src: &Path,
        leave: bool,
    ) -> Result<String, TransportError> {
        let output = self.run(&write_args(device, alt, address, src, leave))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() || stdout.contains(DOWNLOAD_COMPLETE) {
            Ok(stdout)
        } else {
            Err(failure(&output))
        }
    }
}

fn address_arg(address: &str, leave: bool) -> String {
    if leave {
        format!("{}:leave", address)
    } else {
        address.to_string()
    }
}

fn read_args(device: ModelId, alt: u8, address: &str, dest: &Path, leave: bool) -> Vec<String> {
    vec![
        "-d".into(),
        device.to_string(),
        "-a".into(),
        alt.to_string(),
        "-s".into(),
        address_arg(address, leave),
        "-U".into(),
        dest.display().to_string(),
    ]
}

fn write_args(device: ModelId, alt: u8, address: &str, src: &Path, leave: bool) -> Vec<String> {
    vec![
        "-d".into(),
        device.to_string(),
        "-a".into(),
        alt.to_string(),
        "-i".into(),
        "0".into(),
        "-s".into(),
        address_arg(address, leave),
        "-D".into(),
        src.display().to_string(),
    ]
}

/// Extract device ids from `dfu-util -l` output
///
/// Lines look like
/// `Found DFU: [2b04:d006] ver=0250, devnum=5, cfg=1, intf=0, alt=1, ...`;
/// one device shows up once per alt setting, so ids are deduplicated.
pub fn parse_device_list(stdout: &str) -> Vec<ModelId> {
    let mut ids = Vec::new();
    for line in stdout.lines().filter(|l| l.contains("Found DFU")) {
        let id = line
            .split_once('[')
            .and_then(|(_, rest)| rest.split_once(']'))
            .and_then(|(id, _)| id.parse::<ModelId>().ok());
        match id {
            Some(id) if !ids.contains(&id) => ids.push(id),
            Some(_) => {}
            None => log::debug!("Unparseable dfu-util line: {}", line),
        }
    }
    ids
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<Output, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child
                    .wait_with_output()
                    .map_err(|e| TransportError::new(e.to_string()))
            }
            Ok(None) if Instant::now() >= deadline => {
                // Already exited or gone if these fail; nothing else to do
                let _ = child.kill();
                let _ = child.wait();
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return Err(TransportError::new(format!(
                    "dfu-util timed out after {:?}{}",
                    timeout,
                    if stderr.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", stderr.trim())
                    }
                )));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(TransportError::new(e.to_string())),
        }
    }
}

fn failure(output: &Output) -> TransportError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    if message.is_empty() {
        TransportError::new(format!("dfu-util exited with {}", output.status))
    } else {
        TransportError::new(message)
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::NotFound {
        TransportError::new(format!("{} is not installed", program))
    } else {
        TransportError::new(format!("Failed to run {}: {}", program, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const LISTING: &str = "\
dfu-util 0.9

Copyright 2005-2009 Weston Schmidt, Harald Welte and OpenMoko Inc.
Found DFU: [2b04:d006] ver=0250, devnum=5, cfg=1, intf=0, path=\"20-1\", alt=1, name=\"@DCT Flash   /0x00000000/01*016Kg\", serial=\"00000000010C\"
Found DFU: [2b04:d006] ver=0250, devnum=5, cfg=1, intf=0, path=\"20-1\", alt=0, name=\"@Internal Flash   /0x08000000/03*016Ka,01*016Kg\", serial=\"00000000010C\"
Found Runtime: [05ac:8290] ver=0104, devnum=2, cfg=1, intf=5, path=\"20-5\", alt=0, name=\"UNKNOWN\", serial=\"UNKNOWN\"
Found DFU: [1d50:607f] ver=0200, devnum=7, cfg=1, intf=0, alt=0, name=\"@Internal Flash\"
";

    #[test]
    fn test_parse_device_list() {
        let ids = parse_device_list(LISTING);
        assert_eq!(
            ids,
            [ModelId::new(0x2b04, 0xd006), ModelId::new(0x1d50, 0x607f)]
        );
    }

    #[test]
    fn test_parse_device_list_empty() {
        assert!(parse_device_list("dfu-util 0.9\n").is_empty());
    }

    #[test]
    fn test_read_args() {
        let args = read_args(
            ModelId::new(0x2b04, 0xd006),
            1,
            "0x00000822:512",
            &PathBuf::from("key.der"),
            false,
        );
        assert_eq!(
            args,
            ["-d", "2b04:d006", "-a", "1", "-s", "0x00000822:512", "-U", "key.der"]
        );
    }

    #[test]
    fn test_write_args_leave() {
        let args = write_args(
            ModelId::new(0x2b04, 0xd006),
            0,
            "0x080A0000",
            &PathBuf::from("app.bin"),
            true,
        );
        assert_eq!(
            args,
            ["-d", "2b04:d006", "-a", "0", "-i", "0", "-s", "0x080A0000:leave", "-D", "app.bin"]
        );
    }

    #[test]
    fn test_missing_program() {
        let transport = DfuUtil::new(DfuUtilConfig {
            program: "iotprov-no-such-dfu-util".to_string(),
            use_sudo: false,
        });
        let err = transport.enumerate(Duration::from_secs(1)).unwrap_err();
        assert!(err.message.contains("not installed"));
    }
}
