//! `openssl` process key tool

use std::path::Path;
use std::process::{Command, Output, Stdio};

use super::{KeyTool, ToolError};
use crate::spec::KeyAlgorithm;

/// RSA modulus size of generated device keys
const RSA_BITS: &str = "1024";

/// Curve of generated EC device keys
const EC_CURVE: &str = "prime256v1";

/// Configuration for the `openssl` key tool
#[derive(Debug, Clone)]
pub struct OpenSslConfig {
    /// Program to run
    pub program: String,
}

impl Default for OpenSslConfig {
    fn default() -> Self {
        Self {
            program: "openssl".to_string(),
        }
    }
}

/// Key tool that shells out to `openssl`
#[derive(Debug, Clone, Default)]
pub struct OpenSsl {
    config: OpenSslConfig,
}

impl OpenSsl {
    pub fn new(config: OpenSslConfig) -> Self {
        Self { config }
    }

    fn run(&self, args: &[String]) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(args);
        log::debug!("Running {:?}", cmd);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.config.program, e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failure(&self.config.program, &output))
        }
    }
}

impl KeyTool for OpenSsl {
    fn generate(&self, alg: KeyAlgorithm, dest: &Path) -> Result<(), ToolError> {
        self.run(&generate_args(alg, dest))
    }

    fn public_pem(
        &self,
        alg: KeyAlgorithm,
        private_pem: &Path,
        dest: &Path,
    ) -> Result<(), ToolError> {
        self.run(&public_pem_args(alg, private_pem, dest))
    }

    fn private_der(
        &self,
        alg: KeyAlgorithm,
        private_pem: &Path,
        dest: &Path,
    ) -> Result<(), ToolError> {
        self.run(&private_der_args(alg, private_pem, dest))
    }

    fn public_der(
        &self,
        alg: KeyAlgorithm,
        public_pem: &Path,
        dest: &Path,
    ) -> Result<(), ToolError> {
        self.run(&public_der_args(alg, public_pem, dest))
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn generate_args(alg: KeyAlgorithm, dest: &Path) -> Vec<String> {
    match alg {
        KeyAlgorithm::Rsa => vec!["genrsa".into(), "-out".into(), path_arg(dest), RSA_BITS.into()],
        KeyAlgorithm::Ec => vec![
            "ecparam".into(),
            "-name".into(),
            EC_CURVE.into(),
            "-genkey".into(),
            "-out".into(),
            path_arg(dest),
        ],
    }
}

fn public_pem_args(alg: KeyAlgorithm, private_pem: &Path, dest: &Path) -> Vec<String> {
    vec![
        alg.as_str().into(),
        "-in".into(),
        path_arg(private_pem),
        "-pubout".into(),
        "-out".into(),
        path_arg(dest),
    ]
}

fn private_der_args(alg: KeyAlgorithm, private_pem: &Path, dest: &Path) -> Vec<String> {
    vec![
        alg.as_str().into(),
        "-in".into(),
        path_arg(private_pem),
        "-outform".into(),
        "DER".into(),
        "-out".into(),
        path_arg(dest),
    ]
}

fn public_der_args(alg: KeyAlgorithm, public_pem: &Path, dest: &Path) -> Vec<String> {
    vec![
        alg.as_str().into(),
        "-in".into(),
        path_arg(public_pem),
        "-pubin".into(),
        "-pubout".into(),
        "-outform".into(),
        "DER".into(),
        "-out".into(),
        path_arg(dest),
    ]
}

fn failure(program: &str, output: &Output) -> ToolError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        ToolError::new(format!("{} exited with {}", program, output.status))
    } else {
        ToolError::new(stderr.trim().to_string())
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> ToolError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ToolError::new(format!("{} is not installed", program))
    } else {
        ToolError::new(format!("Failed to run {}: {}", program, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_generate_args() {
        assert_eq!(
            generate_args(KeyAlgorithm::Rsa, &PathBuf::from("device.pem")),
            ["genrsa", "-out", "device.pem", "1024"]
        );
        assert_eq!(
            generate_args(KeyAlgorithm::Ec, &PathBuf::from("device.pem")),
            ["ecparam", "-name", "prime256v1", "-genkey", "-out", "device.pem"]
        );
    }

    #[test]
    fn test_conversion_args() {
        let pem = PathBuf::from("device.pem");
        assert_eq!(
            public_pem_args(KeyAlgorithm::Ec, &pem, &PathBuf::from("device.pub.pem")),
            ["ec", "-in", "device.pem", "-pubout", "-out", "device.pub.pem"]
        );
        assert_eq!(
            private_der_args(KeyAlgorithm::Rsa, &pem, &PathBuf::from("device.der")),
            ["rsa", "-in", "device.pem", "-outform", "DER", "-out", "device.der"]
        );
        assert_eq!(
            public_der_args(
                KeyAlgorithm::Rsa,
                &PathBuf::from("server.pub.pem"),
                &PathBuf::from("server.pub.der")
            ),
            [
                "rsa",
                "-in",
                "server.pub.pem",
                "-pubin",
                "-pubout",
                "-outform",
                "DER",
                "-out",
                "server.pub.der"
            ]
        );
    }

    #[test]
    fn test_missing_program() {
        let tool = OpenSsl::new(OpenSslConfig {
            program: "iotprov-no-such-openssl".to_string(),
        });
        let err = tool
            .generate(KeyAlgorithm::Rsa, &PathBuf::from("device.pem"))
            .unwrap_err();
        assert!(err.message.contains("not installed"));
    }
}
