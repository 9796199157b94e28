//! Subject process orchestration.
//!
//! Flow:
//! 1. Bind the first free candidate port
//! 2. Publish the port to the subject through $PORT
//! 3. Spawn the subject command
//! 4. Wait for it while the server keeps answering
//! 5. Stop the server and report the subject's exit code

use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PeerConfig;
use crate::transport::{ServeError, start};

/// Environment variable carrying the bound port to the subject.
pub const PORT_VAR: &str = "PORT";

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no subject command given")]
    NoSubject,
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("failed to launch subject '{command}': {source}")]
    SubjectLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for subject: {0}")]
    SubjectWait(std::io::Error),
}

impl HarnessError {
    /// Process exit code for a harness-side failure. Each failure class
    /// gets its own code so a wrapping test runner can tell them from
    /// anything the subject would plausibly return.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::NoSubject => 2,
            HarnessError::Serve(_) => 3,
            HarnessError::SubjectLaunch { .. } => 127,
            HarnessError::SubjectWait(_) => 70,
        }
    }
}

/// Run the subject command against a freshly started peer.
///
/// The port is bound and exported as `$PORT` before the subject starts, so
/// the subject may issue requests immediately. Returns the subject's exit
/// code once it terminates; the server is stopped either way.
pub async fn run(config: &PeerConfig, command: &[String]) -> Result<i32, HarnessError> {
    let Some((program, args)) = command.split_first() else {
        return Err(HarnessError::NoSubject);
    };

    let server = start(config).await?;
    let port = server.port();
    debug!(port, "publishing port to subject");

    let mut child = match Command::new(program)
        .args(args)
        .env(PORT_VAR, port.to_string())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            server.stop().await;
            return Err(HarnessError::SubjectLaunch {
                command: program.clone(),
                source: e,
            });
        }
    };

    info!(command = %command.join(" "), port, "subject started");

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            server.stop().await;
            return Err(HarnessError::SubjectWait(e));
        }
    };

    server.stop().await;

    let code = exit_code_of(status);
    info!(code, "subject finished");
    Ok(code)
}

/// Decode an exit status into the code the harness propagates.
///
/// Signal deaths map to the shell convention of 128 plus the signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port_base: u16) -> PeerConfig {
        PeerConfig {
            port_base,
            port_span: 4,
            ..Default::default()
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn propagates_subject_exit_code() {
        let code = run(&config(18400), &sh("exit 7")).await.unwrap();
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn subject_sees_the_bound_port() {
        let out = tempfile::NamedTempFile::new().unwrap();
        let path = out.path().display();
        let code = run(&config(18410), &sh(&format!("printf '%s' \"$PORT\" > {path}")))
            .await
            .unwrap();
        assert_eq!(code, 0);

        let reported: u16 = std::fs::read_to_string(out.path())
            .unwrap()
            .parse()
            .unwrap();
        assert!((18410..18414).contains(&reported));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let err = run(&config(18420), &["./no-such-subject".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::SubjectLaunch { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[tokio::test]
    async fn empty_command_is_rejected_before_binding() {
        let err = run(&config(18430), &[]).await.unwrap_err();
        assert!(matches!(err, HarnessError::NoSubject));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn port_exhaustion_is_fatal_with_its_own_code() {
        let _holder = std::net::TcpListener::bind(("127.0.0.1", 18440)).unwrap();
        let config = PeerConfig {
            port_base: 18440,
            port_span: 1,
            ..Default::default()
        };
        let err = run(&config, &sh("true")).await.unwrap_err();
        assert!(matches!(err, HarnessError::Serve(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_maps_to_128_plus_signal() {
        let code = run(&config(18450), &sh("kill -9 $$")).await.unwrap();
        assert_eq!(code, 137);
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_decoding() {
        use std::os::unix::process::ExitStatusExt;
        // raw wait(2) encodings: exit code in the high byte, signal in the low
        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code_of(ExitStatus::from_raw(7 << 8)), 7);
        assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 137);
    }
}
