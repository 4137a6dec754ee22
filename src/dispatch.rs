//! Delivery collaborator.
//!
//! One call per run: the destination number, the ordered page list, and the
//! resolution mode. Either the whole assembled document is handed over or
//! nothing is.

use std::path::PathBuf;
use std::process::Command;

use crate::error::{RelayError, Result};

/// Hands a fully assembled page list to the outbound fax queue.
pub trait Dispatcher {
    fn dispatch(
        &self,
        phone_number: &str,
        pages: &[PathBuf],
        standard_resolution: bool,
    ) -> Result<()>;
}

/// Production dispatcher spooling through mgetty's `faxspool`.
pub struct FaxSpool;

impl Dispatcher for FaxSpool {
    fn dispatch(
        &self,
        phone_number: &str,
        pages: &[PathBuf],
        standard_resolution: bool,
    ) -> Result<()> {
        let mut command = Command::new("faxspool");
        if standard_resolution {
            command.arg("-n");
        }
        command.arg(phone_number);
        command.args(pages);

        let output = command
            .output()
            .map_err(|e| RelayError::DispatchError(format!("spawning faxspool: {e}")))?;
        if !output.status.success() {
            return Err(RelayError::DispatchError(format!(
                "faxspool exited {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
