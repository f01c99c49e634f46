//! Stable exit codes for the `tshell` and `backcone` commands.

use crate::error::ShellError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Bad input, config or any failure not covered below.
pub const INVALID: i32 = 1;
/// The tool could not be started, or exited or closed under us.
pub const SHELL: i32 = 2;
/// The tool did not reach a prompt in time.
pub const TIMEOUT: i32 = 3;

/// Exit code for a command's outcome.
pub fn for_result<T>(result: &anyhow::Result<T>) -> i32 {
    match result {
        Ok(_) => OK,
        Err(err) => for_error(err),
    }
}

/// Exit code for an error chain, based on the first [`ShellError`] in it.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|cause| cause.downcast_ref::<ShellError>()) {
        Some(ShellError::Timeout { .. }) => TIMEOUT,
        Some(ShellError::MultilineCommand(_)) | None => INVALID,
        Some(_) => SHELL,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Context;

    use super::*;

    #[test]
    fn maps_shell_errors_through_context() {
        let timeout: anyhow::Result<()> = Err(ShellError::Timeout {
            waited: Duration::from_secs(1),
            partial: String::new(),
        })
        .context("tessent command `report_statistics`");
        assert_eq!(for_error(&timeout.expect_err("err")), TIMEOUT);

        let closed = anyhow::Error::new(ShellError::Closed).context("send");
        assert_eq!(for_error(&closed), SHELL);

        assert_eq!(for_error(&anyhow::anyhow!("bad yaml")), INVALID);
    }

    #[test]
    fn success_maps_to_ok() {
        assert_eq!(for_result(&anyhow::Ok(())), OK);
        let failed: anyhow::Result<()> = Err(ShellError::NotFound { path: None }.into());
        assert_eq!(for_result(&failed), SHELL);
    }
}
