//! Passphrase acquisition. Interactive prompts go through `rpassword`;
//! scripts and tests can bypass the TTY with `--password-file` or the
//! `DSSE_PASSWORD` environment variable. Rejected buffers are zeroized
//! before retrying.

use std::io::Write;
use std::path::Path;

use tracing::warn;
use zeroize::{Zeroize, Zeroizing};

use dsse_core::error::{Error, Result};

const MAX_ATTEMPTS: u8 = 3;
const BACKOFF_MS: u64 = 200;

/// Obtain the keystore passphrase. `confirm` forces a second prompt
/// (used when a fresh keystore is about to be created); file and env
/// sources skip confirmation.
pub fn obtain_password(password_file: Option<&Path>, confirm: bool) -> Result<Zeroizing<Vec<u8>>> {
    if let Ok(env) = std::env::var("DSSE_PASSWORD") {
        return Ok(Zeroizing::new(env.into_bytes()));
    }
    if let Some(path) = password_file {
        let mut raw = std::fs::read_to_string(path)?;
        let pw = Zeroizing::new(raw.trim_end_matches(['\r', '\n']).as_bytes().to_vec());
        raw.zeroize();
        return Ok(pw);
    }
    prompt_with_retry(confirm)
}

fn prompt_with_retry(confirm: bool) -> Result<Zeroizing<Vec<u8>>> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let pass = read_one("Password: ")?;
        if pass.is_empty() {
            warn!(attempt, "empty passphrase rejected");
            if attempt >= MAX_ATTEMPTS {
                return Err(Error::InvalidArgument("no passphrase provided".into()));
            }
            backoff();
            continue;
        }
        if confirm {
            let check = read_one("Confirm password: ")?;
            if *check != *pass {
                warn!(attempt, "passphrase mismatch");
                if attempt >= MAX_ATTEMPTS {
                    return Err(Error::InvalidArgument("passphrase mismatch".into()));
                }
                backoff();
                continue;
            }
        }
        return Ok(pass);
    }
}

fn read_one(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = rpassword::read_password()?;
    let pass = Zeroizing::new(line.as_bytes().to_vec());
    line.zeroize();
    Ok(pass)
}

fn backoff() {
    std::thread::sleep(std::time::Duration::from_millis(BACKOFF_MS));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_file_trims_trailing_newline() {
        std::env::remove_var("DSSE_PASSWORD");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw");
        std::fs::write(&path, "s3cret\r\n").unwrap();
        let pw = obtain_password(Some(&path), true).unwrap();
        assert_eq!(&*pw, b"s3cret");
    }

    #[test]
    fn missing_password_file_is_a_transport_error() {
        std::env::remove_var("DSSE_PASSWORD");
        let dir = tempfile::tempdir().unwrap();
        let err = obtain_password(Some(&dir.path().join("absent")), false).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
