//! Loader for the `key = value` authentication file.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Username/password pair, read once and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Read and parse the auth file at `path`.
///
/// Every line must contain `=`; this is stricter than it sounds (a blank
/// line or a comment line is a parse error too) but matches the reference
/// behavior this format was distilled from.
pub fn read(path: &Path) -> Result<Credentials> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::AuthFile(format!("failed to open {}: {e}", path.display())))?;

    let mut username = None;
    let mut password = None;

    for line in text.lines() {
        if username.is_some() && password.is_some() {
            break;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::AuthFile(format!("malformed line: {line:?}")))?;
        let key = key.trim();
        let value = value.trim();
        match key {
            "username" => username = Some(value.to_string()),
            "password" => password = Some(value.to_string()),
            _ => {}
        }
    }

    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials { username, password }),
        _ => Err(Error::AuthFile(
            "auth file missing username and/or password".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_valid_auth_file() {
        let f = write_tmp("username=testuser\npassword=testpass\n");
        let creds = read(f.path()).unwrap();
        assert_eq!(creds.username, "testuser");
        assert_eq!(creds.password, "testpass");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let f = write_tmp(" username = testuser \n password = testpass \n");
        let creds = read(f.path()).unwrap();
        assert_eq!(creds.username, "testuser");
        assert_eq!(creds.password, "testpass");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = read(Path::new("/nonexistent/auth/file"));
        assert!(matches!(result, Err(Error::AuthFile(_))));
    }

    #[test]
    fn line_without_equals_is_an_error() {
        let f = write_tmp("username=testuser\ninvalid_line_without_equals_sign\n");
        assert!(matches!(read(f.path()), Err(Error::AuthFile(_))));
    }

    #[test]
    fn blank_line_is_an_error() {
        let f = write_tmp("username=testuser\n\npassword=testpass\n");
        assert!(matches!(read(f.path()), Err(Error::AuthFile(_))));
    }

    #[test]
    fn missing_password_is_an_error() {
        let f = write_tmp("username=testuser\n");
        assert!(matches!(read(f.path()), Err(Error::AuthFile(_))));
    }
}
