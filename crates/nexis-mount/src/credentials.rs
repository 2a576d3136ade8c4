//! NEXIS login details handed to the mount tool.

use std::fmt;

/// Login for a NEXIS server.
///
/// The password is only handed to the mount tool. It has no public accessor
/// and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    server: String,
    username: String,
    password: String,
}

impl Credentials {
    /// Bundle a server address with a username and password.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Server address (host name or IP).
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("nexis.example.com", "editor", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("editor"));
        assert!(rendered.contains("nexis.example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
