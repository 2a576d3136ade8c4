//! Password acquisition for the NEXIS server.

use std::io::{self, BufRead, IsTerminal};

use anyhow::{Context, Result};

/// Password sources collected from the command line
#[derive(Clone, Default)]
pub struct PasswordOptions {
    pub password: Option<String>,
    pub password_stdin: bool,
}

/// Get the password using the priority chain:
/// 1. --password-stdin
/// 2. --password / NEXIS_PASSWORD
/// 3. Interactive prompt
pub fn get_password(opts: &PasswordOptions, username: &str, server: &str) -> Result<String> {
    if opts.password_stdin {
        read_password_from_stdin()
    } else if let Some(ref password) = opts.password {
        Ok(password.clone())
    } else {
        prompt_password(username, server)
    }
}

fn prompt_password(username: &str, server: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        anyhow::bail!(
            "No password given and stdin is not a terminal.\n\
             Use --password-stdin or set NEXIS_PASSWORD."
        );
    }
    rpassword::prompt_password(format!("Password for {username}@{server}: "))
        .context("Failed to read password")
}

/// Read the password from stdin (first line only)
fn read_password_from_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        anyhow::bail!(
            "--password-stdin requires the password to be piped in.\n\
             Example: echo \"$SECRET\" | nexis --password-stdin mount ProjectX"
        );
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = trim_line(&line);

    if password.is_empty() {
        anyhow::bail!("Password from stdin is empty");
    }

    Ok(password.to_string())
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_password_wins_over_prompt() {
        let opts = PasswordOptions {
            password: Some("secret".to_string()),
            password_stdin: false,
        };
        assert_eq!(get_password(&opts, "editor", "nexis").unwrap(), "secret");
    }

    #[test]
    fn test_trim_line_keeps_inner_whitespace() {
        assert_eq!(trim_line("pass word\r\n"), "pass word");
        assert_eq!(trim_line("  padded  \n"), "  padded  ");
    }
}
