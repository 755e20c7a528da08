//! Parsing of SSH connection strings such as `ssh admin@203.0.113.5`.

/// Username and host derived from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub username: String,
    pub host: String,
}

/// Split a `user@host` connection string.
///
/// The username is the text before the first `@`, with a leading `ssh`
/// command token and surrounding whitespace removed; the host is the
/// trimmed text after it.  Returns `None` when either part is empty or
/// there is no `@`.
pub fn parse_connection_string(input: &str) -> Option<SshTarget> {
    let (user_part, host_part) = input.split_once('@')?;

    let username = strip_ssh_token(user_part.trim());
    let host = host_part.trim();

    if username.is_empty() || host.is_empty() {
        return None;
    }

    Some(SshTarget {
        username: username.to_string(),
        host: host.to_string(),
    })
}

// `ssh` only counts as the command when whitespace follows it, so a user
// literally called `sshd` survives.
fn strip_ssh_token(user: &str) -> &str {
    match user.strip_prefix("ssh") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => user,
    }
}
