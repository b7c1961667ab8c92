//! Message prefix parsing.
//!
//! A prefix identifies the origin of a message: either a server name or a
//! user's `nick!user@host` mask.

use std::fmt;
use std::str::FromStr;

/// The origin of a message.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
    /// A server name (contains a dot and no `!`/`@`).
    ServerName(String),
    /// A user origin: (nickname, username, hostname). Username and hostname
    /// may be empty when the server sends a bare nick.
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix string. Lenient: never fails, mirroring how servers
    /// in the wild populate this field.
    pub fn new_from_str(s: &str) -> Self {
        let (before_host, host) = match s.find('@') {
            Some(at) => (&s[..at], &s[at + 1..]),
            None => (s, ""),
        };
        let (name, user) = match before_host.find('!') {
            Some(bang) => (&before_host[..bang], &before_host[bang + 1..]),
            None => (before_host, ""),
        };

        // A dotted name with no user/host parts is a server.
        if user.is_empty() && host.is_empty() && name.contains('.') {
            Prefix::ServerName(name.to_string())
        } else {
            Prefix::Nickname(name.to_string(), user.to_string(), host.to_string())
        }
    }

    /// The nickname, if this is a user origin with a non-empty nick.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// The username, if present.
    pub fn user(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(_, user, _) if !user.is_empty() => Some(user),
            _ => None,
        }
    }

    /// The hostname: the server name itself, or the host part of a user mask.
    pub fn host(&self) -> Option<&str> {
        match self {
            Prefix::ServerName(name) => Some(name),
            Prefix::Nickname(_, _, host) if !host.is_empty() => Some(host),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{name}"),
            Prefix::Nickname(nick, user, host) => {
                write!(f, "{nick}")?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Prefix {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Prefix::new_from_str(s))
    }
}
