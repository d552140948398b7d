//! Host spec parsing
//!
//! Turns the free-form `user@host:port` string typed into the host field into
//! a fully resolved [`HostSpec`]. Parsing never fails: anything missing or
//! malformed falls back to a default.

use std::fmt;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 22;

/// Normalized connection target. User and host are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl HostSpec {
    /// `host:port`, the dial address
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Parser seeded with the login to use when the spec names none.
#[derive(Debug, Clone)]
pub struct HostSpecParser {
    default_user: String,
}

impl HostSpecParser {
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            default_user: default_user.into(),
        }
    }

    pub fn default_user(&self) -> &str {
        &self.default_user
    }

    /// Parse `raw` into a [`HostSpec`].
    ///
    /// - Only the first `@` separates the user; later ones stay in the host.
    /// - Only the last `:` separates the port; earlier ones stay in the host.
    /// - A port that is not a number in `1..=65535` becomes 22.
    pub fn parse(&self, raw: &str) -> HostSpec {
        if raw.is_empty() {
            return HostSpec {
                user: self.default_user.clone(),
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            };
        }

        let (user, host_part) = match raw.split_once('@') {
            Some((user, rest)) => (user, rest),
            None => ("", raw),
        };

        let (host, port) = match host_part.rsplit_once(':') {
            Some((host, candidate)) => (host, parse_port(candidate)),
            None => (host_part, DEFAULT_PORT),
        };

        HostSpec {
            user: if user.is_empty() {
                self.default_user.clone()
            } else {
                user.to_string()
            },
            host: if host.is_empty() {
                DEFAULT_HOST.to_string()
            } else {
                host.to_string()
            },
            port,
        }
    }

    /// Parse `raw` and return the `(user, "host:port")` pair.
    pub fn split(&self, raw: &str) -> (String, String) {
        let spec = self.parse(raw);
        let host_port = spec.host_port();
        (spec.user, host_port)
    }
}

fn parse_port(candidate: &str) -> u16 {
    match candidate.parse::<u16>() {
        Ok(0) | Err(_) => DEFAULT_PORT,
        Ok(port) => port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> HostSpecParser {
        HostSpecParser::new("root")
    }

    fn split(raw: &str) -> (String, String) {
        parser().split(raw)
    }

    #[test]
    fn test_empty_spec() {
        assert_eq!(split(""), ("root".to_string(), "localhost:22".to_string()));
    }

    #[test]
    fn test_user_without_port() {
        assert_eq!(split("bob@myhost"), ("bob".to_string(), "myhost:22".to_string()));
    }

    #[test]
    fn test_host_with_port() {
        assert_eq!(split("myhost:2222"), ("root".to_string(), "myhost:2222".to_string()));
    }

    #[test]
    fn test_out_of_range_port() {
        assert_eq!(split("myhost:999999"), ("root".to_string(), "myhost:22".to_string()));
        assert_eq!(split("myhost:0"), ("root".to_string(), "myhost:22".to_string()));
        assert_eq!(split("myhost:-5"), ("root".to_string(), "myhost:22".to_string()));
        assert_eq!(split("myhost:ssh"), ("root".to_string(), "myhost:22".to_string()));
        assert_eq!(split("myhost:"), ("root".to_string(), "myhost:22".to_string()));
        assert_eq!(split("myhost:65535"), ("root".to_string(), "myhost:65535".to_string()));
    }

    #[test]
    fn test_only_first_at_splits_user() {
        assert_eq!(split("a@b@myhost:22"), ("a".to_string(), "b@myhost:22".to_string()));
    }

    #[test]
    fn test_only_last_colon_splits_port() {
        let spec = parser().parse("admin@[fe80::1]:2200");
        assert_eq!(spec.user, "admin");
        assert_eq!(spec.host, "[fe80::1]");
        assert_eq!(spec.port, 2200);
    }

    #[test]
    fn test_never_empty() {
        let spec = parser().parse("@:2222");
        assert_eq!(spec.user, "root");
        assert_eq!(spec.host, "localhost");
        assert_eq!(spec.port, 2222);

        let spec = parser().parse("bob@");
        assert_eq!(spec.to_string(), "bob@localhost:22");
    }

    #[test]
    fn test_default_user_is_injected() {
        let parser = HostSpecParser::new("pi");
        assert_eq!(parser.default_user(), "pi");
        assert_eq!(parser.parse("raspberry").to_string(), "pi@raspberry:22");
    }
}
