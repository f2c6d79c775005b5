//! Default port numbers for the URI schemes the host acquisition mode
//! understands. The table is fixed; an unknown scheme without an explicit
//! port is a configuration problem, not something to guess around.

/// Scheme name to default port, in the order the schemes are documented.
pub const DEFAULT_PORTS: [(&str, u16); 23] = [
    ("http", 80),
    ("https", 443),
    ("ftp", 21),
    ("sftp", 22),
    ("ftps", 990),
    ("smtp", 25),
    ("smtps", 465),
    ("pop3", 110),
    ("pop3s", 995),
    ("imap", 143),
    ("imaps", 993),
    ("ldap", 389),
    ("ldaps", 636),
    ("ssh", 22),
    ("telnet", 23),
    ("nntp", 119),
    ("gopher", 70),
    ("rtsp", 554),
    ("mysql", 3306),
    ("postgresql", 5432),
    ("redis", 6379),
    ("mongodb", 27017),
    ("smb", 445),
];

/// Looks up the default port for a URI scheme.
pub fn default_port(scheme: &str) -> Option<u16> {
    DEFAULT_PORTS
        .iter()
        .find(|(name, _)| *name == scheme)
        .map(|(_, port)| *port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_schemes() {
        assert_eq!(default_port("https"), Some(443));
        assert_eq!(default_port("mongodb"), Some(27017));
        assert_eq!(default_port("smb"), Some(445));
        assert_eq!(default_port("http"), Some(80));
    }

    #[test]
    fn test_unknown_scheme() {
        assert_eq!(default_port("gemini"), None);
        assert_eq!(default_port(""), None);
    }

    #[test]
    fn test_table_size() {
        assert_eq!(DEFAULT_PORTS.len(), 23);
    }
}
