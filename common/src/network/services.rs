/// Well-known TCP service name for `port`, or `"unknown"`.
pub fn service_name(port: u16) -> &'static str {
    match port {
        20 | 21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 | 587 => "smtp",
        53 => "dns",
        80 | 8000 | 8080 => "http",
        88 => "kerberos",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios",
        143 => "imap",
        161 => "snmp",
        179 => "bgp",
        389 => "ldap",
        443 | 8443 => "https",
        445 => "smb",
        515 => "printer",
        548 => "afp",
        631 => "ipp",
        993 => "imaps",
        995 => "pop3s",
        1433 => "mssql",
        1883 => "mqtt",
        2049 => "nfs",
        3306 => "mysql",
        3389 => "rdp",
        5000 => "upnp",
        5009 => "airport",
        5432 => "postgres",
        5900 => "vnc",
        6379 => "redis",
        7000 => "airplay",
        8009 => "ajp",
        9100 => "jetdirect",
        62078 => "lockdown",
        _ => "unknown",
    }
}

/// Ports that speak HTTP and need a request before they say anything.
pub fn is_http_port(port: u16) -> bool {
    matches!(port, 80 | 8000 | 8080)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ports_have_names() {
        assert_eq!(service_name(22), "ssh");
        assert_eq!(service_name(445), "smb");
        assert_eq!(service_name(3389), "rdp");
        assert_eq!(service_name(40_000), "unknown");
    }

    #[test]
    fn http_ports() {
        assert!(is_http_port(8080));
        assert!(!is_http_port(443));
    }
}
