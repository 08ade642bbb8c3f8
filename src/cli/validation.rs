//! Value parsers for command line arguments.

use std::net::IpAddr;
use std::path::PathBuf;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_ROLLBACK_STEPS: u32 = 20;

pub fn validate_port(port_str: &str) -> Result<u16, String> {
    match port_str.parse::<u16>() {
        Ok(0) => Err("Port 0 is not allowed; pick a port between 1 and 65535".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("Port must be a number between 1 and 65535, got: '{}'", port_str)),
    }
}

/// The file must exist, be a regular file and be readable.
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);
    if !path.is_file() {
        return Err(format!("Configuration file does not exist or is not a file: '{}'", path_str));
    }
    std::fs::File::open(&path)
        .map(|_| path)
        .map_err(|e| format!("Cannot read configuration file '{}': {}", path_str, e))
}

pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str
        .parse()
        .map_err(|_| format!("Rollback steps must be a positive number, got: '{}'", steps_str))?;
    if steps == 0 || steps > MAX_ROLLBACK_STEPS {
        return Err(format!("Rollback steps must be between 1 and {}", MAX_ROLLBACK_STEPS));
    }
    Ok(steps)
}

/// An IP literal or a hostname. Dotted digits must form a valid IPv4 address.
pub fn validate_host_address(host_str: &str) -> Result<String, String> {
    let host = host_str.trim();
    if host.is_empty() {
        return Err("Host address cannot be empty".to_string());
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(host.to_string());
    }
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(format!("Invalid IPv4 address: '{}'", host_str));
    }
    if host.len() > MAX_HOSTNAME_LEN {
        return Err(format!("Host address is longer than {} characters", MAX_HOSTNAME_LEN));
    }
    if !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(format!("Invalid hostname: '{}'", host_str));
    }
    Ok(host.to_string())
}

/// Node names appear in URL paths of the cluster API.
pub fn validate_node_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Node name cannot be empty".to_string());
    }
    if !name.is_ascii() || name.contains('/') || name.contains(char::is_whitespace) {
        return Err(format!("Node name must be ASCII without '/' or spaces, got: '{}'", name));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_bounds() {
        for port in ["1", "8080", "65535"] {
            assert!(validate_port(port).is_ok(), "{} should be valid", port);
        }
        for port in ["0", "65536", "-1", "http"] {
            assert!(validate_port(port).is_err(), "{} should be invalid", port);
        }
    }

    #[test]
    fn test_config_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(validate_config_file_path(path).unwrap(), file.path());

        let dir = tempfile::tempdir().unwrap();
        assert!(validate_config_file_path(dir.path().to_str().unwrap()).is_err());
        assert!(validate_config_file_path("/definitely/not/here.toml").is_err());
    }

    #[test]
    fn test_host_addresses() {
        for host in ["localhost", "127.0.0.1", "0.0.0.0", "::1", "node-a.internal"] {
            assert!(validate_host_address(host).is_ok(), "{} should be valid", host);
        }
        let long = "x".repeat(300);
        for host in ["", "   ", "host with spaces", "999.999.999.999", long.as_str()] {
            assert!(validate_host_address(host).is_err(), "'{}' should be invalid", host);
        }
    }

    #[test]
    fn test_rollback_steps() {
        assert_eq!(validate_rollback_steps("3"), Ok(3));
        for steps in ["0", "21", "-1", "abc", ""] {
            assert!(validate_rollback_steps(steps).is_err(), "'{}' should be invalid", steps);
        }
    }

    #[test]
    fn test_node_names() {
        assert_eq!(validate_node_name("node-a"), Ok("node-a".to_string()));
        for name in ["", "a/b", "node a", "nœud"] {
            assert!(validate_node_name(name).is_err(), "'{}' should be invalid", name);
        }
    }
}
