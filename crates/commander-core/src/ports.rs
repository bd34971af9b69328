//! Port mapping normalization.

/// Normalizes a list of `host:container` port mappings.
///
/// A bare integer `n` expands to `n:n`. Either side of an explicit pair may
/// be empty and is preserved as given. Duplicates are discarded, keeping the
/// first occurrence. Normalization is idempotent.
#[must_use]
pub fn normalize_ports(ports: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(ports.len());
    for port in ports {
        let mapping = normalize_port(port);
        if !seen.contains(&mapping) {
            seen.push(mapping);
        }
    }
    seen
}

fn normalize_port(port: &str) -> String {
    let port = port.trim();
    if port.contains(':') {
        port.to_string()
    } else {
        format!("{port}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(input: &[&str]) -> Vec<String> {
        let owned: Vec<String> = input.iter().map(|s| (*s).to_string()).collect();
        normalize_ports(&owned)
    }

    #[test]
    fn bare_port_expands_to_pair() {
        assert_eq!(normalize(&["80"]), vec!["80:80"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        assert_eq!(
            normalize(&["80", "443:443", "8080:80", "80"]),
            vec!["80:80", "443:443", "8080:80"]
        );
    }

    #[test]
    fn duplicate_detected_across_spellings() {
        assert_eq!(normalize(&["80:80", "80"]), vec!["80:80"]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize(&["80", "443:443", "8080:80", "80"]);
        let twice = normalize_ports(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize(&[]), Vec::<String>::new());
    }
}
