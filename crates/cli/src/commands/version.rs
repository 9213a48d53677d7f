/// Name and version line printed by `rkcache version`
#[must_use]
pub fn get_version_info() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let description = env!("CARGO_PKG_DESCRIPTION");

    tracing::debug!(package_version = version, "Gathering package information");

    format!("rkcache {version}\n{description}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_version_info_format() {
        let info = get_version_info();
        assert!(info.starts_with(&format!("rkcache {}", env!("CARGO_PKG_VERSION"))));
        assert!(info.contains("build artifact cache"));
    }
}
