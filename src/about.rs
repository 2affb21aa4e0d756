pub const COVPHYLO_DISPLAY_VERSION: &str = env!("COVPHYLO_DISPLAY_VERSION");
pub const COVPHYLO_BUILD_N: &str = env!("COVPHYLO_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "covphylo {}\nBuild {}\nIncremental alignment tracker for viral sequence lineages",
        COVPHYLO_DISPLAY_VERSION, COVPHYLO_BUILD_N
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_text_names_build() {
        let text = version_cli_text();
        assert!(text.starts_with("covphylo "));
        assert!(text.contains(COVPHYLO_BUILD_N));
    }
}
