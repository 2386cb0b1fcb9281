// src/metadata.rs

//! Static engine description used for discovery.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInfo {
    pub name: &'static str,
    pub names: &'static [&'static str],
    pub language: &'static str,
    pub engine_version: &'static str,
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
}

pub const ENGINE_INFO: EngineInfo = EngineInfo {
    name: "perl",
    names: &["perl", "pearl", "Perl"],
    language: "perl",
    engine_version: env!("CARGO_PKG_VERSION"),
    extensions: &["pl", "pm", "t", "pod"],
    mime_types: &["application/x-perl"],
};

impl EngineInfo {
    /// Whether `name` (case-sensitive) refers to this engine.
    pub fn answers_to(&self, name: &str) -> bool {
        self.names.contains(&name)
    }

    /// Whether files with `extension` (with or without the dot) belong here.
    pub fn handles_extension(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_the_perl_engine() {
        assert!(ENGINE_INFO.answers_to("Perl"));
        assert!(!ENGINE_INFO.answers_to("python"));
        assert!(ENGINE_INFO.handles_extension(".pl"));
        assert!(ENGINE_INFO.handles_extension("PM"));
        assert_eq!(ENGINE_INFO.mime_types, &["application/x-perl"]);
    }
}
