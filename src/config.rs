/// First node id handed out by the renumbering pass
pub const DEFAULT_START_NODE: u64 = 3;

/// Table prefix of the exported source site
pub const DEFAULT_SOURCE_PREFIX: &str = "uhm_";

/// Table prefix of the target schema
pub const DEFAULT_TARGET_PREFIX: &str = "d9c_";

/// Database name recorded on generated tables
pub const DEFAULT_DATABASE: &str = "sw_uhm";

/// Path prefix used by alias targets and in-content links (`/thing/42`)
pub const DEFAULT_LINK_PREFIX: &str = "thing";

/// Path prefix of structural alias sources (`node/42`)
pub const NODE_PATH_PREFIX: &str = "node";

/// First id handed out to files and aliases
pub const FIRST_RENUMBERED_ID: u64 = 1;

/// Language code stamped on every generated row
pub const LANG_CODE: &str = "en";

/// Old-school summary/body separator inside body text
pub const SUMMARY_BREAK: &str = "<!--break-->";

/// Legacy link form that the target site has no module for
pub const INTERNAL_LINK_MARKER: &str = "<a href=\"internal:";

/// Legacy link form whose path already starts at the site root
pub const INTERNAL_ROOT_LINK_MARKER: &str = "<a href=\"internal:/";

/// Replacement for [`INTERNAL_LINK_MARKER`] and [`INTERNAL_ROOT_LINK_MARKER`]
pub const ABSOLUTE_LINK_MARKER: &str = "<a href=\"/";

/// Body format used when the dump leaves it empty
pub const DEFAULT_BODY_FORMAT: &str = "1";

/// Source body formats and the target text format each maps to
pub const HTML_FORMATS: &[(&str, &str)] = &[("1", "basic_html"), ("3", "full_html")];

/// Row marker for the full-size variant in the `files` and `image` tables
pub const ORIGINAL_IMAGE_SIZE: &str = "_original";

/// Settings for one migration run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub start_node: u64,
    pub source_prefix: String,
    pub target_prefix: String,
    pub database: String,
    pub link_prefix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            start_node: DEFAULT_START_NODE,
            source_prefix: DEFAULT_SOURCE_PREFIX.to_string(),
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            link_prefix: DEFAULT_LINK_PREFIX.to_string(),
        }
    }
}

/// Target text format for a source body format, if the format is known
pub fn target_format(source: &str) -> Option<&'static str> {
    HTML_FORMATS
        .iter()
        .find(|(from, _)| *from == source)
        .map(|(_, to)| *to)
}
