use std::path::PathBuf;

/// Arguments for the import command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ImportArgs {
    /// Path to the `.sts` metadata file
    pub sts: PathBuf,

    /// Output path for the JSON summary (optional)
    pub output: Option<PathBuf>,

    /// Import options file (TOML)
    pub options_file: Option<PathBuf>,

    /// Force collective-aware mergable sets
    pub consider_collectives: bool,

    /// Build cluster vectors for this metric
    pub metric: Option<String>,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Run every stage on the calling thread
    pub sequential: bool,
}

impl Default for ImportArgs {
    fn default() -> Self {
        Self {
            sts: PathBuf::new(),
            output: Some(PathBuf::from("summary.json")),
            options_file: None,
            consider_collectives: false,
            metric: None,
            print_summary: false,
            sequential: false,
        }
    }
}
