//! Command-line interface definitions for Blog Harvest.
//!
//! Flags override the YAML configuration; the configuration path itself may
//! also come from `BLOG_HARVEST_CONFIG`.

use clap::Parser;

/// Command-line arguments for the Blog Harvest binary.
///
/// # Examples
///
/// ```sh
/// # Every source, JSON lines on stdout
/// blog_harvest
///
/// # Two sources, at most 10 posts each, written under ./out
/// blog_harvest -s "Martin Kleppmann" -s "Meta Engineering" -l 10 -o ./out
///
/// # Show the registered sources
/// blog_harvest --list-sources
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source to scrape (repeatable); all sources when omitted
    #[arg(short, long = "sources", value_name = "NAME")]
    pub sources: Vec<String>,

    /// Maximum posts per source
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Concurrent post fetches for index-based sources
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Optional path to a config.yaml file
    #[arg(short, long, env = "BLOG_HARVEST_CONFIG")]
    pub config: Option<String>,

    /// Directory for per-source JSON files; JSON lines go to stdout when omitted
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Print the registered source names and exit
    #[arg(long)]
    pub list_sources: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["blog_harvest"]);
        assert!(cli.sources.is_empty());
        assert_eq!(cli.limit, None);
        assert_eq!(cli.workers, None);
        assert_eq!(cli.output_dir, None);
        assert!(!cli.list_sources);
    }

    #[test]
    fn test_cli_repeated_sources() {
        let cli = Cli::parse_from([
            "blog_harvest",
            "--sources",
            "Martin Kleppmann",
            "--sources",
            "Meta Engineering",
            "--limit",
            "10",
        ]);
        assert_eq!(cli.sources, vec!["Martin Kleppmann", "Meta Engineering"]);
        assert_eq!(cli.limit, Some(10));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "blog_harvest",
            "-s",
            "Lyft Engineering",
            "-w",
            "8",
            "-c",
            "/etc/blog_harvest.yaml",
            "-o",
            "/tmp/out",
        ]);
        assert_eq!(cli.sources, vec!["Lyft Engineering"]);
        assert_eq!(cli.workers, Some(8));
        assert_eq!(cli.config.as_deref(), Some("/etc/blog_harvest.yaml"));
        assert_eq!(cli.output_dir.as_deref(), Some("/tmp/out"));
    }

    #[test]
    fn test_cli_list_sources() {
        let cli = Cli::parse_from(["blog_harvest", "--list-sources"]);
        assert!(cli.list_sources);
    }
}
