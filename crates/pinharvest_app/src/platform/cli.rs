use std::path::PathBuf;

use clap::Parser;

/// Downloads full-resolution pin images for a list of search prompts.
#[derive(Parser, Debug, Default)]
#[command(name = "pinharvest", version, about)]
pub struct Args {
    /// Prompts separated by commas or newlines, or `@path` to read them from a file
    pub prompts: Option<String>,

    /// Images to fetch per prompt
    #[arg(short = 'n', long = "count")]
    pub count: Option<usize>,

    /// Log debug detail to the terminal
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    /// Directory the dated run folder is created in
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of consumer tasks per stage
    #[arg(long)]
    pub consumers: Option<usize>,

    /// Simultaneous outbound connections per stage
    #[arg(long)]
    pub connections: Option<usize>,

    /// RON file with default settings; flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_flags_parse() {
        let args = Args::try_parse_from([
            "pinharvest",
            "cats, dogs",
            "-n",
            "25",
            "--debug",
            "--output",
            "out",
            "--consumers",
            "4",
        ])
        .unwrap();
        assert_eq!(args.prompts.as_deref(), Some("cats, dogs"));
        assert_eq!(args.count, Some(25));
        assert!(args.debug);
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.consumers, Some(4));
        assert_eq!(args.connections, None);
    }

    #[test]
    fn prompts_are_optional_when_a_config_supplies_them() {
        let args = Args::try_parse_from(["pinharvest", "--config", "run.ron"]).unwrap();
        assert_eq!(args.prompts, None);
        assert_eq!(args.config, Some(PathBuf::from("run.ron")));
    }

    #[test]
    fn count_must_be_a_number() {
        assert!(Args::try_parse_from(["pinharvest", "cats", "-n", "many"]).is_err());
    }
}
