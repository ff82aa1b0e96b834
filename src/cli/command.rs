use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(
        about = "Run one ingestion and print its report",
        long_about = "Fetch the manifest, process every selected set and print the run report as JSON. Exits non-zero only when the run could not start (manifest unavailable or credentials rejected)."
    )]
    Ingest {
        #[arg(
            long,
            default_value_t = false,
            help = "Only process the sets the last saved run failed or left unfinished"
        )]
        retry_failed: bool,
    },
    #[command(
        about = "Fuzzy search the local name index",
        long_about = "Look up card names in the trigram index built by previous runs."
    )]
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, default_value_t = 10usize, value_name = "N")]
        limit: usize,
    },
}
