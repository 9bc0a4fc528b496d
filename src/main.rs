use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::fs::File;
use std::path::PathBuf;

use ipam_audit::checker::IpamChecker;
use ipam_audit::datastore::SnapshotDatastore;

/// Consistency checker for cluster IPAM allocation data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the datastore snapshot YAML file
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Print every address as it is scanned
    #[arg(long)]
    show_all_ips: bool,

    /// Print the addresses that have problems
    #[arg(long)]
    show_problem_ips: bool,

    /// Write the report as JSON to this path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting IPAM consistency check");
    info!("Snapshot file: {:?}", args.snapshot);

    let datastore = SnapshotDatastore::load(&args.snapshot)
        .wrap_err_with(|| format!("Failed to load snapshot '{}'", args.snapshot.display()))?;

    let checker = IpamChecker::new(&datastore, args.show_all_ips, args.show_problem_ips);
    let report = checker.check()?;

    if let Some(output) = &args.output {
        let file = File::create(output)
            .wrap_err_with(|| format!("Failed to create report file '{}'", output.display()))?;
        serde_json::to_writer_pretty(file, &report)
            .wrap_err("Failed to serialize report")?;
        info!("Report written to: {:?}", output);
    }

    info!("IPAM consistency check completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(&[
            "ipam-audit",
            "--snapshot", "snapshot.yaml",
        ]);

        assert_eq!(args.snapshot, PathBuf::from("snapshot.yaml"));
        assert!(!args.show_all_ips);
        assert!(!args.show_problem_ips);
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_verbosity_flags() {
        let args = Args::parse_from(&[
            "ipam-audit",
            "--snapshot", "snapshot.yaml",
            "--show-all-ips",
            "--show-problem-ips",
        ]);

        assert!(args.show_all_ips);
        assert!(args.show_problem_ips);
    }

    #[test]
    fn test_output_arg() {
        let args = Args::parse_from(&[
            "ipam-audit",
            "--snapshot", "snapshot.yaml",
            "--output", "report.json",
        ]);

        assert_eq!(args.output, Some(PathBuf::from("report.json")));
    }
}
