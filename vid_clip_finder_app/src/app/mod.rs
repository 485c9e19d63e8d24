mod arg_parse;

use arg_parse::{Args, Command};
use eyre::WrapErr;
use fingerprint_filesystem_store::{FfmpegVideoIndex, QueryResult, QueryStatus};
use log::debug;
use vid_clip_finder_lib::CancelToken;

pub fn run_app() -> i32 {
    let args = arg_parse::parse_args();
    configure_logs(args.verbose, args.quiet);

    match run_app_inner(&args) {
        Ok(()) => 0,
        Err(fatal_error) => {
            eprintln!("error: {fatal_error:#}");
            1
        }
    }
}

fn run_app_inner(args: &Args) -> eyre::Result<()> {
    let index = FfmpegVideoIndex::open_collection(&args.collection)
        .wrap_err_with(|| format!("opening collection at {}", args.collection.display()))?;
    debug!("opened collection at {} ({} entries)", args.collection.display(), index.len());

    match &args.command {
        Command::Sync => {
            let report = index.sync().wrap_err("syncing collection")?;
            index.save().wrap_err("saving store")?;
            println!(
                "synced: {} added, {} relinked, {} unchanged, {} removed, {} failed",
                report.added,
                report.relinked,
                report.unchanged,
                report.removed,
                report.failed.len()
            );
        }

        Command::Fingerprint { rerun } => {
            index.sync().wrap_err("syncing collection")?;
            let report = index
                .fingerprint_all(*rerun, &CancelToken::new())
                .wrap_err("fingerprinting collection")?;
            println!(
                "fingerprinted: {} done, {} skipped, {} failed",
                report.fingerprinted,
                report.skipped,
                report.failed.len()
            );
            for path in &report.failed {
                println!("  failed: {}", path.display());
            }
        }

        Command::Query { clip, json } => {
            let result = index.query(clip);
            if *json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_query_result(&result);
            }
        }

        Command::Status => {
            println!("state: {:?}", index.state());
            println!("entries: {}", index.len());
        }
    }

    Ok(())
}

fn print_query_result(result: &QueryResult) {
    match (&result.status, &result.best) {
        (QueryStatus::Match, Some(best)) => {
            println!(
                "{} at {} (confidence {:.2})",
                best.src_path.display(),
                format_timestamp(best.offset_secs),
                best.confidence
            );
        }
        (QueryStatus::AmbiguousMatch, Some(best)) => {
            println!(
                "ambiguous; best guess {} at {} (confidence {:.2})",
                best.src_path.display(),
                format_timestamp(best.offset_secs),
                best.confidence
            );
        }
        (status, _) => println!("no result: {status}"),
    }
}

fn format_timestamp(offset_secs: f64) -> String {
    let total = offset_secs.round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn configure_logs(verbosity: u8, quiet: bool) {
    use simplelog::*;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("TermLogger failed to initialize");
}

#[cfg(test)]
mod test {
    use super::format_timestamp;

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(40.2), "00:00:40");
        assert_eq!(format_timestamp(3725.0), "01:02:05");
    }
}
