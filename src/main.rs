extern crate clap;
extern crate fdfs_client;
#[macro_use]
extern crate slog;
extern crate sloggers;
#[macro_use]
extern crate trackable;

use clap::{App, Arg, ArgMatches, SubCommand};
use fdfs_client::{
    generate_slave_filename, generate_token, ClientConfig, Error, ErrorKind, Metadata,
    MetadataMode, Result, ServerAddr, TrackerClient, TrackerClientBuilder,
};
use sloggers::Build;
use std::fs::File;
use std::time::{SystemTime, UNIX_EPOCH};
use trackable::error::ErrorKindExt;

mod build_information {
    include!(concat!(env!("OUT_DIR"), "/build_information.rs"));
}

fn main() {
    let long_version = format!(
        "{} ({}, {})",
        env!("CARGO_PKG_VERSION"),
        build_information::BUILD_PROFILE,
        build_information::BUILD_VERSION
    );
    let matches = App::new("fdfs")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version.as_str())
        .arg(
            Arg::with_name("CONFIG")
                .long("config")
                .takes_value(true)
                .conflicts_with("TRACKER"),
        ).arg(
            Arg::with_name("TRACKER")
                .long("tracker")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        ).arg(
            Arg::with_name("LOGLEVEL")
                .short("l")
                .long("loglevel")
                .takes_value(true)
                .possible_values(&["debug", "info", "warning", "error"])
                .default_value("warning"),
        ).subcommand(
            SubCommand::with_name("upload")
                .arg(Arg::with_name("FILE").index(1).required(true))
                .arg(Arg::with_name("GROUP").long("group").takes_value(true))
                .arg(Arg::with_name("EXT").long("ext").takes_value(true))
                .arg(metadata_arg()),
        ).subcommand(
            SubCommand::with_name("get-metadata")
                .arg(Arg::with_name("GROUP").index(1).required(true))
                .arg(Arg::with_name("FILENAME").index(2).required(true)),
        ).subcommand(
            SubCommand::with_name("set-metadata")
                .arg(Arg::with_name("GROUP").index(1).required(true))
                .arg(Arg::with_name("FILENAME").index(2).required(true))
                .arg(Arg::with_name("MERGE").long("merge"))
                .arg(metadata_arg()),
        ).subcommand(
            SubCommand::with_name("token")
                .arg(Arg::with_name("FILENAME").index(1).required(true))
                .arg(
                    Arg::with_name("SECRET")
                        .long("secret")
                        .takes_value(true)
                        .required(true),
                ).arg(Arg::with_name("TIMESTAMP").long("timestamp").takes_value(true)),
        ).subcommand(
            SubCommand::with_name("slave-filename")
                .arg(Arg::with_name("MASTER").index(1).required(true))
                .arg(Arg::with_name("SUFFIX").index(2).required(true)),
        ).get_matches();

    // Logger
    let loglevel = match matches.value_of("LOGLEVEL").unwrap() {
        "debug" => sloggers::types::Severity::Debug,
        "info" => sloggers::types::Severity::Info,
        "warning" => sloggers::types::Severity::Warning,
        "error" => sloggers::types::Severity::Error,
        _ => unreachable!(),
    };
    let mut logger_builder = sloggers::terminal::TerminalLoggerBuilder::new();
    logger_builder.level(loglevel);
    logger_builder.destination(sloggers::terminal::Destination::Stderr);
    let logger = track_try_unwrap!(logger_builder.build());

    // SubCommands
    if let Some(sub) = matches.subcommand_matches("token") {
        // GENERATE TOKEN
        let filename = sub.value_of("FILENAME").unwrap();
        let secret = sub.value_of("SECRET").unwrap();
        let timestamp = if let Some(t) = sub.value_of("TIMESTAMP") {
            track_try_unwrap!(t.parse::<i64>().map_err(Error::from))
        } else {
            track_try_unwrap!(now_millis())
        };
        println!("{}", generate_token(filename, timestamp, secret));
    } else if let Some(sub) = matches.subcommand_matches("slave-filename") {
        // GENERATE SLAVE FILENAME
        let master = sub.value_of("MASTER").unwrap();
        let suffix = sub.value_of("SUFFIX").unwrap();
        println!("{}", track_try_unwrap!(generate_slave_filename(master, suffix)));
    } else if let Some(sub) = matches.subcommand_matches("upload") {
        // UPLOAD
        let client = track_try_unwrap!(make_client(&logger, &matches));
        let path = sub.value_of("FILE").unwrap();
        let ext = sub
            .value_of("EXT")
            .map(|e| e.to_owned())
            .or_else(|| {
                std::path::Path::new(path)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
            }).unwrap_or_default();
        let metadata = track_try_unwrap!(parse_metadata(sub));

        let file = track_try_unwrap!(File::open(path).map_err(Error::from));
        let size = track_try_unwrap!(file.metadata().map_err(Error::from)).len();
        let result = client
            .get_store_storage(sub.value_of("GROUP"))
            .and_then(|storage| storage.upload(file, size, &ext, &metadata));
        let uploaded = track_try_unwrap!(finish(&client, result));
        info!(logger, "Uploaded"; "file" => path, "size" => size);
        println!("{}", uploaded);
    } else if let Some(sub) = matches.subcommand_matches("get-metadata") {
        // GET METADATA
        let client = track_try_unwrap!(make_client(&logger, &matches));
        let group = sub.value_of("GROUP").unwrap();
        let filename = sub.value_of("FILENAME").unwrap();
        let result = client
            .get_store_storage(Some(group))
            .and_then(|storage| storage.get_metadata(group, filename));
        let metadata = track_try_unwrap!(finish(&client, result));
        let mut entries = metadata.into_iter().collect::<Vec<_>>();
        entries.sort();
        for (key, value) in entries {
            println!("{}={}", key, value);
        }
    } else if let Some(sub) = matches.subcommand_matches("set-metadata") {
        // SET METADATA
        let client = track_try_unwrap!(make_client(&logger, &matches));
        let group = sub.value_of("GROUP").unwrap();
        let filename = sub.value_of("FILENAME").unwrap();
        let mode = if sub.is_present("MERGE") {
            MetadataMode::Merge
        } else {
            MetadataMode::Overwrite
        };
        let metadata = track_try_unwrap!(parse_metadata(sub));
        let result = client
            .get_store_storage(Some(group))
            .and_then(|storage| storage.override_or_merge_metadata(mode, group, filename, &metadata));
        track_try_unwrap!(finish(&client, result));
    } else {
        println!("{}", matches.usage());
        std::process::exit(1);
    }
}

fn metadata_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("METADATA")
        .long("meta")
        .takes_value(true)
        .multiple(true)
        .number_of_values(1)
        .help("KEY=VALUE")
}

fn make_client(logger: &slog::Logger, matches: &ArgMatches) -> Result<TrackerClient> {
    let config = if let Some(path) = matches.value_of("CONFIG") {
        track!(ClientConfig::load(path))?
    } else {
        let trackers = matches
            .values_of("TRACKER")
            .into_iter()
            .flatten()
            .map(|t| t.parse())
            .collect::<Result<Vec<ServerAddr>>>();
        ClientConfig {
            trackers: track!(trackers)?,
            pool: Default::default(),
            connection: Default::default(),
        }
    };
    let mut builder = TrackerClientBuilder::from_config(&config);
    builder.logger(logger.clone());
    track!(builder.finish(&config.trackers))
}

fn parse_metadata(matches: &ArgMatches) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for entry in matches.values_of("METADATA").into_iter().flatten() {
        let i = track_assert_some!(
            entry.find('='),
            ErrorKind::InvalidInput,
            "metadata must be KEY=VALUE: {:?}",
            entry
        );
        metadata.insert(entry[..i].to_owned(), entry[i + 1..].to_owned());
    }
    Ok(metadata)
}

fn now_millis() -> Result<i64> {
    let elapsed = track!(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::from(ErrorKind::Other.cause(e))))?;
    Ok(elapsed.as_secs() as i64 * 1000 + i64::from(elapsed.subsec_millis()))
}

/// 操作の成否に関わらずクライアントを閉じ、操作の結果を返す。
fn finish<T>(client: &TrackerClient, result: Result<T>) -> Result<T> {
    let closed = client.close();
    let value = track!(result)?;
    track!(closed)?;
    Ok(value)
}
