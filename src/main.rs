use std::process;

use clap::{command, Arg, ArgMatches, Command};

mod block;
mod core;
mod nbd;

use crate::core::{ServeConfig, DEFAULT_EXPORT, DEFAULT_FILE, DEFAULT_LISTEN};

fn cli() -> Command<'static> {
    command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Serve a block device over NBD")
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .help("Address to listen on")
                        .takes_value(true)
                        .default_value(DEFAULT_LISTEN),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .help("Name of the export")
                        .takes_value(true)
                        .default_value(DEFAULT_EXPORT),
                )
                .arg(
                    Arg::new("driver")
                        .long("driver")
                        .help("Block device driver")
                        .takes_value(true)
                        .possible_values(block::DRIVERS.iter().copied())
                        .default_value("file"),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .alias("config")
                        .help("Backing file (path or file:// URL) for `file`, size for `memory`")
                        .takes_value(true)
                        .default_value(DEFAULT_FILE),
                ),
        )
        .subcommand(
            Command::new("init")
                .about("Create a backing file for the file driver")
                .arg(
                    Arg::new("size")
                        .long("size")
                        .help("Size of the backing file, e.g. 512M or 10G")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .help("Path of the backing file")
                        .takes_value(true)
                        .default_value(DEFAULT_FILE),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Overwrite an existing backing file"),
                ),
        )
}

fn value(matches: &ArgMatches, name: &str) -> String {
    matches.value_of(name).unwrap_or_default().to_string()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    let result = match matches.subcommand() {
        Some(("serve", sub)) => crate::core::export_serve(ServeConfig {
            listen: value(sub, "listen"),
            export_name: value(sub, "export"),
            driver: value(sub, "driver"),
            conn_str: value(sub, "file"),
        }),
        Some(("init", sub)) => crate::core::export_init(
            &value(sub, "size"),
            &value(sub, "file"),
            sub.is_present("force"),
        ),
        _ => unreachable!("subcommand_required is set"),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        process::exit(1);
    }
}
