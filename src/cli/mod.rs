pub mod commands;

use clap::{value_parser, Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("energy_meter_collector")
        .version(crate::VERSION)
        .about("Polls an energy meter over Modbus TCP or the framed socket protocol and serves the latest readings")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging")
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .help("Acquisition interval in seconds"),
        )
        .arg(
            Arg::new("transport")
                .short('t')
                .long("transport")
                .value_parser(["fieldbus", "framed_socket"])
                .help("Acquisition path")
                .global(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .help("Meter or acquisition server host")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_parser(value_parser!(u16))
                .help("Meter or acquisition server port")
                .global(true),
        )
        .arg(
            Arg::new("byte-order")
                .short('b')
                .long("byte-order")
                .value_name("ORDER")
                .help("Register word order: straight or word_swapped")
                .global(true),
        )
        .arg(
            Arg::new("api-port")
                .long("api-port")
                .value_parser(value_parser!(u16))
                .help("HTTP API port"),
        )
        .subcommand(
            Command::new("read-once")
                .about("Run a single acquisition cycle and print the readings")
                .arg(
                    Arg::new("no-save")
                        .long("no-save")
                        .action(ArgAction::SetTrue)
                        .help("Do not persist the readings"),
                ),
        )
        .subcommand(
            Command::new("probe")
                .about("Print every interpretation of each configured register pair"),
        )
        .subcommand(
            Command::new("frame")
                .about("Encode or decode frames of the socket protocol")
                .subcommand_required(true)
                .subcommand(
                    Command::new("encode")
                        .about("Wrap a payload into a frame")
                        .arg(Arg::new("payload").required(true)),
                )
                .subcommand(
                    Command::new("decode")
                        .about("Validate a frame and print its payload")
                        .arg(Arg::new("frame").required(true)),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write a configuration template")
                .arg(Arg::new("path").default_value("config.toml"))
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing file"),
                ),
        )
}
