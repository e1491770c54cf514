use clap::{Arg, Command};
use neutrino::chat::{ChatClient, ChatServer};
use neutrino::logging;
use neutrino::net::select::process_events;
use neutrino::net::sockets::SharedSockets;
use neutrino::sys::select::SystemSelector;
use neutrino::sys::sockets::SystemSockets;
use neutrino::sys::terminal::SystemTty;
use neutrino::terminal::SharedTty;
use std::cell::RefCell;
use std::fs;
use std::process;
use std::rc::Rc;

fn main() {
    let matches = Command::new("chat")
        .about("Null-terminated line chat between a server and its clients")
        .subcommand_required(true)
        .arg(
            Arg::new("log-config")
                .long("log-config")
                .value_name("FILE")
                .global(true)
                .help("TOML logger configuration"),
        )
        .subcommand(Command::new("server").about("Listen for chat clients"))
        .subcommand(Command::new("client").about("Connect to a local chat server"))
        .get_matches();

    let log = match matches.get_one::<String>("log-config") {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|err| {
                eprintln!("Unable to read {}: {}", path, err);
                process::exit(1);
            });

            logging::from_toml(&text).unwrap_or_else(|err| {
                eprintln!("Invalid logging config: {}", err);
                process::exit(1);
            })
        }
        None => logging::init(),
    };

    let sockets: SharedSockets = Rc::new(RefCell::new(SystemSockets::new()));
    let tty: SharedTty = Rc::new(RefCell::new(SystemTty::new()));
    let mut selector = SystemSelector::new();

    let status = match matches.subcommand() {
        Some(("server", _)) => run_server(sockets, tty, &mut selector, &log),
        Some(("client", _)) => run_client(sockets, tty, &mut selector, &log),
        _ => unreachable!(),
    };

    process::exit(status);
}

fn run_server(
    sockets: SharedSockets,
    tty: SharedTty,
    selector: &mut SystemSelector,
    log: &logging::Logger,
) -> i32 {
    let mut server = ChatServer::new(sockets, tty, log);
    let started = server.start();

    while server.is_active() {
        process_events(selector, &mut [&mut server]);
    }

    if started {
        0
    } else {
        1
    }
}

fn run_client(
    sockets: SharedSockets,
    tty: SharedTty,
    selector: &mut SystemSelector,
    log: &logging::Logger,
) -> i32 {
    let mut client = ChatClient::new(sockets, tty, log);

    client.start();

    while client.is_active() {
        process_events(selector, &mut [&mut client]);
    }

    0
}
