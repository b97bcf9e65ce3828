use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::process;
use std::str::FromStr;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{info, LevelFilter};

use netbridge::prelude::*;
use netbridge_client::config::{self, Config};
use netbridge_client::{BodyHandle, Dispatcher, Event, EventQueue};

fn setup_logging(level: &str) -> Result<(), String> {
    let level = LevelFilter::from_str(level).map_err(|_| format!("Invalid log level '{}'", level))?;

    let dirs = config::project_dirs().ok_or("Error getting project directories")?;
    let dir = dirs.data_dir().join("logs");
    fs::create_dir_all(&dir)
        .map_err(|err| format!("Error creating log dirs ({}): {}", dir.to_string_lossy(), err))?;

    let log_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dir.join(chrono::Local::now().format("netbridge_%Y-%m-%d_%H-%M-%S.log").to_string()))
        .map_err(|err| format!("Error opening log file: {}", err))?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] [{}] {}",
                chrono::Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .chain(log_file)
        .apply()
        .map_err(|err| format!("Error setting logger settings: {}", err))?;

    info!("Logging set up");
    Ok(())
}

fn header_args() -> [Arg; 2] {
    [
        Arg::new("header")
            .short('H')
            .long("header")
            .value_name("NAME=VALUE")
            .help("Sets a request header, overriding the defaults")
            .action(ArgAction::Append),
        Arg::new("unset")
            .long("unset")
            .value_name("NAME")
            .help("Removes a default header")
            .action(ArgAction::Append),
    ]
}

fn cli() -> Command {
    Command::new("netbridge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs HTTP and WebSocket operations through the event bridge")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Overrides the log level from the config file")
                .global(true),
        )
        .subcommand(
            Command::new("check")
                .about("Checks whether a URL would be accepted")
                .arg(Arg::new("url").required(true)),
        )
        .subcommand(
            Command::new("request")
                .about("Performs an HTTP request and prints the response")
                .arg(Arg::new("url").required(true))
                .arg(Arg::new("body").long("body").value_name("BODY").help("Sends a body (POST by default)"))
                .arg(
                    Arg::new("binary")
                        .long("binary")
                        .help("Sends and receives raw bytes")
                        .action(ArgAction::SetTrue),
                )
                .arg(Arg::new("method").long("method").value_name("METHOD"))
                .args(header_args()),
        )
        .subcommand(
            Command::new("websocket")
                .about("Opens a WebSocket and prints the messages it receives")
                .arg(Arg::new("url").required(true))
                .arg(
                    Arg::new("send")
                        .long("send")
                        .value_name("TEXT")
                        .help("Sends a message once connected")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("messages")
                        .long("messages")
                        .value_name("N")
                        .help("Closes the connection after N messages")
                        .value_parser(value_parser!(usize)),
                )
                .args(header_args()),
        )
}

/// Builds the header table a script would pass: `-H` entries set a header, `--unset` entries map
/// to nil.
fn headers_table(args: &ArgMatches) -> Result<ScriptValue, String> {
    let mut table = ScriptTable::new();

    for header in args.get_many::<String>("header").into_iter().flatten() {
        let (name, value) = header
            .split_once('=')
            .ok_or_else(|| format!("Header '{}' is not of the form NAME=VALUE", header))?;
        table.set(name.trim(), value.trim());
    }

    for name in args.get_many::<String>("unset").into_iter().flatten() {
        table.set(name.as_str(), ScriptValue::Nil);
    }

    Ok(table.into())
}

fn request_options(args: &ArgMatches) -> ScriptValue {
    let mut options = ScriptTable::new();
    if let Some(method) = args.get_one::<String>("method") {
        options.set("method", method.as_str());
    }
    if args.get_flag("binary") {
        options.set("binary", true);
    }
    options.into()
}

fn check(args: &ArgMatches) -> i32 {
    let url = args.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    if check_url(url) {
        println!("{} is accepted", url);
        0
    } else {
        println!("{} is rejected", url);
        1
    }
}

fn request(dispatcher: &Dispatcher, events: &mut EventQueue, args: &ArgMatches) -> Result<i32, String> {
    let url = args.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    let body: ScriptValue = args.get_one::<String>("body").map(String::as_str).into();
    let headers = headers_table(args)?;
    let options = request_options(args);

    let id = dispatcher
        .request_async(url, &body, &headers, &options)
        .map_err(|err| err.to_string())?;

    while let Some(event) = events.wait() {
        if event.id() != id {
            continue;
        }

        match event {
            Event::HttpResponse { response, mut body, .. } => {
                let envelope = serde_json::to_string_pretty(&response).map_err(|err| err.to_string())?;
                println!("{}", envelope);
                print_body(&mut body).map_err(|err| err.to_string())?;
                return Ok(if response.success { 0 } else { 1 });
            }
            Event::HttpFailure { message, .. } => {
                eprintln!("Request failed: {}", message);
                return Ok(1);
            }
            _ => {}
        }
    }

    Err("Event queue closed".to_owned())
}

fn print_body(body: &mut BodyHandle) -> netbridge_client::Result<()> {
    let mut stdout = io::stdout();
    match body {
        BodyHandle::Text(handle) => stdout.write_all(handle.read_all()?.as_bytes())?,
        BodyHandle::Binary(handle) => stdout.write_all(&handle.read_all()?)?,
    }
    stdout.flush()?;
    Ok(())
}

fn websocket(dispatcher: &Dispatcher, events: &mut EventQueue, args: &ArgMatches) -> Result<i32, String> {
    let url = args.get_one::<String>("url").map(String::as_str).unwrap_or_default();
    let headers = headers_table(args)?;
    let limit = args.get_one::<usize>("messages").copied();

    let id = dispatcher
        .websocket_async(url, &headers)
        .map_err(|err| err.to_string())?;

    let mut connection = None;
    let mut received = 0;

    while let Some(event) = events.wait() {
        if event.id() != id {
            continue;
        }

        match event {
            Event::WebsocketConnect { handle, .. } => {
                info!("Connected to {}", url);
                for text in args.get_many::<String>("send").into_iter().flatten() {
                    handle.send(text.as_str()).map_err(|err| err.to_string())?;
                }
                if limit == Some(0) {
                    handle.close();
                }
                connection = Some(handle);
            }
            Event::WebsocketMessage { text, .. } => {
                println!("{}", text);
                received += 1;
                if limit == Some(received) {
                    if let Some(handle) = &connection {
                        handle.close();
                    }
                }
            }
            Event::WebsocketClose { .. } => return Ok(0),
            Event::WebsocketFailure { message, .. } => {
                eprintln!("Connection failed: {}", message);
                return Ok(1);
            }
            _ => {}
        }
    }

    Err("Event queue closed".to_owned())
}

fn run(config: &Config, args: &ArgMatches) -> Result<i32, String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Error starting runtime: {}", err))?;

    let (dispatcher, mut events) =
        Dispatcher::new(&config.http, runtime.handle().clone()).map_err(|err| err.to_string())?;

    match args.subcommand() {
        Some(("request", sub)) => request(&dispatcher, &mut events, sub),
        Some(("websocket", sub)) => websocket(&dispatcher, &mut events, sub),
        _ => Ok(2),
    }
}

fn main() {
    let args = cli().get_matches();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {}", err);
            process::exit(1);
        }
    };

    let level = args
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.log_level.clone());

    if let Err(err) = setup_logging(&level) {
        eprintln!("{}", err);
        process::exit(1);
    }

    let code = match args.subcommand() {
        Some(("check", sub)) => check(sub),
        _ => run(&config, &args).unwrap_or_else(|err| {
            eprintln!("{}", err);
            2
        }),
    };

    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        cli().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn header_flags_become_a_script_table() {
        let args = parse(&[
            "netbridge", "request", "http://localhost/", "-H", "X-Token=abc", "-H", "Accept = text/plain",
            "--unset", "User-Agent",
        ]);
        let (_, sub) = args.subcommand().unwrap();

        let headers = headers_table(sub).unwrap();
        let table = headers.as_table().unwrap();
        assert_eq!(table.get("X-Token"), Some(&ScriptValue::from("abc")));
        assert_eq!(table.get("Accept"), Some(&ScriptValue::from("text/plain")));
        assert_eq!(table.get("User-Agent"), Some(&ScriptValue::Nil));
    }

    #[test]
    fn malformed_header_flag_is_an_error() {
        let args = parse(&["netbridge", "websocket", "ws://localhost/", "-H", "missing-separator"]);
        let (_, sub) = args.subcommand().unwrap();
        assert!(headers_table(sub).is_err());
    }

    #[test]
    fn request_flags_become_options() {
        let args = parse(&["netbridge", "request", "http://localhost/", "--method", "PATCH", "--binary"]);
        let (_, sub) = args.subcommand().unwrap();

        let options = request_options(sub);
        let parsed = RequestOptions::from_script(&options, 4).unwrap();
        assert_eq!(parsed.method.as_deref(), Some("PATCH"));
        assert!(parsed.binary);
    }

    #[test]
    fn check_reports_through_the_exit_code() {
        let accepted = parse(&["netbridge", "check", "wss://example.com/socket"]);
        let (name, sub) = accepted.subcommand().unwrap();
        assert_eq!(name, "check");
        assert_eq!(check(sub), 0);

        let rejected = parse(&["netbridge", "check", "ftp://example.com"]);
        let (_, sub) = rejected.subcommand().unwrap();
        assert_eq!(check(sub), 1);
    }

    #[test]
    fn message_limit_must_be_a_count() {
        assert!(cli()
            .try_get_matches_from(["netbridge", "websocket", "ws://localhost/", "--messages", "many"])
            .is_err());
    }
}
