use anyhow::{Context, Result};
use shotwatch::config::get_logs_dir;
use shotwatch::events::{ActivityLogHandler, ConsoleEventHandler};
use shotwatch::logging::{init_logging, ActivityLog};
use shotwatch::{Controller, MonitorStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_LOG_LINES: usize = 20;

const HELP: &str = "Commands:
  start           start monitoring
  stop            stop monitoring
  status          show state, folder and server URL
  folder <path>   watch a different folder
  url <url>       upload to a different server
  log [n]         show the last n activity entries
  quit | exit     stop and exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
    Folder(String),
    Url(String),
    Log(usize),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "folder" if !rest.is_empty() => Command::Folder(rest.to_string()),
        "folder" => return Err("Usage: folder <path>".to_string()),
        "url" if !rest.is_empty() => Command::Url(rest.to_string()),
        "url" => return Err("Usage: url <url>".to_string()),
        "log" if rest.is_empty() => Command::Log(DEFAULT_LOG_LINES),
        "log" => Command::Log(
            rest.parse()
                .map_err(|_| format!("Not a line count: {}", rest))?,
        ),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command '{}', try 'help'", other)),
    };

    Ok(Some(command))
}

fn print_status(status: &MonitorStatus) {
    println!(
        "Status: {:?}\n  Folder: {}\n  Server: {}",
        status.state, status.folder_path, status.upload_url
    );
}

fn print_log(activity_log: &ActivityLog, lines: usize) {
    match activity_log.read(Some(lines)) {
        Ok(entries) if entries.is_empty() => println!("No activity yet"),
        Ok(entries) => {
            for entry in entries.iter().rev() {
                println!("{} [{}] {}", entry.timestamp, entry.level, entry.message);
            }
        }
        Err(e) => println!("Could not read activity log: {}", e),
    }
}

/// Returns `false` when the user asked to quit.
async fn handle_command(
    controller: &Controller,
    activity_log: &ActivityLog,
    command: Command,
) -> bool {
    match command {
        Command::Start => print_status(&controller.start().await),
        Command::Stop => print_status(&controller.stop().await),
        Command::Status => print_status(&controller.status().await),
        Command::Folder(path) => match controller.change_folder(&path).await {
            Ok(status) => print_status(&status),
            Err(e) => println!("Folder not changed: {}", e),
        },
        Command::Url(url) => match controller.set_server_url(&url).await {
            Ok(status) => print_status(&status),
            Err(e) => println!("Server URL not changed: {}", e),
        },
        Command::Log(lines) => print_log(activity_log, lines),
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Ctrl+C detected"),
                    _ = sigterm.recv() => info!("SIGTERM detected"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        // Without any signal source only stdin can end the process
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C detected");
}

#[tokio::main]
async fn main() -> Result<()> {
    let logs_dir = get_logs_dir().context("Failed to locate logs directory")?;
    if let Err(e) = init_logging(&logs_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let controller =
        Controller::from_default_locations().context("Failed to initialize shotwatch")?;

    let shutdown = CancellationToken::new();
    let activity_log = ActivityLog::new(&logs_dir);

    let activity_handle = ActivityLogHandler::new(
        controller.events().clone(),
        activity_log.clone(),
        shutdown.clone(),
    )
    .start();
    let console_handle =
        ConsoleEventHandler::new(controller.events().clone(), shutdown.clone()).start();

    info!("shotwatch starting");
    print_status(&controller.start().await);
    println!("Type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let terminated = shutdown_signal();
    tokio::pin!(terminated);

    loop {
        tokio::select! {
            _ = &mut terminated => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(command)) => {
                        if !handle_command(&controller, &activity_log, command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                },
                // stdin closed: keep monitoring until a termination signal
                Ok(None) => {
                    (&mut terminated).await;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read command");
                    break;
                }
            }
        }
    }

    controller.stop().await;
    shutdown.cancel();

    let _ = activity_handle.await;
    let _ = console_handle.await;

    println!("Exiting shotwatch.");
    Ok(())
}
